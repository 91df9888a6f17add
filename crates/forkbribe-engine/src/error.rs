//! Structured invariant violations.
//!
//! Every precondition of the engine surfaces as a variant here. Snapshots are
//! immutable, so a returned error leaves the caller's engine exactly as it
//! was.

use forkbribe_primitives::{EntityId, Slot};
use thiserror::Error;

use crate::action::Vote;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("double voting detected for {vote:?}")]
    DoubleVote { vote: Vote },

    #[error("overlapping vote with the same target must repeat the exact range: {vote:?}")]
    FracturedVote { vote: Vote },

    #[error("vote indices [{min_index}, {max_index}] out of range for {entity} with voting power {voting_power}")]
    IndexOutOfRange { entity: EntityId, min_index: u64, max_index: u64, voting_power: u64 },

    #[error("vote ordering violated (need to_slot <= from_slot <= {current}): {vote:?}")]
    VoteOrder { vote: Vote, current: u64 },

    #[error("vote targets slot {to_slot} which holds no block")]
    UnknownVoteTarget { to_slot: u64 },

    #[error("unknown entity {entity}")]
    UnknownEntity { entity: EntityId },

    #[error("expected attest phase, engine is at {at}")]
    NotAttestPhase { at: Slot },

    #[error("slot {slot} already holds a block")]
    DuplicateSlot { slot: u64 },

    #[error("block at slot {slot} names unknown parent {parent_slot}")]
    UnknownParent { slot: u64, parent_slot: u64 },

    #[error("slot {slot} belongs to {owner}, not to proposer {proposer}")]
    SlotOwnerMismatch { slot: u64, owner: EntityId, proposer: EntityId },

    #[error("no proposer known for slot {slot}")]
    NoProposer { slot: u64 },

    #[error("fork-choice tie among children of slot {parent} at weight {weight}")]
    ForkChoiceTie { parent: u64, weight: u64 },

    #[error("{entity} knows block {slot} but not its parent {parent_slot}")]
    KnowledgeGap { entity: EntityId, slot: u64, parent_slot: u64 },

    #[error("bribery offer targets slot {slot} which holds no block")]
    UnknownOfferTarget { slot: u64 },

    #[error("malformed bribery offer: {reason}")]
    InvalidOffer { reason: String },

    #[error("bribery claim index {index} out of bounds for an offer with {len} requests")]
    ClaimIndexOutOfBounds { index: usize, len: usize },

    #[error("bribery claim does not match the referenced attestation request: {reason}")]
    ClaimMismatch { reason: String },
}
