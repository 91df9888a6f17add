//! Votes, bribery contracts and their claim receipts.

use std::collections::BTreeSet;

use forkbribe_primitives::EntityId;
use serde::{Deserialize, Serialize};

/// Identity of an attestation source: who voted, and from which slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VoteKey {
    pub entity: EntityId,
    pub from_slot: u64,
}

/// One attestation: a contiguous sub-committee `[min_index, max_index]` of
/// `entity`'s voting power attests from `from_slot` toward the head
/// `to_slot <= from_slot`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Vote {
    pub entity: EntityId,
    pub from_slot: u64,
    pub min_index: u64,
    pub max_index: u64,
    pub to_slot: u64,
}

impl Vote {
    /// Number of validator indices the vote covers.
    pub fn amount(&self) -> u64 {
        self.max_index - self.min_index + 1
    }

    pub fn key(&self) -> VoteKey {
        VoteKey { entity: self.entity, from_slot: self.from_slot }
    }
}

/// One attestation request inside a bundled bribery offer: "attest from
/// `from_slot` toward `slot` with indices `[min_index, max_index]`, and have
/// the claim on-chain by `deadline`".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SingleOfferBribery {
    pub min_index: u64,
    pub max_index: u64,
    pub from_slot: u64,
    pub slot: u64,
    /// `None` means the claim may land at any time.
    pub deadline: Option<u64>,
}

/// An escrowed bribery contract: every bundled attestation must be claimed
/// for any payment to fire.
///
/// `base_reward` is owed once all claims landed, regardless of timing or fork
/// outcome. `deadline_reward` (to the bribee) and `deadline_payback` (to the
/// proposer who included the final claim) are owed only if every claim made
/// its deadline on a branch containing all of `included_slots` and none of
/// `excluded_slots`. `all_indices` is the total index count across the
/// requests; the analyzer prices rewards per index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfferBribery {
    pub attests: Vec<SingleOfferBribery>,
    pub all_indices: u64,
    pub base_reward: u64,
    pub deadline_reward: u64,
    pub deadline_payback: u64,
    pub bribee: EntityId,
    pub briber: EntityId,
    pub bribed_proposer: EntityId,
    pub included_slots: BTreeSet<u64>,
    pub excluded_slots: BTreeSet<u64>,
}

/// Claim receipt proving one of an offer's bundled attestations happened.
/// The embedded vote can be replayed by whoever carries the receipt.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TakeBribery {
    pub reference: OfferBribery,
    pub vote: Vote,
    /// Position in `reference.attests` this claim fulfils.
    pub index: usize,
}

/// Per-branch escrow bookkeeping for one offer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayToAttestState {
    pub offer: OfferBribery,
    /// Which bundled attestations have been claimed on this branch.
    pub achieved: Vec<bool>,
    /// Whether each claim landed no later than its deadline.
    pub before_deadline: Vec<bool>,
    pub paid: bool,
    /// Whether the deadline bonuses were released when the contract paid.
    pub extra_funds: bool,
}

impl PayToAttestState {
    pub fn new(offer: OfferBribery) -> Self {
        let len = offer.attests.len();
        PayToAttestState {
            offer,
            achieved: vec![false; len],
            before_deadline: vec![false; len],
            paid: false,
            extra_funds: false,
        }
    }

    /// Record that attestation `index` was claimed, and whether it made its
    /// deadline.
    pub fn achieve(&self, index: usize, before_deadline: bool) -> Self {
        let mut next = self.clone();
        next.achieved[index] = true;
        next.before_deadline[index] = before_deadline;
        next
    }

    pub fn mark_paid(&self, extra_funds: bool) -> Self {
        let mut next = self.clone();
        next.paid = true;
        next.extra_funds = extra_funds;
        next
    }

    pub fn all_achieved(&self) -> bool {
        self.achieved.iter().all(|&a| a)
    }

    pub fn all_before_deadline(&self) -> bool {
        self.before_deadline.iter().all(|&b| b)
    }
}
