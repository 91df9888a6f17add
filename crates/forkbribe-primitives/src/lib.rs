//! PROTOCOL PRIMITIVES
//!
//! Leaf crate of the forkbribe workspace: half-slot time arithmetic, compact
//! entity identities, the protocol constants of the simulated beacon-style
//! chain, and the attestation reward matrix. Everything here is total and
//! allocation-free; the consensus engine and the strategy players build on
//! top of it.

pub mod constants;
pub mod entity;
pub mod rewards;
pub mod slot;

pub use constants::{
    ATTESTATORS_PER_SLOT, B, BASE_INCREMENT, BASE_REWARD_FACTOR, EFFECTIVE_BALANCE_INCREMENT,
    NUM_OF_VALIDATORS, PROPOSER_BOOST, SLOTS_PER_EPOCH,
};
pub use entity::EntityId;
pub use rewards::{attestation_base_reward, AttestFractions, Timeliness, W_H, W_P, W_S, W_SUM, W_T, W_Y};
pub use slot::{Phase, Slot};
