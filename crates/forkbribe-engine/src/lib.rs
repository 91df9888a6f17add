//! CONSENSUS ENGINE
//!
//! An immutable snapshot of a slot-based, attestation-weighted fork-choice
//! protocol under a bribery attack: block proposal, attestation accounting
//! with double-vote detection, proposer-boosted head selection,
//! branch-conditional escrow of bribery payments and symbolic reward
//! accounting. Every mutator returns a fresh snapshot; the caller's engine is
//! never touched, so a failed transition leaves no partial state behind.

pub mod action;
pub mod block;
pub mod engine;
pub mod error;
pub mod wallet;

pub use action::{OfferBribery, PayToAttestState, SingleOfferBribery, TakeBribery, Vote, VoteKey};
pub use block::Block;
pub use engine::{keep_all, BuildBlock, Engine};
pub use error::EngineError;
pub use wallet::{Address, PayChannel, Payment, WalletState};
