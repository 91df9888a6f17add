//! FORKBRIBE
//!
//! Facade over the forkbribe workspace: a deterministic, purely functional
//! simulator of bribery attacks against a slot-based, attestation-weighted
//! proof-of-stake fork-choice protocol, plus the exhaustive strategy
//! enumeration and Nash-equilibrium analysis on top of it.
//!
//! - [`primitives`]: slots, entity ids, protocol constants, reward matrix.
//! - [`engine`]: the immutable consensus engine with bribery escrow.
//! - [`strategy`]: honest/adversary/bribee agents and the game driver.
//! - [`analysis`]: reward tensors, equilibrium selection, the result cache.

pub use forkbribe_analysis as analysis;
pub use forkbribe_engine as engine;
pub use forkbribe_primitives as primitives;
pub use forkbribe_strategy as strategy;
