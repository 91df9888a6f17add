//! STRATEGY PLAYERS & GAME DRIVER
//!
//! The three finite-state agents of the bribery game — honest, adversary and
//! bribee — sharing one hook contract over the immutable engine, the
//! fork-plan utilities they coordinate through, and the driver that
//! enumerates every (adversary × bribees) strategy pairing over a fixed
//! proposer schedule and records the resulting symbolic run table.

pub mod adversary;
pub mod bribee;
pub mod game;
pub mod honest;
pub mod hooks;
pub mod params;
pub mod plan;

pub use adversary::AdversaryStrategy;
pub use bribee::BribeeStrategy;
pub use game::{Game, GameConfig, GameError, RunRecord, StrategyProfile, SymbolicRun};
pub use honest::HonestStrategy;
pub use hooks::{ByzantineHooks, EventLog, StrategyHooks};
pub use params::{AdvParams, BribeeParams, RewardUnits, StrategyParams};
pub use plan::ForkPlan;
