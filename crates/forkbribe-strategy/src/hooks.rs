//! The hook contract every player implements.
//!
//! Players are finite state machines over the driver's per-slot loop. They
//! drive the engine only through its immutable API: every hook consumes a
//! snapshot and returns the next one, mutating nothing but the player's own
//! bookkeeping.

use forkbribe_engine::{Engine, EngineError};
use forkbribe_primitives::{EntityId, Slot};

/// Ordered trace of what happened during a game.
pub type EventLog = Vec<(Slot, String)>;

/// Hooks every participant has.
pub trait StrategyHooks {
    fn entity(&self) -> EntityId;

    /// Propose the block for the current slot.
    fn build(&mut self, engine: Engine, events: &mut EventLog) -> Result<Engine, EngineError>;

    /// Cast attestations for the current slot.
    fn vote(&mut self, engine: Engine, events: &mut EventLog) -> Result<Engine, EngineError>;
}

/// Additional hooks of plan-following (non-honest) participants.
pub trait ByzantineHooks: StrategyHooks {
    /// Rebroadcast votes learned through claim receipts.
    fn send_others_votes(
        &mut self,
        engine: Engine,
        events: &mut EventLog,
    ) -> Result<Engine, EngineError>;

    /// Reveal withheld blocks when the plan says so.
    fn withheld_blocks(
        &mut self,
        engine: Engine,
        events: &mut EventLog,
    ) -> Result<Engine, EngineError>;

    /// Re-evaluate the plan against the chain; may flip the player into its
    /// aborted mode. Runs twice per slot.
    fn adjust_strategy(
        &mut self,
        engine: Engine,
        events: &mut EventLog,
    ) -> Result<Engine, EngineError>;
}
