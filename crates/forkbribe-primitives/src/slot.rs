//! Half-slot time: every slot splits into a propose phase and an attest phase.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two phases of a slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Phase {
    /// First half of the slot: the scheduled proposer publishes a block.
    #[default]
    Propose,
    /// Second half: the slot committee attests to its head.
    Attest,
}

/// A phase-aware point in time. Ordered by `(num, phase)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Slot {
    pub num: u64,
    pub phase: Phase,
}

impl Slot {
    pub fn new(num: u64, phase: Phase) -> Self {
        Slot { num, phase }
    }

    /// Start of a slot (propose phase).
    pub fn propose(num: u64) -> Self {
        Slot { num, phase: Phase::Propose }
    }

    /// The next half-slot: propose -> attest within the same slot, attest ->
    /// propose of the following slot.
    pub fn next(self) -> Self {
        match self.phase {
            Phase::Propose => Slot { num: self.num, phase: Phase::Attest },
            Phase::Attest => Slot { num: self.num + 1, phase: Phase::Propose },
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            Phase::Propose => 0,
            Phase::Attest => 1,
        };
        write!(f, "{}.{}", self.num, phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_slot_stepping_alternates_phases() {
        let slot = Slot::propose(1);
        assert_eq!(slot.next(), Slot::new(1, Phase::Attest));
        assert_eq!(slot.next().next(), Slot::propose(2));
    }

    #[test]
    fn ordering_is_by_num_then_phase() {
        assert!(Slot::propose(1) < Slot::new(1, Phase::Attest));
        assert!(Slot::new(1, Phase::Attest) < Slot::propose(2));
        assert!(Slot::propose(3) <= Slot::propose(3));
    }
}
