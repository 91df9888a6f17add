//! Fork plan derived from the chain string.
//!
//! The plan fixes, for every slot of the window, which head the attack
//! branch considers correct, which head the honest branch would pick, and
//! when the withheld prefix must be revealed.

use std::collections::{BTreeMap, BTreeSet};

use forkbribe_engine::Engine;
use forkbribe_primitives::EntityId;

/// The attack's shared plan over a proposer schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkPlan {
    pub base_slot: u64,
    pub len: u64,
    pub honest: EntityId,
    /// Correct vote target per slot on the planned (non-honest) branch.
    pub correct_votes: BTreeMap<u64, u64>,
    /// What the honest entity is expected to vote for per slot.
    pub bad_votes: BTreeMap<u64, u64>,
    /// Slots the planned branch must contain.
    pub included: BTreeSet<u64>,
    /// Slots the planned branch must avoid.
    pub excluded: BTreeSet<u64>,
    /// Last slot of the initial byzantine prefix (`base_slot` if the chain
    /// opens honestly).
    pub last_e: u64,
    /// First honest-owned slot; reveal time for withheld blocks.
    pub last_h: u64,
}

impl ForkPlan {
    pub fn new(base_slot: u64, chain: &[EntityId], honest: EntityId) -> Self {
        let len = chain.len() as u64;
        let included: BTreeSet<u64> = chain
            .iter()
            .enumerate()
            .filter(|(_, &owner)| owner != honest)
            .map(|(i, _)| base_slot + 1 + i as u64)
            .collect();
        let excluded: BTreeSet<u64> =
            (base_slot + 1..=base_slot + len).filter(|slot| !included.contains(slot)).collect();

        let greatest_at_most = |branch: &BTreeSet<u64>, slot: u64| {
            branch.range(..=slot).next_back().copied().unwrap_or(base_slot)
        };
        let mut correct_votes = BTreeMap::new();
        let mut bad_votes = BTreeMap::new();
        for slot in base_slot..=base_slot + len {
            correct_votes.insert(slot, greatest_at_most(&included, slot));
            bad_votes.insert(slot, greatest_at_most(&excluded, slot));
        }

        let mut last_e = base_slot;
        let mut last_h = base_slot + len + 1;
        let mut before_honest = true;
        for (i, &owner) in chain.iter().enumerate() {
            let slot = base_slot + 1 + i as u64;
            if owner == honest {
                if before_honest {
                    last_h = slot;
                }
                before_honest = false;
            } else if before_honest {
                last_e = slot;
            }
        }

        ForkPlan {
            base_slot,
            len,
            honest,
            correct_votes,
            bad_votes,
            included,
            excluded,
            last_e,
            last_h,
        }
    }

    /// An on-chain fact has falsified the plan: either the honest entity
    /// learned of a withheld block inside the secret window, or some block's
    /// parent deviates from what its branch prescribes.
    pub fn structural_anomaly(&self, engine: &Engine) -> bool {
        let current = engine.slot().num;
        if current < self.last_h {
            for slot in self.base_slot + 1..self.last_h {
                let leaked = engine.owner_of(slot).map_or(false, |owner| owner != self.honest)
                    && engine.knows_block(self.honest, slot);
                if leaked {
                    return true;
                }
            }
        }

        for slot in self.base_slot + 1..=current.min(self.base_slot + self.len) {
            let expected_parent = if self.included.contains(&slot) {
                self.correct_votes[&(slot - 1)]
            } else {
                self.bad_votes[&(slot - 1)]
            };
            match engine.block(slot) {
                Some(block) if block.parent_slot == expected_parent => {}
                _ => return true,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: EntityId = EntityId::HONEST;
    const A: EntityId = EntityId::ADVERSARY;
    const B: EntityId = EntityId(2);

    #[test]
    fn aha_plan() {
        let plan = ForkPlan::new(0, &[A, H, A], H);
        assert_eq!(plan.included, [1, 3].into());
        assert_eq!(plan.excluded, [2].into());
        assert_eq!(plan.last_e, 1);
        assert_eq!(plan.last_h, 2);
        assert_eq!(plan.correct_votes[&0], 0);
        assert_eq!(plan.correct_votes[&1], 1);
        assert_eq!(plan.correct_votes[&2], 1);
        assert_eq!(plan.correct_votes[&3], 3);
        assert_eq!(plan.bad_votes[&1], 0);
        assert_eq!(plan.bad_votes[&2], 2);
        assert_eq!(plan.bad_votes[&3], 2);
    }

    #[test]
    fn ex_ante_prefix_with_bribee() {
        let plan = ForkPlan::new(0, &[B, A, H, A], H);
        assert_eq!(plan.last_e, 2);
        assert_eq!(plan.last_h, 3);
        assert_eq!(plan.included, [1, 2, 4].into());
        assert_eq!(plan.correct_votes[&3], 2);
    }

    #[test]
    fn honest_opening_chain_has_no_prefix() {
        let plan = ForkPlan::new(0, &[H, A, A], H);
        assert_eq!(plan.last_e, 0);
        assert_eq!(plan.last_h, 1);
        assert_eq!(plan.included, [2, 3].into());
        assert_eq!(plan.excluded, [1].into());
    }
}
