//! The adversary: builds the secret fork, bribes the other byzantine
//! entities into attesting for it, and gives the attack up the moment the
//! plan stops being winnable.

use std::collections::{BTreeMap, BTreeSet};

use forkbribe_engine::{
    keep_all, BuildBlock, Engine, EngineError, OfferBribery, SingleOfferBribery, Vote,
};
use forkbribe_primitives::{EntityId, Phase, PROPOSER_BOOST};
use log::debug;

use crate::hooks::{ByzantineHooks, EventLog, StrategyHooks};
use crate::params::{AdvParams, RewardUnits};
use crate::plan::ForkPlan;

#[derive(Debug, Clone)]
pub struct AdversaryStrategy {
    params: AdvParams,
    units: RewardUnits,
    entity: EntityId,
    honest: EntityId,
    bribees: Vec<EntityId>,
    all_entities: Vec<EntityId>,
    chain: Vec<EntityId>,
    plan: ForkPlan,

    /// Bribees still considered trustworthy; shrinks as votes go missing.
    cooperating: BTreeSet<EntityId>,
    offers: Vec<OfferBribery>,
    withheld_slots: Vec<u64>,
    aborted: bool,
}

impl AdversaryStrategy {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: AdvParams,
        units: RewardUnits,
        base_slot: u64,
        chain: Vec<EntityId>,
        entity: EntityId,
        honest: EntityId,
        bribees: Vec<EntityId>,
    ) -> Self {
        let plan = ForkPlan::new(base_slot, &chain, honest);
        let mut all_entities = vec![honest, entity];
        all_entities.extend(bribees.iter().copied());
        AdversaryStrategy {
            params,
            units,
            entity,
            honest,
            cooperating: bribees.iter().copied().collect(),
            bribees,
            all_entities,
            chain,
            plan,
            offers: Vec::new(),
            withheld_slots: Vec::new(),
            aborted: false,
        }
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    fn owner_of(&self, slot: u64) -> Option<EntityId> {
        let base = self.plan.base_slot;
        if slot <= base || slot > base + self.plan.len {
            return None;
        }
        Some(self.chain[(slot - base - 1) as usize])
    }

    /// Entities the withheld prefix is shared with: the owners of the
    /// not-yet-proposed secret slots, never the honest entity.
    fn secret_knowledge(&self, current: u64) -> Vec<EntityId> {
        let mut known: BTreeSet<EntityId> = BTreeSet::new();
        for slot in current + 1..=self.plan.last_e {
            if let Some(owner) = self.owner_of(slot) {
                known.insert(owner);
            }
        }
        known.into_iter().collect()
    }

    fn abort(&mut self, engine: Engine, events: &mut EventLog, reason: &str) -> Engine {
        self.aborted = true;
        events.push((engine.slot(), format!("{} aborts the attack: {reason}", self.entity)));
        debug!("adversary {} aborts at {}: {reason}", self.entity, engine.slot());
        if self.withheld_slots.is_empty() {
            return engine;
        }
        let grants: BTreeMap<EntityId, Vec<u64>> = self
            .all_entities
            .iter()
            .map(|&e| (e, self.withheld_slots.clone()))
            .collect();
        self.withheld_slots.clear();
        engine.add_knowledge(&grants)
    }

    /// Can the remaining trusted voting power still outweigh the honest
    /// branch, boost included?
    fn plan_still_feasible(&self, engine: &Engine) -> bool {
        let untrusted: BTreeSet<EntityId> = self
            .bribees
            .iter()
            .copied()
            .filter(|b| !self.cooperating.contains(b))
            .collect();
        let e_power: i64 = self
            .cooperating
            .iter()
            .map(|&b| engine.voting_power(b) as i64)
            .sum::<i64>()
            + engine.voting_power(self.entity) as i64;
        let h_power: i64 = untrusted
            .iter()
            .map(|&b| engine.voting_power(b) as i64)
            .sum::<i64>()
            + engine.voting_power(self.honest) as i64;

        // Count only votes that land before the decisive fork choice at the
        // window's last slot: later ones follow whichever branch already won.
        let base = self.plan.base_slot as i64;
        let len = self.plan.len as i64;
        let (mut honest_votes, mut adv_votes) = if self.chain[0] == self.honest {
            (
                (len - 1) * h_power,
                (len - (self.plan.last_h as i64 - base) - 1) * e_power + PROPOSER_BOOST as i64,
            )
        } else {
            (
                (len - 1 - (self.plan.last_e as i64 - base)) * h_power,
                (len - 1) * e_power + PROPOSER_BOOST as i64,
            )
        };

        for vote in engine.all_votes() {
            if untrusted.contains(&vote.entity) && self.plan.included.contains(&vote.to_slot) {
                // Already cast for the attack branch; recount it.
                adv_votes += vote.amount() as i64;
                honest_votes -= vote.amount() as i64;
            }
        }
        honest_votes < adv_votes
    }

    /// Bribees whose bought votes are overdue or contradicted on chain.
    fn blacklisted_bribees(&self, engine: &Engine) -> BTreeSet<EntityId> {
        let current = engine.slot().num;
        let all_votes = engine.all_votes();
        let mut blacklisted = BTreeSet::new();
        for offer in &self.offers {
            for single in &offer.attests {
                let expected = Vote {
                    entity: offer.bribee,
                    from_slot: single.from_slot,
                    min_index: single.min_index,
                    max_index: single.max_index,
                    to_slot: single.slot,
                };
                let voted_wrong = engine
                    .counted_votes_for(expected.key())
                    .map_or(false, |votes| {
                        votes.iter().any(|vote| {
                            vote.to_slot != single.slot
                                && vote.max_index >= single.min_index
                                && single.max_index >= vote.min_index
                        })
                    });
                let due = if self.params.patient {
                    single.deadline.map_or(false, |d| current >= d - 1)
                } else {
                    current >= single.from_slot
                };
                if voted_wrong || (due && !all_votes.contains(&expected)) {
                    blacklisted.insert(offer.bribee);
                }
            }
        }
        blacklisted
    }

    /// Compose one bundled offer per cooperating bribee, covering the
    /// current slot plus the following honest-owned run; the deadline is the
    /// next byzantine-owned slot.
    pub fn offer_bribe(
        &mut self,
        engine: Engine,
        events: &mut EventLog,
    ) -> Result<Engine, EngineError> {
        let slot = engine.slot().num;
        let end = self.plan.base_slot + self.plan.len;
        if self.aborted || self.owner_of(slot) == Some(self.honest) || slot == end {
            return Ok(engine);
        }

        let mut voting_slots = vec![slot];
        let mut deadline = slot + 1;
        for next in slot + 1..=end {
            if self.owner_of(next) != Some(self.honest) {
                deadline = next;
                break;
            }
            voting_slots.push(next);
        }
        let bribed_proposer = match self.owner_of(deadline) {
            Some(owner) => owner,
            None => return Ok(engine),
        };

        let mut new_offers = Vec::new();
        for &bribee in &self.cooperating {
            let power = engine.voting_power(bribee);
            let attests: Vec<SingleOfferBribery> = voting_slots
                .iter()
                .map(|&from_slot| SingleOfferBribery {
                    min_index: 0,
                    max_index: power - 1,
                    from_slot,
                    slot,
                    deadline: Some(deadline),
                })
                .collect();
            let all_indices = power * voting_slots.len() as u64;
            new_offers.push(OfferBribery {
                attests,
                all_indices,
                base_reward: (self.units.base_reward_unit * all_indices as f64).ceil() as u64,
                deadline_reward: (self.units.deadline_reward_unit * all_indices as f64).ceil()
                    as u64,
                deadline_payback: (self.units.deadline_payback_unit * all_indices as f64).ceil()
                    as u64,
                bribee,
                briber: self.entity,
                bribed_proposer,
                included_slots: self.plan.included.clone(),
                excluded_slots: self.plan.excluded.clone(),
            });
            events.push((
                engine.slot(),
                format!(
                    "{} offers {} a bribe for slots {:?} (deadline {})",
                    self.entity, bribee, voting_slots, deadline
                ),
            ));
        }
        if new_offers.is_empty() {
            return Ok(engine);
        }
        self.offers.extend(new_offers.iter().cloned());

        let grants: BTreeMap<EntityId, Vec<OfferBribery>> = self
            .all_entities
            .iter()
            .map(|&e| (e, new_offers.clone()))
            .collect();
        engine.add_offer_bribery(&grants)
    }
}

impl StrategyHooks for AdversaryStrategy {
    fn entity(&self) -> EntityId {
        self.entity
    }

    fn build(&mut self, engine: Engine, events: &mut EventLog) -> Result<Engine, EngineError> {
        let slot = engine.slot().num;
        let (head, known_by) = if self.aborted {
            (engine.head(self.honest)?, self.all_entities.clone())
        } else {
            let head = self.plan.correct_votes[&(slot - 1)];
            if slot < self.plan.last_h {
                self.withheld_slots.push(slot);
                events.push((engine.slot(), format!("{} builds slot {slot} in secret", self.entity)));
                (head, self.secret_knowledge(slot))
            } else {
                (head, self.all_entities.clone())
            }
        };

        let censor_from = self.params.censor_from_slot;
        engine.build_block(
            &BuildBlock::new(slot, head).known_by(&known_by).proposer(self.entity),
            |_take| censor_from.map_or(true, |from| slot < from),
            keep_all,
        )
    }

    fn vote(&mut self, engine: Engine, _events: &mut EventLog) -> Result<Engine, EngineError> {
        let slot = engine.slot().num;
        let head = if self.aborted {
            engine.head(self.honest)?
        } else {
            self.plan.correct_votes[&slot]
        };
        let vote = Vote {
            entity: self.entity,
            from_slot: slot,
            min_index: 0,
            max_index: engine.voting_power(self.entity) - 1,
            to_slot: head,
        };
        engine.add_votes([vote])
    }
}

impl ByzantineHooks for AdversaryStrategy {
    fn send_others_votes(
        &mut self,
        engine: Engine,
        _events: &mut EventLog,
    ) -> Result<Engine, EngineError> {
        let takes = engine.takes_known_to(self.entity);
        if takes.is_empty() {
            return Ok(engine);
        }
        let counted = engine.all_votes();
        let fresh: Vec<Vote> = takes
            .iter()
            .map(|take| take.vote)
            .filter(|vote| !counted.contains(vote))
            .collect();
        if fresh.is_empty() {
            return Ok(engine);
        }
        engine.add_votes(fresh)
    }

    fn withheld_blocks(
        &mut self,
        engine: Engine,
        events: &mut EventLog,
    ) -> Result<Engine, EngineError> {
        if self.aborted || engine.slot().num != self.plan.last_h {
            return Ok(engine);
        }
        if self.withheld_slots.is_empty() {
            return Ok(engine);
        }
        events.push((
            engine.slot(),
            format!("{} reveals withheld slots {:?}", self.entity, self.withheld_slots),
        ));
        let grants: BTreeMap<EntityId, Vec<u64>> = self
            .all_entities
            .iter()
            .map(|&e| (e, self.withheld_slots.clone()))
            .collect();
        self.withheld_slots.clear();
        Ok(engine.add_knowledge(&grants))
    }

    fn adjust_strategy(
        &mut self,
        engine: Engine,
        events: &mut EventLog,
    ) -> Result<Engine, EngineError> {
        if self.aborted {
            return Ok(engine);
        }
        if self.plan.structural_anomaly(&engine) {
            return Ok(self.abort(engine, events, "structural anomaly"));
        }
        if let Some(break_bad) = self.params.break_bad_slot {
            if engine.slot().num >= break_bad {
                return Ok(self.abort(engine, events, "breaking bad"));
            }
        }
        if engine.slot().phase != Phase::Attest {
            return Ok(engine);
        }

        let blacklisted = self.blacklisted_bribees(&engine);
        for &bribee in &blacklisted {
            self.cooperating.remove(&bribee);
        }
        let current = engine.slot().num;
        let future_proposer_defected = blacklisted.iter().any(|&bribee| {
            (current + 1..=self.plan.base_slot + self.plan.len)
                .any(|slot| self.owner_of(slot) == Some(bribee))
        });
        if future_proposer_defected {
            return Ok(self.abort(engine, events, "an upcoming proposer defected"));
        }
        if !self.plan_still_feasible(&engine) {
            return Ok(self.abort(engine, events, "plan no longer feasible"));
        }
        Ok(engine)
    }
}
