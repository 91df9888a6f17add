//! A bribee: follows the plan while it pays, claims its bribes, and falls
//! back to honest attesting the moment the adversary visibly gives up.

use std::collections::{BTreeMap, BTreeSet};

use forkbribe_engine::{BuildBlock, Engine, EngineError, OfferBribery, TakeBribery, Vote};
use forkbribe_primitives::EntityId;
use log::debug;

use crate::hooks::{ByzantineHooks, EventLog, StrategyHooks};
use crate::params::BribeeParams;
use crate::plan::ForkPlan;

#[derive(Debug, Clone)]
pub struct BribeeStrategy {
    params: BribeeParams,
    entity: EntityId,
    honest: EntityId,
    adversary: EntityId,
    all_entities: Vec<EntityId>,
    chain: Vec<EntityId>,
    plan: ForkPlan,

    accepted_offers: BTreeSet<OfferBribery>,
    declined_offers: BTreeSet<OfferBribery>,
    already_voted_from: BTreeSet<u64>,
    /// Claims produced by the last `vote` call, awaiting broadcast.
    pending_takes: Vec<TakeBribery>,
    withheld_slots: Vec<u64>,
    aborted: bool,
}

impl BribeeStrategy {
    pub fn new(
        params: BribeeParams,
        base_slot: u64,
        chain: Vec<EntityId>,
        entity: EntityId,
        honest: EntityId,
        adversary: EntityId,
        bribees: Vec<EntityId>,
    ) -> Self {
        let plan = ForkPlan::new(base_slot, &chain, honest);
        let mut all_entities = vec![honest, adversary];
        all_entities.extend(bribees.iter().copied());
        BribeeStrategy {
            params,
            entity,
            honest,
            adversary,
            all_entities,
            chain,
            plan,
            accepted_offers: BTreeSet::new(),
            declined_offers: BTreeSet::new(),
            already_voted_from: BTreeSet::new(),
            pending_takes: Vec::new(),
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

    fn secret_knowledge(&self, current: u64) -> Vec<EntityId> {
        let mut known: BTreeSet<EntityId> = BTreeSet::new();
        for slot in current + 1..=self.plan.last_e {
            if let Some(owner) = self.owner_of(slot) {
                known.insert(owner);
            }
        }
        known.into_iter().collect()
    }

    fn is_breaking_bad(&self, engine: &Engine) -> bool {
        self.params.break_bad_slot.map_or(false, |slot| engine.slot().num >= slot)
    }

    fn share_knowledge(&mut self, engine: Engine) -> Engine {
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

    fn abort(&mut self, engine: Engine, events: &mut EventLog, reason: &str) -> Engine {
        self.aborted = true;
        events.push((engine.slot(), format!("{} abandons the attack: {reason}", self.entity)));
        debug!("bribee {} abandons at {}: {reason}", self.entity, engine.slot());
        self.share_knowledge(engine)
    }

    /// Accept any new offer naming this bribee whose deadlines all strictly
    /// exceed the planned break-bad slot.
    fn accept_new_offers(&mut self, engine: &Engine, events: &mut EventLog) {
        let known = engine.offers_known_to(self.entity);
        for offer in known {
            if offer.bribee != self.entity
                || self.accepted_offers.contains(&offer)
                || self.declined_offers.contains(&offer)
            {
                continue;
            }
            let acceptable = self.params.break_bad_slot.map_or(true, |break_bad| {
                offer
                    .attests
                    .iter()
                    .all(|single| single.deadline.map_or(true, |d| d > break_bad))
            });
            if acceptable {
                events.push((
                    engine.slot(),
                    format!("{} accepts a bribe over {} requests", self.entity, offer.attests.len()),
                ));
                self.accepted_offers.insert(offer);
            } else {
                events.push((engine.slot(), format!("{} declines a bribe", self.entity)));
                self.declined_offers.insert(offer);
            }
        }
    }

    /// Slots the accepted offers commit this bribee's votes to.
    fn locked_slots(&self) -> BTreeSet<u64> {
        self.accepted_offers
            .iter()
            .flat_map(|offer| offer.attests.iter().map(|single| single.from_slot))
            .collect()
    }

    /// Honest catch-up after a clean abandon: vote for the ancestor of the
    /// honest head at every slot not voted from yet.
    fn catch_up_votes(&mut self, engine: &Engine) -> Result<Vec<Vote>, EngineError> {
        let mut head = engine.head(self.honest)?;
        let power = engine.voting_power(self.entity);
        let mut votes = Vec::new();
        for slot in (self.plan.base_slot + 1..=engine.slot().num).rev() {
            while head > slot {
                head = engine.block(head).map_or(self.plan.base_slot, |b| b.parent_slot);
            }
            if self.already_voted_from.insert(slot) {
                votes.push(Vote {
                    entity: self.entity,
                    from_slot: slot,
                    min_index: 0,
                    max_index: power - 1,
                    to_slot: head,
                });
            }
        }
        Ok(votes)
    }

    /// Broadcast the claim receipts minted by the last vote step.
    pub fn take_bribe(
        &mut self,
        engine: Engine,
        events: &mut EventLog,
    ) -> Result<Engine, EngineError> {
        if self.pending_takes.is_empty() {
            return Ok(engine);
        }
        events.push((
            engine.slot(),
            format!("{} broadcasts {} bribery claims", self.entity, self.pending_takes.len()),
        ));
        let grants: BTreeMap<EntityId, Vec<TakeBribery>> = self
            .all_entities
            .iter()
            .map(|&e| (e, self.pending_takes.clone()))
            .collect();
        self.pending_takes.clear();
        engine.add_take_briberies(&grants)
    }
}

impl StrategyHooks for BribeeStrategy {
    fn entity(&self) -> EntityId {
        self.entity
    }

    fn build(&mut self, engine: Engine, events: &mut EventLog) -> Result<Engine, EngineError> {
        let slot = engine.slot().num;
        let (engine, head, known_by) = if self.aborted {
            let engine = self.share_knowledge(engine);
            let head = engine.head(self.honest)?;
            (engine, head, self.all_entities.clone())
        } else {
            let head = self.plan.correct_votes[&(slot - 1)];
            if slot < self.plan.last_h {
                self.withheld_slots.push(slot);
                events.push((engine.slot(), format!("{} builds slot {slot} in secret", self.entity)));
                let known = self.secret_knowledge(slot);
                (engine, head, known)
            } else {
                (engine, head, self.all_entities.clone())
            }
        };

        let own_claims_only = self
            .params
            .censoring_from_slot
            .map_or(true, |from| slot < from);
        let entity = self.entity;
        engine.build_block(
            &BuildBlock::new(slot, head).known_by(&known_by).proposer(entity),
            |take| !own_claims_only || take.reference.bribee == entity,
            |_vote| true,
        )
    }

    fn vote(&mut self, engine: Engine, events: &mut EventLog) -> Result<Engine, EngineError> {
        self.accept_new_offers(&engine, events);
        let slot = engine.slot().num;
        self.pending_takes.clear();

        let mut engine = engine;
        let mut votes: Vec<Vote> = Vec::new();

        if self.aborted && !self.params.finish_offers_regardless_of_abort {
            engine = self.share_knowledge(engine);
            votes.extend(self.catch_up_votes(&engine)?);
        } else {
            for offer in self.accepted_offers.clone() {
                for (index, single) in offer.attests.iter().enumerate() {
                    let due = if self.params.last_minute {
                        single.deadline.map_or(false, |d| slot == d - 1)
                    } else {
                        slot == single.from_slot
                    };
                    if !due || self.already_voted_from.contains(&single.from_slot) {
                        continue;
                    }
                    let vote = Vote {
                        entity: self.entity,
                        from_slot: single.from_slot,
                        min_index: single.min_index,
                        max_index: single.max_index,
                        to_slot: single.slot,
                    };
                    self.pending_takes.push(TakeBribery {
                        reference: offer.clone(),
                        vote,
                        index,
                    });
                    self.already_voted_from.insert(single.from_slot);
                    if !self.params.only_sending_to_deadline_proposing_entity {
                        votes.push(vote);
                    }
                }
            }
            // Once engaged, slots outside the accepted offers get an honest
            // vote; a bribee with no deal stays silent.
            if !self.accepted_offers.is_empty()
                && !self.locked_slots().contains(&slot)
                && !self.already_voted_from.contains(&slot)
            {
                let head = engine.head(self.honest)?;
                self.already_voted_from.insert(slot);
                votes.push(Vote {
                    entity: self.entity,
                    from_slot: slot,
                    min_index: 0,
                    max_index: engine.voting_power(self.entity) - 1,
                    to_slot: head,
                });
            }
        }

        if votes.is_empty() {
            return Ok(engine);
        }
        engine.add_votes(votes)
    }
}

impl ByzantineHooks for BribeeStrategy {
    fn send_others_votes(
        &mut self,
        engine: Engine,
        _events: &mut EventLog,
    ) -> Result<Engine, EngineError> {
        if !self.params.send_votes_when_able {
            return Ok(engine);
        }
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
        _events: &mut EventLog,
    ) -> Result<Engine, EngineError> {
        if engine.slot().num == self.plan.last_h {
            return Ok(self.share_knowledge(engine));
        }
        Ok(engine)
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
        if self.is_breaking_bad(&engine) {
            return Ok(self.abort(engine, events, "breaking bad"));
        }
        // The adversary attesting off-plan means it gave the attack up.
        let adversary_deviated = engine.all_votes().iter().any(|vote| {
            vote.entity == self.adversary
                && self
                    .plan
                    .correct_votes
                    .get(&vote.from_slot)
                    .map_or(true, |&target| target != vote.to_slot)
        });
        if adversary_deviated {
            return Ok(self.abort(engine, events, "the adversary abandoned the plan"));
        }
        Ok(engine)
    }
}
