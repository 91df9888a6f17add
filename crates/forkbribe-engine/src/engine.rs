//! The immutable consensus snapshot.

use std::collections::{BTreeMap, BTreeSet};

use forkbribe_primitives::{
    attestation_base_reward, AttestFractions, EntityId, Phase, Slot, Timeliness,
    ATTESTATORS_PER_SLOT, B, BASE_INCREMENT, PROPOSER_BOOST, W_P, W_SUM,
};
use log::trace;

use crate::action::{OfferBribery, PayToAttestState, TakeBribery, Vote, VoteKey};
use crate::block::Block;
use crate::error::EngineError;
use crate::wallet::{Address, PayChannel, Payment, WalletState};

/// Censor predicate that keeps everything.
pub fn keep_all<T>(_: &T) -> bool {
    true
}

/// Parameters of one block-building transition.
#[derive(Debug, Clone)]
pub struct BuildBlock<'a> {
    /// Slot the block is proposed for; need not equal the engine's current
    /// slot (late proposals are allowed, they just lose the boost).
    pub slot: u64,
    pub parent_slot: u64,
    /// Entities (besides the proposer) that learn of the block.
    pub known_by: &'a [EntityId],
    /// Final block of the window: unreleased deadline bonuses of paid escrows
    /// are burned.
    pub final_block: bool,
    /// Defaults to the scheduled owner of `slot`.
    pub proposer: Option<EntityId>,
}

impl<'a> BuildBlock<'a> {
    pub fn new(slot: u64, parent_slot: u64) -> Self {
        BuildBlock { slot, parent_slot, known_by: &[], final_block: false, proposer: None }
    }

    pub fn known_by(mut self, entities: &'a [EntityId]) -> Self {
        self.known_by = entities;
        self
    }

    pub fn final_block(mut self, final_block: bool) -> Self {
        self.final_block = final_block;
        self
    }

    pub fn proposer(mut self, proposer: EntityId) -> Self {
        self.proposer = Some(proposer);
        self
    }
}

/// A persistent snapshot of the simulated chain.
///
/// All fields are immutable; every mutator clones what it touches and returns
/// a new snapshot, so strategies can keep, fork and replay engines freely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
    base_head_slot: u64,
    slot: Slot,

    entity_to_voting_power: BTreeMap<EntityId, u64>,
    slot_to_owner: BTreeMap<u64, EntityId>,
    /// Attestation weight per target slot as seen by fork choice (frozen at
    /// the last slot boundary for current-slot votes).
    slot_to_votes: BTreeMap<u64, u64>,
    /// Attestation weight per target slot including current-slot votes.
    slot_to_all_votes: BTreeMap<u64, u64>,

    knowledge_of_blocks: BTreeMap<EntityId, BTreeSet<u64>>,
    blocks: BTreeMap<u64, Block>,
    counted_votes: BTreeMap<VoteKey, BTreeSet<Vote>>,
    /// Off-chain knowledge of bribery offers, per entity.
    offer_briberies: BTreeMap<EntityId, BTreeSet<OfferBribery>>,
    /// Off-chain knowledge of claim receipts, per entity.
    take_briberies: BTreeMap<EntityId, BTreeSet<TakeBribery>>,
}

impl Engine {
    /// Fresh engine over a proposer schedule: slot `i + 1` belongs to
    /// `chain[i]`, the synthetic root sits at slot 0, time starts at the
    /// propose phase of slot 1.
    pub fn new(chain: &[EntityId], entity_to_voting_power: BTreeMap<EntityId, u64>) -> Self {
        let slot_to_owner: BTreeMap<u64, EntityId> =
            chain.iter().enumerate().map(|(i, &owner)| (i as u64 + 1, owner)).collect();
        let zeroed: BTreeMap<u64, u64> = (1..=chain.len() as u64).map(|s| (s, 0)).collect();
        let empty_knowledge =
            entity_to_voting_power.keys().map(|&e| (e, BTreeSet::new())).collect();
        Engine {
            base_head_slot: 0,
            slot: Slot::propose(1),
            entity_to_voting_power,
            slot_to_owner,
            slot_to_votes: zeroed.clone(),
            slot_to_all_votes: zeroed,
            knowledge_of_blocks: empty_knowledge,
            blocks: BTreeMap::new(),
            counted_votes: BTreeMap::new(),
            offer_briberies: BTreeMap::new(),
            take_briberies: BTreeMap::new(),
        }
    }

    pub fn base_head_slot(&self) -> u64 {
        self.base_head_slot
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn voting_power(&self, entity: EntityId) -> u64 {
        self.entity_to_voting_power.get(&entity).copied().unwrap_or(0)
    }

    pub fn owner_of(&self, slot: u64) -> Option<EntityId> {
        self.slot_to_owner.get(&slot).copied()
    }

    pub fn block(&self, slot: u64) -> Option<&Block> {
        self.blocks.get(&slot)
    }

    pub fn blocks(&self) -> &BTreeMap<u64, Block> {
        &self.blocks
    }

    pub fn knows_block(&self, entity: EntityId, slot: u64) -> bool {
        self.knowledge_of_blocks.get(&entity).map_or(false, |k| k.contains(&slot))
    }

    pub fn offers_known_to(&self, entity: EntityId) -> BTreeSet<OfferBribery> {
        self.offer_briberies.get(&entity).cloned().unwrap_or_default()
    }

    pub fn takes_known_to(&self, entity: EntityId) -> BTreeSet<TakeBribery> {
        self.take_briberies.get(&entity).cloned().unwrap_or_default()
    }

    /// Every counted vote, across all (entity, from_slot) sources.
    pub fn all_votes(&self) -> BTreeSet<Vote> {
        self.counted_votes.values().flatten().copied().collect()
    }

    pub fn counted_votes_for(&self, key: VoteKey) -> Option<&BTreeSet<Vote>> {
        self.counted_votes.get(&key)
    }

    /// Fork choice from `entity`'s point of view.
    ///
    /// Only blocks the entity knows take part. Attestation weight accumulates
    /// up the parent chain; the current slot's block earns [`PROPOSER_BOOST`]
    /// while on time. At every step the child with the strictly greatest
    /// weight wins; a tie is an invariant violation, not a coin flip.
    pub fn head(&self, entity: EntityId) -> Result<u64, EngineError> {
        let empty = BTreeSet::new();
        let knowledge = self.knowledge_of_blocks.get(&entity).unwrap_or(&empty);

        let mut acc: BTreeMap<u64, u64> = BTreeMap::new();
        // Ascending order matters: a slot's weight must be settled before it
        // is pushed up to its ancestors.
        for (&slot, &votes) in &self.slot_to_votes {
            if !knowledge.contains(&slot) {
                continue;
            }
            let mut weight = votes;
            if slot == self.slot.num && self.blocks[&slot].on_time {
                weight += PROPOSER_BOOST;
            }
            let total = *acc.entry(slot).and_modify(|w| *w += weight).or_insert(weight);
            let mut ancestor = self.blocks[&slot].parent_slot;
            while ancestor != self.base_head_slot {
                *acc.entry(ancestor).or_insert(0) += total;
                ancestor = self.blocks[&ancestor].parent_slot;
            }
        }

        let mut children: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for (&slot, block) in &self.blocks {
            if !knowledge.contains(&slot) {
                continue;
            }
            if block.parent_slot != self.base_head_slot
                && !knowledge.contains(&block.parent_slot)
            {
                return Err(EngineError::KnowledgeGap {
                    entity,
                    slot,
                    parent_slot: block.parent_slot,
                });
            }
            children.entry(block.parent_slot).or_default().push(slot);
        }

        let mut head = self.base_head_slot;
        while let Some(descendants) = children.get(&head) {
            let weight_of = |slot: u64| acc.get(&slot).copied().unwrap_or(0);
            let &best = descendants
                .iter()
                .max_by_key(|&&slot| weight_of(slot))
                .expect("children lists are never empty");
            let best_weight = weight_of(best);
            if descendants.iter().any(|&slot| slot != best && weight_of(slot) == best_weight) {
                return Err(EngineError::ForkChoiceTie { parent: head, weight: best_weight });
            }
            head = best;
        }
        Ok(head)
    }

    /// How many fresh indices `new_vote` contributes against the votes
    /// already counted for its (entity, from_slot).
    ///
    /// `Ok(None)` is the double-vote sentinel: an already-counted vote for a
    /// different target overlaps the new range. An exact repeat contributes
    /// 0; a same-target overlap that is not an exact repeat is malformed.
    pub fn check_vote<'a>(
        existing: impl IntoIterator<Item = &'a Vote>,
        new_vote: &Vote,
    ) -> Result<Option<u64>, EngineError> {
        for vote in existing {
            if vote.to_slot == new_vote.to_slot {
                if vote == new_vote {
                    return Ok(Some(0));
                }
                if new_vote.max_index >= vote.min_index && vote.max_index >= new_vote.min_index {
                    return Err(EngineError::FracturedVote { vote: *new_vote });
                }
            } else if new_vote.max_index >= vote.min_index
                && vote.max_index >= new_vote.min_index
            {
                return Ok(None);
            }
        }
        Ok(Some(new_vote.amount()))
    }

    /// Count a batch of attestations. Legal only in the attest phase.
    ///
    /// Votes cast from the current slot only reach fork choice after the next
    /// slot boundary; votes about earlier slots count immediately.
    pub fn add_votes(
        &self,
        votes: impl IntoIterator<Item = Vote>,
    ) -> Result<Engine, EngineError> {
        if self.slot.phase != Phase::Attest {
            return Err(EngineError::NotAttestPhase { at: self.slot });
        }
        let mut counted_votes = self.counted_votes.clone();
        let mut slot_to_votes = self.slot_to_votes.clone();
        let mut slot_to_all_votes = self.slot_to_all_votes.clone();

        for vote in votes {
            let voting_power = self
                .entity_to_voting_power
                .get(&vote.entity)
                .copied()
                .ok_or(EngineError::UnknownEntity { entity: vote.entity })?;
            if vote.min_index > vote.max_index || vote.max_index >= voting_power {
                return Err(EngineError::IndexOutOfRange {
                    entity: vote.entity,
                    min_index: vote.min_index,
                    max_index: vote.max_index,
                    voting_power,
                });
            }
            if vote.to_slot > vote.from_slot || vote.from_slot > self.slot.num {
                return Err(EngineError::VoteOrder { vote, current: self.slot.num });
            }
            if vote.to_slot != self.base_head_slot && !self.blocks.contains_key(&vote.to_slot) {
                return Err(EngineError::UnknownVoteTarget { to_slot: vote.to_slot });
            }

            let key = vote.key();
            let existing = counted_votes.entry(key).or_default();
            let additional = Engine::check_vote(existing.iter(), &vote)?
                .ok_or(EngineError::DoubleVote { vote })?;

            *slot_to_all_votes.entry(vote.to_slot).or_insert(0) += additional;
            if vote.from_slot != self.slot.num {
                *slot_to_votes.entry(vote.to_slot).or_insert(0) += additional;
            }
            existing.insert(vote);
        }

        let mut next = self.clone();
        next.counted_votes = counted_votes;
        next.slot_to_votes = slot_to_votes;
        next.slot_to_all_votes = slot_to_all_votes;
        Ok(next)
    }

    /// Grant entities knowledge of block slots.
    pub fn add_knowledge(&self, grants: &BTreeMap<EntityId, Vec<u64>>) -> Engine {
        let mut next = self.clone();
        for (&entity, slots) in grants {
            next.knowledge_of_blocks.entry(entity).or_default().extend(slots.iter().copied());
        }
        next
    }

    /// Spread bribery offers into the named entities' off-chain knowledge.
    pub fn add_offer_bribery(
        &self,
        grants: &BTreeMap<EntityId, Vec<OfferBribery>>,
    ) -> Result<Engine, EngineError> {
        let mut next = self.clone();
        for (&entity, offers) in grants {
            for offer in offers {
                self.validate_offer(offer)?;
                next.offer_briberies.entry(entity).or_default().insert(offer.clone());
            }
        }
        Ok(next)
    }

    fn validate_offer(&self, offer: &OfferBribery) -> Result<(), EngineError> {
        if offer.attests.is_empty() {
            return Err(EngineError::InvalidOffer { reason: "no attestation requests".into() });
        }
        if offer.bribee == offer.briber {
            return Err(EngineError::InvalidOffer {
                reason: format!("bribee and briber are both {}", offer.bribee),
            });
        }
        let target = offer.attests[0].slot;
        if offer.attests.iter().any(|single| single.slot != target) {
            return Err(EngineError::InvalidOffer {
                reason: "attestation requests disagree on the target slot".into(),
            });
        }
        if offer.included_slots.intersection(&offer.excluded_slots).next().is_some() {
            return Err(EngineError::InvalidOffer {
                reason: "included and excluded slots overlap".into(),
            });
        }
        for single in &offer.attests {
            if single.slot != self.base_head_slot && !self.blocks.contains_key(&single.slot) {
                return Err(EngineError::UnknownOfferTarget { slot: single.slot });
            }
        }
        Ok(())
    }

    /// Spread claim receipts into the named entities' off-chain knowledge.
    ///
    /// Each claim is cross-checked against the attestation request it
    /// references and against the counted votes of its (entity, from_slot):
    /// a claim that would double-vote is rejected outright.
    pub fn add_take_briberies(
        &self,
        grants: &BTreeMap<EntityId, Vec<TakeBribery>>,
    ) -> Result<Engine, EngineError> {
        let mut next = self.clone();
        for (&entity, takes) in grants {
            for take in takes {
                let single = take.reference.attests.get(take.index).ok_or(
                    EngineError::ClaimIndexOutOfBounds {
                        index: take.index,
                        len: take.reference.attests.len(),
                    },
                )?;
                if take.reference.bribee != take.vote.entity {
                    return Err(EngineError::ClaimMismatch {
                        reason: format!(
                            "vote by {} but the offer bribes {}",
                            take.vote.entity, take.reference.bribee
                        ),
                    });
                }
                if single.from_slot != take.vote.from_slot
                    || single.slot != take.vote.to_slot
                    || single.min_index != take.vote.min_index
                    || single.max_index != take.vote.max_index
                {
                    return Err(EngineError::ClaimMismatch {
                        reason: format!(
                            "vote {:?} does not match request {:?}",
                            take.vote, single
                        ),
                    });
                }
                let existing = self.counted_votes.get(&take.vote.key());
                let check = Engine::check_vote(
                    existing.into_iter().flatten(),
                    &take.vote,
                )?;
                if check.is_none() {
                    return Err(EngineError::DoubleVote { vote: take.vote });
                }
                next.take_briberies.entry(entity).or_default().insert(take.clone());
            }
        }
        Ok(next)
    }

    /// Advance one half-slot. Entering a new slot freezes the attest-phase
    /// vote view: everything counted so far becomes visible to fork choice.
    pub fn slot_progress(&self) -> Engine {
        let mut next = self.clone();
        next.slot = self.slot.next();
        if next.slot.phase == Phase::Propose {
            next.slot_to_votes = next.slot_to_all_votes.clone();
        }
        next
    }

    /// The central transition: seal a block.
    ///
    /// The proposer applies every claim receipt it holds (minus censored
    /// ones) to the escrow state inherited from the parent, includes every
    /// counted vote not already included on the branch (minus censored ones)
    /// and pays the consensus attestation rewards for them.
    pub fn build_block(
        &self,
        build: &BuildBlock<'_>,
        mut take_censor: impl FnMut(&TakeBribery) -> bool,
        mut vote_censor: impl FnMut(&Vote) -> bool,
    ) -> Result<Engine, EngineError> {
        let slot = build.slot;
        let parent_slot = build.parent_slot;

        if self.blocks.contains_key(&slot) {
            return Err(EngineError::DuplicateSlot { slot });
        }
        if parent_slot != self.base_head_slot && !self.blocks.contains_key(&parent_slot) {
            return Err(EngineError::UnknownParent { slot, parent_slot });
        }
        let proposer = match build.proposer {
            Some(proposer) => {
                if let Some(&owner) = self.slot_to_owner.get(&slot) {
                    if owner != proposer {
                        return Err(EngineError::SlotOwnerMismatch { slot, owner, proposer });
                    }
                }
                proposer
            }
            None => self
                .slot_to_owner
                .get(&slot)
                .copied()
                .ok_or(EngineError::NoProposer { slot })?,
        };

        let parent = self.blocks.get(&parent_slot);
        let mut escrow: BTreeMap<OfferBribery, PayToAttestState> =
            parent.map(|block| block.pay_to_attests.clone()).unwrap_or_default();
        let mut wallet =
            parent.map(|block| block.wallet_state.clone()).unwrap_or_default();

        // Offers the proposer knows but the branch has not seen yet open a
        // fresh escrow.
        for offer in self.offers_known_to(proposer) {
            escrow.entry(offer.clone()).or_insert_with(|| PayToAttestState::new(offer));
        }

        for take in self.takes_known_to(proposer) {
            if !take_censor(&take) {
                continue;
            }
            let Some(state) = escrow.get(&take.reference) else {
                // A receipt for an offer the branch never escrowed.
                continue;
            };
            if state.achieved[take.index] {
                continue;
            }
            let deadline = take.reference.attests[take.index].deadline;
            let mut state = state.achieve(take.index, deadline.map_or(true, |d| slot <= d));
            if state.all_achieved() && !state.paid {
                let offer = &take.reference;
                let mut extra_funds = false;
                if state.all_before_deadline() {
                    let mut branch: BTreeSet<u64> =
                        [slot, self.base_head_slot].into_iter().collect();
                    let mut ancestor = parent_slot;
                    while ancestor != self.base_head_slot {
                        branch.insert(ancestor);
                        ancestor = self.blocks[&ancestor].parent_slot;
                    }
                    extra_funds = offer.included_slots.is_subset(&branch)
                        && offer.excluded_slots.intersection(&branch).next().is_none();
                }
                if extra_funds {
                    wallet = wallet.pay(Payment::bribery(
                        offer.briber.into(),
                        offer.bribed_proposer.into(),
                        offer.deadline_payback as i64,
                        offer.all_indices,
                        PayChannel::DeadlinePayback,
                        "proposer reward for not censoring",
                    ));
                    wallet = wallet.pay(Payment::bribery(
                        offer.briber.into(),
                        offer.bribee.into(),
                        offer.deadline_reward as i64,
                        offer.all_indices,
                        PayChannel::DeadlineReward,
                        "reward to the bribee for voting timely",
                    ));
                }
                wallet = wallet.pay(Payment::bribery(
                    offer.briber.into(),
                    offer.bribee.into(),
                    offer.base_reward as i64,
                    offer.all_indices,
                    PayChannel::BaseReward,
                    "base reward to the bribee",
                ));
                state = state.mark_paid(extra_funds);
                trace!("escrow paid at slot {slot} (extra_funds: {extra_funds})");
            }
            escrow.insert(take.reference.clone(), state);
        }

        // Votes already included somewhere on the branch.
        let mut included: BTreeSet<Vote> = BTreeSet::new();
        let mut ancestor = parent_slot;
        while ancestor != self.base_head_slot {
            let block = &self.blocks[&ancestor];
            included.extend(block.votes.iter().copied());
            ancestor = block.parent_slot;
        }

        let considerable: BTreeSet<Vote> = self
            .all_votes()
            .into_iter()
            .filter(|vote| vote.from_slot < slot)
            .collect();
        let votes: BTreeSet<Vote> = considerable
            .iter()
            .filter(|vote| !included.contains(vote))
            .filter(|vote| vote_censor(vote))
            .copied()
            .collect();

        // Committee agreement per source slot, over every countable vote.
        let mut total_per_slot: BTreeMap<u64, u64> = BTreeMap::new();
        let mut per_target: BTreeMap<(u64, u64), u64> = BTreeMap::new();
        for vote in &considerable {
            *total_per_slot.entry(vote.from_slot).or_insert(0) += vote.amount();
            *per_target.entry((vote.from_slot, vote.to_slot)).or_insert(0) += vote.amount();
        }

        // The branch ancestor at each voted-from height decides head
        // correctness.
        let mut correct_heads: BTreeMap<u64, u64> = BTreeMap::new();
        let from_slots: BTreeSet<u64> = votes.iter().map(|vote| vote.from_slot).collect();
        let mut walker = slot;
        for &curr_slot in from_slots.iter().rev() {
            while walker > curr_slot {
                walker = if walker == slot {
                    parent_slot
                } else {
                    self.blocks[&walker].parent_slot
                };
            }
            correct_heads.insert(curr_slot, walker);
        }

        for vote in &votes {
            let timeliness = if correct_heads[&vote.from_slot] == vote.to_slot {
                Timeliness::SourceTargetHead
            } else {
                Timeliness::SourceTarget
            };
            let slot_total = total_per_slot[&vote.from_slot] as f64;
            let common = AttestFractions {
                source: slot_total / ATTESTATORS_PER_SLOT as f64,
                target: slot_total / ATTESTATORS_PER_SLOT as f64,
                head: per_target[&(vote.from_slot, vote.to_slot)] as f64
                    / ATTESTATORS_PER_SLOT as f64,
            };
            let (reward, punishment) =
                attestation_base_reward(timeliness, &common, slot - vote.from_slot);
            let scale = (BASE_INCREMENT * B * vote.amount()) as f64;
            let reward = reward * scale;
            let punishment = punishment * scale;

            wallet = wallet.pay(Payment::consensus(
                Address::Consensus,
                vote.entity.into(),
                (reward + punishment) as i64,
                "consensus reward for attesting",
            ));
            wallet = wallet.pay(Payment::consensus(
                Address::Consensus,
                proposer.into(),
                (reward * W_P as f64 / (W_SUM - W_P) as f64) as i64,
                "proposer reward for including attestations",
            ));
        }

        if build.final_block {
            // Past any reasonable deadline now: paid escrows that never
            // released their bonuses burn them.
            for (offer, state) in &escrow {
                if state.paid && !state.extra_funds {
                    wallet = wallet.pay(Payment::bribery(
                        offer.briber.into(),
                        Address::Burned,
                        offer.deadline_reward as i64,
                        offer.all_indices,
                        PayChannel::DeadlineReward,
                        "burning the briber's deadline reward",
                    ));
                    wallet = wallet.pay(Payment::bribery(
                        offer.briber.into(),
                        Address::Burned,
                        offer.deadline_payback as i64,
                        offer.all_indices,
                        PayChannel::DeadlinePayback,
                        "burning the briber's deadline payback",
                    ));
                }
            }
        }

        let block = Block {
            slot,
            parent_slot,
            on_time: slot == self.slot.num,
            wallet_state: wallet,
            pay_to_attests: escrow,
            votes,
        };

        let mut next = self.clone();
        next.blocks.insert(slot, block);
        next.knowledge_of_blocks.entry(proposer).or_default().insert(slot);
        for &entity in build.known_by {
            next.knowledge_of_blocks.entry(entity).or_default().insert(slot);
        }
        Ok(next)
    }
}
