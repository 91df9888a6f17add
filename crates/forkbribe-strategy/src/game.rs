//! The game driver: fixed proposer schedule, enumerated strategy spaces,
//! one deterministic ten-step loop per slot.

use std::collections::BTreeMap;

use forkbribe_engine::{Engine, EngineError};
use forkbribe_primitives::EntityId;
use itertools::Itertools;
use log::{debug, info, warn};
use thiserror::Error;

use crate::adversary::AdversaryStrategy;
use crate::bribee::BribeeStrategy;
use crate::honest::HonestStrategy;
use crate::hooks::{ByzantineHooks, EventLog, StrategyHooks};
use crate::params::{AdvParams, BribeeParams, RewardUnits, StrategyParams};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("chain string names tag '{0}' with no voting power")]
    UnknownTag(char),

    #[error("the chain contains no honest-owned slot")]
    NoHonestSlot,

    #[error("honest and adversary tags must differ")]
    HonestIsAdversary,
}

/// Tag-level description of a game; mapped to dense ids on construction.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub base_slot: u64,
    pub chain_string: String,
    pub honest_tag: char,
    pub adversary_tag: char,
    /// Voting power per entity tag, bribees included.
    pub entity_to_voting_power: BTreeMap<char, u64>,
    pub reward_units: RewardUnits,
}

/// One player's ordered strategy choice per axis of the profile grid.
pub type StrategyProfile = Vec<StrategyParams>;

/// Outcome of playing one strategy profile.
#[derive(Debug, Clone)]
pub enum RunRecord {
    Completed { engine: Engine, events: EventLog },
    /// The engine rejected a transition mid-game. Recorded, not fatal: the
    /// analyzer scores the point as a failed attack with empty ledgers.
    Failed { error: String },
}

/// Every played profile of a game plus the axes that index them.
#[derive(Debug, Clone)]
pub struct SymbolicRun {
    pub table: BTreeMap<StrategyProfile, RunRecord>,
    /// Player order: the adversary first, then bribees in id order. This is
    /// the axis order of the analysis tensor.
    pub all_params: Vec<(EntityId, Vec<StrategyParams>)>,
    pub honest: EntityId,
    pub adversary: EntityId,
}

/// A bribery game over a fixed proposer schedule.
#[derive(Debug, Clone)]
pub struct Game {
    base_slot: u64,
    chain: Vec<EntityId>,
    honest: EntityId,
    adversary: EntityId,
    bribees: Vec<EntityId>,
    tags: Vec<char>,
    voting_power: BTreeMap<EntityId, u64>,
    units: RewardUnits,
}

impl Game {
    pub fn new(config: GameConfig) -> Result<Game, GameError> {
        if config.honest_tag == config.adversary_tag {
            return Err(GameError::HonestIsAdversary);
        }
        for tag in [config.honest_tag, config.adversary_tag] {
            if !config.entity_to_voting_power.contains_key(&tag) {
                return Err(GameError::UnknownTag(tag));
            }
        }

        // Stable enumeration: honest 0, adversary 1, bribees in tag order.
        let mut tags = vec![config.honest_tag, config.adversary_tag];
        tags.extend(
            config
                .entity_to_voting_power
                .keys()
                .copied()
                .filter(|&tag| tag != config.honest_tag && tag != config.adversary_tag),
        );
        let id_of = |tag: char| {
            tags.iter()
                .position(|&t| t == tag)
                .map(|i| EntityId(i as u8))
                .ok_or(GameError::UnknownTag(tag))
        };

        let chain = config
            .chain_string
            .chars()
            .map(id_of)
            .collect::<Result<Vec<_>, _>>()?;
        if !chain.contains(&EntityId::HONEST) {
            return Err(GameError::NoHonestSlot);
        }

        let voting_power = config
            .entity_to_voting_power
            .iter()
            .map(|(&tag, &power)| Ok((id_of(tag)?, power)))
            .collect::<Result<BTreeMap<_, _>, GameError>>()?;
        let bribees: Vec<EntityId> =
            (2..tags.len()).map(|i| EntityId(i as u8)).collect();

        Ok(Game {
            base_slot: config.base_slot,
            chain,
            honest: EntityId::HONEST,
            adversary: EntityId::ADVERSARY,
            bribees,
            tags,
            voting_power,
            units: config.reward_units,
        })
    }

    pub fn tag(&self, entity: EntityId) -> char {
        self.tags[entity.index()]
    }

    pub fn base_slot(&self) -> u64 {
        self.base_slot
    }

    pub fn chain(&self) -> &[EntityId] {
        &self.chain
    }

    pub fn honest(&self) -> EntityId {
        self.honest
    }

    pub fn adversary(&self) -> EntityId {
        self.adversary
    }

    pub fn bribees(&self) -> &[EntityId] {
        &self.bribees
    }

    pub fn voting_power(&self) -> &BTreeMap<EntityId, u64> {
        &self.voting_power
    }

    pub fn make_engine(&self) -> Engine {
        Engine::new(&self.chain, self.voting_power.clone())
    }

    fn all_entities(&self) -> Vec<EntityId> {
        let mut all = vec![self.honest, self.adversary];
        all.extend(self.bribees.iter().copied());
        all
    }

    /// Play one strategy pairing through the per-slot loop and the trailing
    /// honest block that settles escrows.
    pub fn play(
        &self,
        adv_params: AdvParams,
        bribee_params: &BTreeMap<EntityId, BribeeParams>,
    ) -> Result<(Engine, EventLog), EngineError> {
        let mut events: EventLog = Vec::new();
        let mut honest = HonestStrategy {
            entity: self.honest,
            all_entities: self.all_entities(),
            base_slot: self.base_slot,
            chain_len: self.chain.len() as u64,
        };
        let mut adversary = AdversaryStrategy::new(
            adv_params,
            self.units,
            self.base_slot,
            self.chain.clone(),
            self.adversary,
            self.honest,
            self.bribees.clone(),
        );
        let mut bribees: BTreeMap<EntityId, BribeeStrategy> = bribee_params
            .iter()
            .map(|(&entity, &params)| {
                (
                    entity,
                    BribeeStrategy::new(
                        params,
                        self.base_slot,
                        self.chain.clone(),
                        entity,
                        self.honest,
                        self.adversary,
                        self.bribees.clone(),
                    ),
                )
            })
            .collect();

        let mut engine = self.make_engine();
        for &proposer in &self.chain {
            engine = if proposer == self.honest {
                honest.build(engine, &mut events)?
            } else if proposer == self.adversary {
                adversary.build(engine, &mut events)?
            } else {
                bribees
                    .get_mut(&proposer)
                    .expect("chain proposers are validated at construction")
                    .build(engine, &mut events)?
            };

            engine = adversary.adjust_strategy(engine, &mut events)?;
            for bribee in bribees.values_mut() {
                engine = bribee.adjust_strategy(engine, &mut events)?;
            }

            engine = adversary.offer_bribe(engine, &mut events)?;
            engine = engine.slot_progress();

            engine = honest.vote(engine, &mut events)?;
            engine = adversary.vote(engine, &mut events)?;
            for bribee in bribees.values_mut() {
                engine = bribee.vote(engine, &mut events)?;
            }

            for bribee in bribees.values_mut() {
                engine = bribee.take_bribe(engine, &mut events)?;
            }

            engine = adversary.send_others_votes(engine, &mut events)?;
            for bribee in bribees.values_mut() {
                engine = bribee.send_others_votes(engine, &mut events)?;
            }

            engine = adversary.withheld_blocks(engine, &mut events)?;
            for bribee in bribees.values_mut() {
                engine = bribee.withheld_blocks(engine, &mut events)?;
            }

            engine = adversary.adjust_strategy(engine, &mut events)?;
            for bribee in bribees.values_mut() {
                engine = bribee.adjust_strategy(engine, &mut events)?;
            }

            engine = engine.slot_progress();
        }

        // Trailing honest block, long past every deadline.
        let engine = honest.build(engine, &mut events)?;
        Ok((engine, events))
    }

    /// Every adversary strategy over the schedule.
    pub fn all_adv_strategies(&self) -> Vec<AdvParams> {
        let len = self.chain.len() as u64;
        let mut result = Vec::new();
        let break_bad_slots =
            std::iter::once(None).chain((self.base_slot..=self.base_slot + len).map(Some));
        for break_bad_slot in break_bad_slots {
            for patient in [true, false] {
                result.push(AdvParams { censor_from_slot: None, patient, break_bad_slot });
                for (i, &owner) in self.chain.iter().enumerate() {
                    if owner != self.adversary {
                        continue;
                    }
                    let censor_slot = self.base_slot + 1 + i as u64;
                    result.push(AdvParams {
                        censor_from_slot: Some(censor_slot),
                        patient,
                        break_bad_slot,
                    });
                }
            }
        }
        result
    }

    /// Every strategy of one bribee over the schedule.
    pub fn all_bribee_strategies(&self, entity: EntityId) -> Vec<BribeeParams> {
        let len = self.chain.len() as u64;
        let mut censoring_slots = vec![None];
        censoring_slots.extend(self.chain.iter().enumerate().filter_map(|(i, &owner)| {
            (owner == entity).then(|| Some(self.base_slot + 1 + i as u64))
        }));

        let mut result = Vec::new();
        for censoring_from_slot in censoring_slots {
            let break_bad_slots =
                std::iter::once(None).chain((self.base_slot..=self.base_slot + len).map(Some));
            for break_bad_slot in break_bad_slots {
                for send_votes_when_able in [false, true] {
                    for level in 0..3 {
                        for finish_offers_regardless_of_abort in [false, true] {
                            result.push(BribeeParams {
                                break_bad_slot,
                                censoring_from_slot,
                                send_votes_when_able,
                                last_minute: level >= 1,
                                only_sending_to_deadline_proposing_entity: level == 2,
                                finish_offers_regardless_of_abort,
                            });
                        }
                    }
                }
            }
        }
        result
    }

    /// Axes of the profile grid: the adversary first, then every bribee.
    pub fn all_params(&self) -> Vec<(EntityId, Vec<StrategyParams>)> {
        let mut all = vec![(
            self.adversary,
            self.all_adv_strategies().into_iter().map(StrategyParams::from).collect(),
        )];
        for &bribee in &self.bribees {
            all.push((
                bribee,
                self.all_bribee_strategies(bribee)
                    .into_iter()
                    .map(StrategyParams::from)
                    .collect(),
            ));
        }
        all
    }

    /// The passive-honest profile every player can fall back to.
    pub fn baseline_profile(&self) -> StrategyProfile {
        let mut profile = vec![StrategyParams::from(AdvParams::baseline(self.base_slot))];
        profile
            .extend(self.bribees.iter().map(|_| StrategyParams::from(BribeeParams::baseline(self.base_slot))));
        profile
    }

    /// Play the full Cartesian product of strategy spaces.
    pub fn compute_table(&self) -> SymbolicRun {
        let adv_space = self.all_adv_strategies();
        let bribee_spaces: Vec<(EntityId, Vec<BribeeParams>)> = self
            .bribees
            .iter()
            .map(|&bribee| (bribee, self.all_bribee_strategies(bribee)))
            .collect();

        // Cartesian product over a variable number of bribees; no bribees
        // means the single empty combination.
        let mut combos: Vec<Vec<BribeeParams>> = vec![Vec::new()];
        for (_, space) in &bribee_spaces {
            combos = combos
                .iter()
                .cartesian_product(space.iter())
                .map(|(combo, &params)| {
                    let mut combo = combo.clone();
                    combo.push(params);
                    combo
                })
                .collect();
        }

        info!(
            "playing {} profiles over chain of length {}",
            adv_space.len() * combos.len(),
            self.chain.len()
        );

        let mut table: BTreeMap<StrategyProfile, RunRecord> = BTreeMap::new();
        for &adv_params in &adv_space {
            for combo in &combos {
                let bribee_params: BTreeMap<EntityId, BribeeParams> =
                    self.bribees.iter().copied().zip(combo.iter().copied()).collect();

                let mut profile: StrategyProfile = vec![adv_params.into()];
                profile.extend(combo.iter().map(|&params| StrategyParams::from(params)));

                let record = match self.play(adv_params, &bribee_params) {
                    Ok((engine, events)) => RunRecord::Completed { engine, events },
                    Err(error) => {
                        warn!("profile failed hard: {error}");
                        RunRecord::Failed { error: error.to_string() }
                    }
                };
                table.insert(profile, record);
            }
        }
        debug!("run table holds {} profiles", table.len());

        SymbolicRun {
            table,
            all_params: self.all_params(),
            honest: self.honest,
            adversary: self.adversary,
        }
    }
}
