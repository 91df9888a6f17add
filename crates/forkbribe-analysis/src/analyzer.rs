//! The cached analysis front-end: play once, price many times.

use std::collections::BTreeMap;
use std::path::PathBuf;

use forkbribe_primitives::{EntityId, ATTESTATORS_PER_SLOT};
use forkbribe_strategy::{Game, GameConfig, RewardUnits, StrategyParams};
use indicatif::ProgressBar;
use log::info;
use ndarray::{IxDyn, Zip};

use crate::cache::ResultCache;
use crate::error::AnalysisError;
use crate::outcome::GameParams;
use crate::tensor::{
    apply_params, best_case_reward, cannot_make_it_worse, fast_nash_equilibria,
    precompile_table, Games, Precompiled, DEFAULT_MAX_TENSOR_CELLS,
};

/// Sweep result: one (possibly empty) equilibrium family per grid point.
pub type SweepTable = BTreeMap<GameParams, Option<Games>>;

/// The best admissible equilibrium found by
/// [`Analyzer::most_profitable_successful_forks`].
#[derive(Debug, Clone)]
pub struct BestFork {
    pub game_params: GameParams,
    pub profile: Vec<(EntityId, StrategyParams)>,
    pub entity_to_reward: BTreeMap<EntityId, i64>,
    /// Per-player deviation ratios of the chosen profile.
    pub ratios: Vec<f64>,
    /// What each player would earn under the passive baseline profile.
    pub base_rewards: BTreeMap<EntityId, i64>,
}

/// Plays a chain's full strategy grid once, caches the precompiled tensor,
/// then prices and filters equilibria across economic parameter grids.
pub struct Analyzer {
    game: Game,
    cache: ResultCache,
    cache_dir: String,
    precompiled: Option<Precompiled>,
    max_cells: u128,
}

impl Analyzer {
    /// `entity_to_alphas` maps each byzantine tag to its committee share;
    /// the honest entity receives the remainder of the committee.
    pub fn new(
        chain_string: &str,
        honest_tag: char,
        adversary_tag: char,
        entity_to_alphas: &BTreeMap<char, f64>,
        cache_root: impl Into<PathBuf>,
    ) -> Result<Self, AnalysisError> {
        let byzantine_powers: BTreeMap<char, u64> = entity_to_alphas
            .iter()
            .map(|(&tag, &alpha)| (tag, (alpha * ATTESTATORS_PER_SLOT as f64) as u64))
            .collect();
        let honest_power = ATTESTATORS_PER_SLOT - byzantine_powers.values().sum::<u64>();

        let mut entity_to_voting_power = byzantine_powers;
        entity_to_voting_power.insert(honest_tag, honest_power);

        let cache_dir = format!(
            "{chain_string}-{}",
            entity_to_voting_power
                .iter()
                .map(|(tag, power)| format!("{tag}={power}"))
                .collect::<Vec<_>>()
                .join(",")
        );

        let game = Game::new(GameConfig {
            base_slot: 0,
            chain_string: chain_string.to_owned(),
            honest_tag,
            adversary_tag,
            entity_to_voting_power,
            reward_units: RewardUnits::symbolic(),
        })?;

        Ok(Analyzer {
            game,
            cache: ResultCache::new(cache_root),
            cache_dir,
            precompiled: None,
            max_cells: DEFAULT_MAX_TENSOR_CELLS,
        })
    }

    pub fn with_max_cells(mut self, max_cells: u128) -> Self {
        self.max_cells = max_cells;
        self
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Load the precompiled tensor from the cache, or play the full grid and
    /// persist it.
    pub fn prepare(&mut self) -> Result<&Precompiled, AnalysisError> {
        if self.precompiled.is_none() {
            let key = format!("{}/precompiles.bin", self.cache_dir);
            let precompiled = match self.cache.get_decoded::<Precompiled>(&key) {
                Some(precompiled) => {
                    info!("loaded precompiled games from cache");
                    precompiled
                }
                None => {
                    info!("playing games for {}", self.cache_dir);
                    let run = self.game.compute_table();
                    let precompiled = precompile_table(&run, self.max_cells)?;
                    self.cache.put_encoded(&key, &precompiled)?;
                    precompiled
                }
            };
            self.precompiled = Some(precompiled);
        }
        self.precompiled.as_ref().ok_or(AnalysisError::NotPrepared)
    }

    fn sweep_key(&self, block_reward: i64, success_reward: i64) -> String {
        format!(
            "{}/block_reward={block_reward},success_reward={success_reward}.bin",
            self.cache_dir
        )
    }

    /// Sweep the (base, deadline, payback) unit grid, computing the
    /// best-case equilibrium family per point.
    ///
    /// `cancel` is polled at every grid point; on cancellation the partial
    /// table is flushed to the cache and returned.
    pub fn search_equilibria(
        &mut self,
        step: i64,
        upper_bound: i64,
        block_reward: i64,
        success_reward: i64,
        cancel: &dyn Fn() -> bool,
    ) -> Result<SweepTable, AnalysisError> {
        self.prepare()?;
        let precompiled = self.precompiled.as_ref().ok_or(AnalysisError::NotPrepared)?;

        let key = self.sweep_key(block_reward, success_reward);
        let mut table: SweepTable = self.cache.get_decoded(&key).unwrap_or_default();

        let baseline_index = precompiled.profile_index(&self.game.baseline_profile())?;
        let players = precompiled.all_params.len();

        let step = step.max(1);
        let axis: Vec<i64> = (0..=upper_bound).step_by(step as usize).collect();
        let bar = ProgressBar::new((axis.len() * axis.len() * axis.len()) as u64);

        let mut cancelled = false;
        'sweep: for &base_reward_unit in &axis {
            for &deadline_reward_unit in &axis {
                for &deadline_payback_unit in &axis {
                    if cancel() {
                        cancelled = true;
                        break 'sweep;
                    }
                    bar.inc(1);
                    let game_params = GameParams {
                        block_reward,
                        success_reward,
                        base_reward_unit,
                        deadline_reward_unit,
                        deadline_payback_unit,
                    };
                    if table.contains_key(&game_params) {
                        continue;
                    }

                    let rewards = apply_params(&precompiled.tensor, &game_params);
                    let baselines: Vec<i64> = (0..players)
                        .map(|player| {
                            let mut index = Vec::with_capacity(1 + baseline_index.len());
                            index.push(player);
                            index.extend(baseline_index.iter().copied());
                            rewards[IxDyn(&index)]
                        })
                        .collect();

                    let mut mask = fast_nash_equilibria(&rewards);
                    Zip::from(&mut mask)
                        .and(&cannot_make_it_worse(&rewards, &baselines))
                        .for_each(|m, &keep| *m &= keep);

                    table.insert(game_params, best_case_reward(precompiled, &rewards, &mask));
                }
            }
        }
        bar.finish_and_clear();

        self.cache.put_encoded(&key, &table)?;
        if cancelled {
            info!("sweep cancelled; partial table of {} points flushed", table.len());
        }
        Ok(table)
    }

    /// Among all successful grid points, pick the one whose best admissible
    /// equilibrium maximises the adversary's reward, subject to every
    /// player's deviation ratio staying under `max_ratio`.
    pub fn most_profitable_successful_forks(
        &self,
        table: &SweepTable,
        max_ratio: f64,
    ) -> Result<Option<BestFork>, AnalysisError> {
        let precompiled = self.precompiled.as_ref().ok_or(AnalysisError::NotPrepared)?;
        let adversary = precompiled.adversary;

        let max_of = |ratios: &[f64]| ratios.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let admissible = |games: &Games| {
            games.damage_cost_ratios.iter().any(|ratios| max_of(ratios) <= max_ratio)
        };

        let best = table
            .iter()
            .filter_map(|(params, games)| games.as_ref().map(|games| (params, games)))
            .filter(|(_, games)| games.success && admissible(games))
            .max_by_key(|(_, games)| games.entity_to_reward[&adversary]);
        let Some((&game_params, games)) = best else {
            return Ok(None);
        };

        let Some((index, ratios)) = games
            .indices
            .iter()
            .zip(&games.damage_cost_ratios)
            .filter(|(_, ratios)| max_of(ratios) <= max_ratio)
            .max_by(|(_, a), (_, b)| {
                let sum_a: f64 = a.iter().sum();
                let sum_b: f64 = b.iter().sum();
                sum_a.partial_cmp(&sum_b).unwrap_or(std::cmp::Ordering::Equal)
            })
        else {
            return Ok(None);
        };

        let profile = precompiled.profile_at(index);
        let players = precompiled.players();
        let profile: Vec<(EntityId, StrategyParams)> =
            players.iter().copied().zip(profile).collect();

        let rewards = apply_params(&precompiled.tensor, &game_params);
        let baseline_index = precompiled.profile_index(&self.game.baseline_profile())?;
        let base_rewards: BTreeMap<EntityId, i64> = players
            .iter()
            .enumerate()
            .map(|(axis, &player)| {
                let mut index = Vec::with_capacity(1 + baseline_index.len());
                index.push(axis);
                index.extend(baseline_index.iter().copied());
                (player, rewards[IxDyn(&index)])
            })
            .collect();

        Ok(Some(BestFork {
            game_params,
            profile,
            entity_to_reward: games.entity_to_reward.clone(),
            ratios: ratios.clone(),
            base_rewards,
        }))
    }
}
