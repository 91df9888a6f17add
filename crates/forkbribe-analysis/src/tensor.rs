//! The dense analysis tensor and its reductions.
//!
//! Shape `[6, N, |S_1|, …, |S_N|]`: six symbolic channels per player per
//! strategy profile. Pricing a parameter point is one tensor contraction;
//! Nash masks and best-response slices are axis-keepdims reductions. No
//! per-profile loops on the hot path.

use std::collections::BTreeMap;

use forkbribe_engine::{Address, PayChannel};
use forkbribe_primitives::EntityId;
use forkbribe_strategy::{RunRecord, StrategyParams, StrategyProfile, SymbolicRun};
use log::warn;
use ndarray::{ArrayD, Axis, Dimension, IxDyn, Zip};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::outcome::{pre_outcome, GameParams, PreGameOutcome};

/// Channel order of the precompiled tensor.
const CHANNELS: usize = 6;

/// Default cap on tensor cells (8 bytes each): roughly 2 GiB.
pub const DEFAULT_MAX_TENSOR_CELLS: u128 = 1 << 28;

/// The precompiled form of a symbolic run: everything the sweep needs to
/// price parameter points without replaying a single game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Precompiled {
    pub pre_table: BTreeMap<StrategyProfile, PreGameOutcome>,
    /// Per player (in axis order): strategy -> axis index.
    pub params_to_index: Vec<BTreeMap<StrategyParams, usize>>,
    /// Channels x players x strategy axes.
    pub tensor: ArrayD<i64>,
    pub all_params: Vec<(EntityId, Vec<StrategyParams>)>,
    pub honest: EntityId,
    pub adversary: EntityId,
}

impl Precompiled {
    pub fn players(&self) -> Vec<EntityId> {
        self.all_params.iter().map(|(entity, _)| *entity).collect()
    }

    pub fn adversary_axis(&self) -> usize {
        self.all_params
            .iter()
            .position(|(entity, _)| *entity == self.adversary)
            .expect("the adversary always owns the first axis")
    }

    /// Grid coordinates of a profile.
    pub fn profile_index(&self, profile: &StrategyProfile) -> Result<Vec<usize>, AnalysisError> {
        profile
            .iter()
            .zip(&self.params_to_index)
            .map(|(params, index)| index.get(params).copied().ok_or(AnalysisError::UnknownProfile))
            .collect()
    }

    /// Decode grid coordinates back into a profile.
    pub fn profile_at(&self, index: &[usize]) -> StrategyProfile {
        index
            .iter()
            .zip(&self.all_params)
            .map(|(&i, (_, space))| space[i])
            .collect()
    }

    /// The success channel of one player as a strategy-grid view.
    fn success_view(&self) -> ndarray::ArrayViewD<'_, i64> {
        self.tensor.index_axis(Axis(0), 1).index_axis_move(Axis(0), self.adversary_axis())
    }
}

/// Compile a symbolic run into the six-channel tensor.
///
/// Rejects grids whose tensor would not fit the cell cap instead of
/// degrading silently. Hard-failed runs become all-zero, success-false
/// points and are logged.
pub fn precompile_table(
    run: &SymbolicRun,
    max_cells: u128,
) -> Result<Precompiled, AnalysisError> {
    let players = run.all_params.len();
    let mut shape: Vec<usize> = vec![CHANNELS, players];
    shape.extend(run.all_params.iter().map(|(_, space)| space.len()));

    let cells = shape.iter().try_fold(1u128, |acc, &dim| acc.checked_mul(dim as u128));
    match cells {
        Some(cells) if cells <= max_cells => {}
        Some(cells) => return Err(AnalysisError::TensorTooLarge { cells, cap: max_cells }),
        None => return Err(AnalysisError::TensorTooLarge { cells: u128::MAX, cap: max_cells }),
    }

    let params_to_index: Vec<BTreeMap<StrategyParams, usize>> = run
        .all_params
        .iter()
        .map(|(_, space)| space.iter().enumerate().map(|(i, &p)| (p, i)).collect())
        .collect();

    let mut tensor = ArrayD::<i64>::zeros(IxDyn(&shape));
    let mut pre_table: BTreeMap<StrategyProfile, PreGameOutcome> = BTreeMap::new();

    for (profile, record) in &run.table {
        let base_index: Vec<usize> = profile
            .iter()
            .zip(&params_to_index)
            .map(|(params, index)| {
                index.get(params).copied().ok_or(AnalysisError::UnknownProfile)
            })
            .collect::<Result<_, _>>()?;

        let pre = match record {
            RunRecord::Completed { engine, events } => {
                match pre_outcome(engine, events, run.honest) {
                    Ok(pre) => pre,
                    Err(error) => {
                        warn!("profile failed during outcome extraction: {error}");
                        PreGameOutcome::failed(error.to_string())
                    }
                }
            }
            RunRecord::Failed { error } => {
                warn!("hard-failed profile scored as all-zero: {error}");
                PreGameOutcome::failed(error.clone())
            }
        };

        for (player_axis, (player, _)) in run.all_params.iter().enumerate() {
            let address = Address::Entity(*player);
            let wallet = &pre.wallet_state;
            let channels: [i64; CHANNELS] = [
                wallet.channel_amount(address, PayChannel::Wallet),
                (*player == run.adversary && pre.success) as i64,
                pre.entity_to_blocks.get(player).copied().unwrap_or(0) as i64,
                wallet.channel_units(address, PayChannel::BaseReward),
                wallet.channel_units(address, PayChannel::DeadlineReward),
                wallet.channel_units(address, PayChannel::DeadlinePayback),
            ];
            let mut index = Vec::with_capacity(2 + base_index.len());
            index.push(0);
            index.push(player_axis);
            index.extend(base_index.iter().copied());
            for (channel, &value) in channels.iter().enumerate() {
                index[0] = channel;
                tensor[IxDyn(&index)] = value;
            }
        }
        pre_table.insert(profile.clone(), pre);
    }

    Ok(Precompiled {
        pre_table,
        params_to_index,
        tensor,
        all_params: run.all_params.clone(),
        honest: run.honest,
        adversary: run.adversary,
    })
}

/// Contract the channel axis with the economic weight vector, yielding the
/// per-player reward tensor `[N, |S_1|, …, |S_N|]`.
pub fn apply_params(tensor: &ArrayD<i64>, game_params: &GameParams) -> ArrayD<i64> {
    let weights: [i64; CHANNELS] = [
        1,
        game_params.success_reward,
        game_params.block_reward,
        game_params.base_reward_unit,
        game_params.deadline_reward_unit,
        game_params.deadline_payback_unit,
    ];

    let mut reward = tensor.index_axis(Axis(0), 0).to_owned();
    for (channel, &weight) in weights.iter().enumerate().skip(1) {
        if weight == 0 {
            continue;
        }
        Zip::from(&mut reward)
            .and(tensor.index_axis(Axis(0), channel))
            .for_each(|r, &v| *r += weight * v);
    }
    reward
}

/// Pure-strategy Nash mask over the profile grid: AND, per player, of
/// "this player is playing a best response along its own axis".
pub fn fast_nash_equilibria(reward: &ArrayD<i64>) -> ArrayD<bool> {
    let players = reward.shape()[0];
    let grid_shape: Vec<usize> = reward.shape()[1..].to_vec();
    let mut mask = ArrayD::<bool>::from_elem(IxDyn(&grid_shape), true);

    for player in 0..players {
        let view = reward.index_axis(Axis(0), player);
        let maxes = view
            .map_axis(Axis(player), |lane| {
                lane.iter().copied().max().expect("strategy axes are non-empty")
            })
            .insert_axis(Axis(player));
        Zip::from(&mut mask)
            .and(&view)
            .and_broadcast(&maxes)
            .for_each(|m, &v, &best| *m &= v == best);
    }
    mask
}

/// Profiles where no player falls below its baseline-strategy reward.
pub fn cannot_make_it_worse(reward: &ArrayD<i64>, baseline_rewards: &[i64]) -> ArrayD<bool> {
    let grid_shape: Vec<usize> = reward.shape()[1..].to_vec();
    let mut mask = ArrayD::<bool>::from_elem(IxDyn(&grid_shape), true);
    for (player, &floor) in baseline_rewards.iter().enumerate() {
        Zip::from(&mut mask)
            .and(reward.index_axis(Axis(0), player))
            .for_each(|m, &v| *m &= v >= floor);
    }
    mask
}

/// A profitable equilibrium family at one parameter point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Games {
    /// Whether some retained profile forks successfully.
    pub success: bool,
    /// Grid coordinates of the retained profiles.
    pub indices: Vec<Vec<usize>>,
    pub entity_to_reward: BTreeMap<EntityId, i64>,
    /// Per retained profile: the worst damage/cost ratio each player can
    /// inflict by deviating, in player-axis order.
    pub damage_cost_ratios: Vec<Vec<f64>>,
}

/// Collaborative refinement of a Nash mask: among `mask`, keep the profiles
/// where every bribee earns its masked maximum, then the ones maximising the
/// adversary's reward. `None` when the refinement empties out or leaves the
/// adversary unprofitable.
pub fn best_case_reward(
    precompiled: &Precompiled,
    reward: &ArrayD<i64>,
    mask: &ArrayD<bool>,
) -> Option<Games> {
    let adversary_axis = precompiled.adversary_axis();
    let mut mask = mask.clone();
    let mut entity_to_reward: BTreeMap<EntityId, i64> = BTreeMap::new();

    let refine = |mask: &mut ArrayD<bool>, player_axis: usize| -> Option<i64> {
        let view = reward.index_axis(Axis(0), player_axis);
        // Logical iteration order is identical for equal shapes.
        let best = mask
            .iter()
            .zip(view.iter())
            .filter(|(&keep, _)| keep)
            .map(|(_, &v)| v)
            .max()?;
        Zip::from(mask).and(&view).for_each(|m, &v| *m &= v == best);
        Some(best)
    };

    for (player_axis, (player, _)) in precompiled.all_params.iter().enumerate() {
        if player_axis == adversary_axis {
            continue;
        }
        let best = refine(&mut mask, player_axis)?;
        entity_to_reward.insert(*player, best);
    }

    let adv_reward = refine(&mut mask, adversary_axis)?;
    if adv_reward <= 0 {
        return None;
    }
    entity_to_reward.insert(precompiled.adversary, adv_reward);

    let indices: Vec<Vec<usize>> = mask
        .indexed_iter()
        .filter(|(_, &keep)| keep)
        .map(|(index, _)| index.slice().to_vec())
        .collect();
    if indices.is_empty() {
        return None;
    }

    let success_view = precompiled.success_view();
    let success = indices.iter().any(|index| success_view[IxDyn(index)] != 0);
    let damage_cost_ratios =
        indices.iter().map(|index| deviation_ratios(reward, index)).collect();

    Some(Games { success, indices, entity_to_reward, damage_cost_ratios })
}

/// For one equilibrium profile: the worst damage/cost ratio each player can
/// achieve by unilaterally deviating, over all victims.
///
/// Cost is the deviator's best-response shortfall along its own axis; damage
/// is the victim's reward drop. A costless deviation that still damages
/// someone yields infinity.
pub fn deviation_ratios(reward: &ArrayD<i64>, eq_index: &[usize]) -> Vec<f64> {
    let players = reward.shape()[0];
    let mut ratios = vec![0.0_f64; players];

    let reward_at = |player: usize, grid_index: &[usize]| -> i64 {
        let mut index = Vec::with_capacity(1 + grid_index.len());
        index.push(player);
        index.extend(grid_index.iter().copied());
        reward[IxDyn(&index)]
    };

    for deviator in 0..players {
        let axis_len = reward.shape()[1 + deviator];
        let eq_deviator_reward = reward_at(deviator, eq_index);
        let mut worst: f64 = 0.0;
        for alternative in 0..axis_len {
            if alternative == eq_index[deviator] {
                continue;
            }
            let mut deviated = eq_index.to_vec();
            deviated[deviator] = alternative;
            let cost = (eq_deviator_reward - reward_at(deviator, &deviated)) as f64;
            for victim in 0..players {
                if victim == deviator {
                    continue;
                }
                let damage =
                    (reward_at(victim, eq_index) - reward_at(victim, &deviated)) as f64;
                if damage <= 0.0 {
                    continue;
                }
                let ratio = if cost <= 0.0 { f64::INFINITY } else { damage / cost };
                worst = worst.max(ratio);
            }
        }
        ratios[deviator] = worst;
    }
    ratios
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reward tensor for two players with two strategies each, from the two
    /// payoff matrices (rows: player 0's strategy, cols: player 1's).
    fn reward_grid(p0: [[i64; 2]; 2], p1: [[i64; 2]; 2]) -> ArrayD<i64> {
        let mut reward = ArrayD::<i64>::zeros(IxDyn(&[2, 2, 2]));
        for i in 0..2 {
            for j in 0..2 {
                reward[IxDyn(&[0, i, j])] = p0[i][j];
                reward[IxDyn(&[1, i, j])] = p1[i][j];
            }
        }
        reward
    }

    #[test]
    fn apply_params_contracts_the_channel_axis() {
        let mut tensor = ArrayD::<i64>::zeros(IxDyn(&[6, 1, 2]));
        for channel in 0..6 {
            tensor[IxDyn(&[channel, 0, 0])] = 1;
            tensor[IxDyn(&[channel, 0, 1])] = channel as i64;
        }
        let params = GameParams {
            block_reward: 100,
            success_reward: 10,
            base_reward_unit: 7,
            deadline_reward_unit: 5,
            deadline_payback_unit: 3,
        };
        let reward = apply_params(&tensor, &params);
        assert_eq!(reward[IxDyn(&[0, 0])], 1 + 10 + 100 + 7 + 5 + 3);
        assert_eq!(reward[IxDyn(&[0, 1])], 0 + 10 + 200 + 21 + 20 + 15);
    }

    #[test]
    fn defection_dominates_in_a_dilemma() {
        let reward = reward_grid([[3, 0], [5, 1]], [[3, 5], [0, 1]]);
        let mask = fast_nash_equilibria(&reward);
        assert!(!mask[IxDyn(&[0, 0])]);
        assert!(!mask[IxDyn(&[0, 1])]);
        assert!(!mask[IxDyn(&[1, 0])]);
        assert!(mask[IxDyn(&[1, 1])]);
    }

    #[test]
    fn deviation_ratio_weighs_damage_against_cost() {
        // At the [1, 0] equilibrium, either player can hurt the other by
        // deviating, at a price of its own.
        let reward = reward_grid([[3, 0], [5, 4]], [[3, 1], [5, 0]]);
        let ratios = deviation_ratios(&reward, &[1, 0]);
        // Deviator 0 pays 5-3 = 2 and damages player 1 by 5-3 = 2.
        approx::assert_relative_eq!(ratios[0], 1.0);
        // Deviator 1 pays 5-0 = 5 and damages player 0 by 5-4 = 1.
        approx::assert_relative_eq!(ratios[1], 0.2);
    }

    #[test]
    fn helpful_deviations_score_zero() {
        // Leaving a prisoner's dilemma equilibrium only helps the other
        // player, so nobody can inflict damage.
        let reward = reward_grid([[3, 0], [5, 1]], [[3, 5], [0, 1]]);
        let ratios = deviation_ratios(&reward, &[1, 1]);
        approx::assert_relative_eq!(ratios[0], 0.0);
        approx::assert_relative_eq!(ratios[1], 0.0);
    }

    #[test]
    fn costless_damaging_deviations_are_unbounded() {
        // Player 0 is indifferent between its strategies, but switching
        // wrecks player 1.
        let reward = reward_grid([[5, 0], [5, 0]], [[4, 0], [1, 0]]);
        let ratios = deviation_ratios(&reward, &[0, 0]);
        assert!(ratios[0].is_infinite());
        // Deviator 1 pays 4 and damages player 0 by 5.
        approx::assert_relative_eq!(ratios[1], 1.25);
    }

    #[test]
    fn baseline_floor_masks_out_losing_profiles() {
        let reward = reward_grid([[3, 0], [5, 1]], [[3, 5], [0, 1]]);
        let mask = cannot_make_it_worse(&reward, &[1, 1]);
        assert!(mask[IxDyn(&[0, 0])]);
        assert!(!mask[IxDyn(&[0, 1])]);
        assert!(!mask[IxDyn(&[1, 0])]);
        assert!(mask[IxDyn(&[1, 1])]);
    }
}
