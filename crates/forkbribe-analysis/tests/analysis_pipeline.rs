//! End-to-end analysis: the tensor path against the reference path, the AHA
//! equilibrium scenario, the multi-chain success smoke matrix, and the cache
//! behaviour of the analyzer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use forkbribe_analysis::{
    apply_params, best_case_reward, cannot_make_it_worse, concrete_table, fast_nash_equilibria,
    nash_equilibria, precompile_table, pre_outcome, AnalysisError, Analyzer, GameParams,
    DEFAULT_MAX_TENSOR_CELLS,
};
use forkbribe_primitives::{EntityId, ATTESTATORS_PER_SLOT};
use forkbribe_strategy::{
    AdvParams, BribeeParams, Game, GameConfig, RewardUnits, StrategyParams,
};
use ndarray::{IxDyn, Zip};

const H: EntityId = EntityId::HONEST;
const A: EntityId = EntityId::ADVERSARY;
const B: EntityId = EntityId(2);

fn game(chain: &str, byzantine: &[(char, f64)]) -> Game {
    let mut powers: BTreeMap<char, u64> = byzantine
        .iter()
        .map(|&(tag, alpha)| (tag, (alpha * ATTESTATORS_PER_SLOT as f64) as u64))
        .collect();
    let honest = ATTESTATORS_PER_SLOT - powers.values().sum::<u64>();
    powers.insert('H', honest);
    Game::new(GameConfig {
        base_slot: 0,
        chain_string: chain.to_owned(),
        honest_tag: 'H',
        adversary_tag: 'A',
        entity_to_voting_power: powers,
        reward_units: RewardUnits::symbolic(),
    })
    .unwrap()
}

#[test]
fn tensor_path_reproduces_the_reference_path() {
    let _ = env_logger::builder().is_test(true).try_init();
    let game = game("AHA", &[('A', 0.1), ('B', 0.14)]);
    let run = game.compute_table();
    let game_params = GameParams {
        block_reward: 1000,
        success_reward: 200_302,
        base_reward_unit: 1046,
        deadline_reward_unit: 7381,
        deadline_payback_unit: 208,
    };

    let reference = concrete_table(&run, &game_params);
    let precompiled = precompile_table(&run, DEFAULT_MAX_TENSOR_CELLS).unwrap();
    let fast_rewards = apply_params(&precompiled.tensor, &game_params);
    let fast_mask = fast_nash_equilibria(&fast_rewards);
    let slow_equilibria = nash_equilibria(&reference, &run);

    for (profile, outcome) in &reference {
        let pre = &precompiled.pre_table[profile];
        assert_eq!(outcome.pre.success, pre.success);
        assert_eq!(outcome.pre.entity_to_blocks, pre.entity_to_blocks);
        assert_eq!(outcome.pre.slot_to_canonical, pre.slot_to_canonical);
        assert_eq!(outcome.pre.wallet_state, pre.wallet_state);

        let grid_index = precompiled.profile_index(profile).unwrap();
        for (axis, (player, _)) in precompiled.all_params.iter().enumerate() {
            let mut index = vec![axis];
            index.extend(grid_index.iter().copied());
            assert_eq!(
                outcome.rewards[player],
                fast_rewards[IxDyn(&index)],
                "profile {profile:?}, player {player}"
            );
        }
    }

    let fast_count = fast_mask.iter().filter(|&&m| m).count();
    assert_eq!(fast_count, slow_equilibria.len());
    for profile in &slow_equilibria {
        let index = precompiled.profile_index(profile).unwrap();
        assert!(fast_mask[IxDyn(&index)]);
    }
}

#[test]
fn aha_best_equilibrium_pays_the_bribee_for_both_slots() {
    let game = game("AHA", &[('A', 0.15), ('B', 0.06)]);
    let bribee_power = game.voting_power()[&B];
    let run = game.compute_table();
    let precompiled = precompile_table(&run, DEFAULT_MAX_TENSOR_CELLS).unwrap();

    let game_params = GameParams {
        block_reward: 50_000_000,
        success_reward: 50_000_000,
        base_reward_unit: 2600,
        deadline_reward_unit: 0,
        deadline_payback_unit: 0,
    };
    let rewards = apply_params(&precompiled.tensor, &game_params);

    let mut mask = fast_nash_equilibria(&rewards);
    assert!(mask.iter().any(|&m| m), "the Nash mask must not be empty");

    let baseline_index = precompiled.profile_index(&game.baseline_profile()).unwrap();
    let baselines: Vec<i64> = (0..precompiled.all_params.len())
        .map(|axis| {
            let mut index = vec![axis];
            index.extend(baseline_index.iter().copied());
            rewards[IxDyn(&index)]
        })
        .collect();
    Zip::from(&mut mask)
        .and(&cannot_make_it_worse(&rewards, &baselines))
        .for_each(|m, &keep| *m &= keep);

    let games = best_case_reward(&precompiled, &rewards, &mask)
        .expect("a profitable successful equilibrium exists");
    assert!(games.success);

    // The bribee collects the base reward for both bought slots.
    let expected_base = 2600 * bribee_power as i64 * 2;
    assert!(
        games.entity_to_reward[&B] >= expected_base,
        "bribee reward {} is below the bought base rewards {expected_base}",
        games.entity_to_reward[&B],
    );

    // A patient adversary with a (late) voluntary break-bad slot is among
    // the selected profiles; breaking bad after the fork is decided costs
    // nothing and still lets the bribee collect in full.
    let bribee_axis = 1;
    let base_units_view = precompiled
        .tensor
        .index_axis(ndarray::Axis(0), 3)
        .index_axis_move(ndarray::Axis(0), bribee_axis);
    let mut saw_full_collection = false;
    let mut saw_breaking_patient = false;
    for index in &games.indices {
        if base_units_view[IxDyn(index)] == 2 * bribee_power as i64 {
            saw_full_collection = true;
        }
        if let StrategyParams::Adversary(adv) = precompiled.profile_at(index)[0] {
            if adv.patient && adv.break_bad_slot.is_some() {
                saw_breaking_patient = true;
            }
        }
    }
    assert!(saw_full_collection, "no selected profile collects both slots");
    assert!(saw_breaking_patient, "no selected profile is patient with a voluntary break");
}

#[test]
fn all_in_profiles_fork_successfully_across_chains() {
    let cases: &[(&str, &[(char, f64)])] = &[
        ("HAA", &[('A', 0.4), ('B', 0.15)]),
        ("HA", &[('A', 0.4), ('B', 0.201)]),
        ("AHA", &[('A', 0.1), ('B', 0.11)]),
        ("BHA", &[('A', 0.1), ('B', 0.11)]),
        ("AAHA", &[('A', 0.1), ('B', 0.06)]),
        ("AHA", &[('A', 0.1), ('B', 0.05), ('C', 0.06)]),
    ];

    for (chain, byzantine) in cases {
        let game = game(chain, byzantine);
        let all_in_adv =
            AdvParams { censor_from_slot: None, patient: false, break_bad_slot: None };
        let all_in_bribee = BribeeParams {
            break_bad_slot: None,
            censoring_from_slot: None,
            send_votes_when_able: false,
            last_minute: false,
            only_sending_to_deadline_proposing_entity: false,
            finish_offers_regardless_of_abort: false,
        };
        let bribee_params: BTreeMap<EntityId, BribeeParams> =
            game.bribees().iter().map(|&b| (b, all_in_bribee)).collect();

        let (engine, events) = game.play(all_in_adv, &bribee_params).unwrap();
        let pre = pre_outcome(&engine, &events, game.honest()).unwrap();
        assert!(pre.success, "all-in attack failed on {chain} with {byzantine:?}");
    }
}

#[test]
fn analyzer_caches_precompiles_and_flushes_interrupted_sweeps() {
    let dir = tempfile::tempdir().unwrap();
    let alphas: BTreeMap<char, f64> = [('A', 0.4), ('B', 0.201)].into_iter().collect();

    let mut analyzer = Analyzer::new("HA", 'H', 'A', &alphas, dir.path()).unwrap();
    analyzer.prepare().unwrap();
    assert!(dir
        .path()
        .join("HA-A=12500,B=6281,H=12469")
        .join("precompiles.bin")
        .exists());

    // A fresh analyzer over the same directory loads instead of replaying.
    let mut reloaded = Analyzer::new("HA", 'H', 'A', &alphas, dir.path()).unwrap();
    reloaded.prepare().unwrap();

    // Cancel after four grid points; the partial table must be flushed.
    let calls = AtomicUsize::new(0);
    let cancel = move || calls.fetch_add(1, Ordering::SeqCst) >= 4;
    let partial = reloaded
        .search_equilibria(1000, 2000, 1_000_000, 1_000_000, &cancel)
        .unwrap();
    assert!(partial.len() <= 4);

    // The next sweep resumes from the flushed table and completes the grid.
    let complete = reloaded
        .search_equilibria(1000, 2000, 1_000_000, 1_000_000, &|| false)
        .unwrap();
    assert_eq!(complete.len(), 27);
    for params in complete.keys() {
        assert_eq!(params.block_reward, 1_000_000);
        assert_eq!(params.success_reward, 1_000_000);
    }
}

#[test]
fn oversized_strategy_grids_are_rejected() {
    let game = game("HA", &[('A', 0.4), ('B', 0.201)]);
    let run = game.compute_table();
    let result = precompile_table(&run, 64);
    assert!(matches!(result, Err(AnalysisError::TensorTooLarge { .. })));
}
