//! Full game flows over short chains: who gets paid what, and when the
//! byzantine side gives up.

use forkbribe_engine::{Address, Engine, PayChannel, WalletState};
use forkbribe_primitives::{EntityId, ATTESTATORS_PER_SLOT};
use forkbribe_strategy::{
    AdvParams, BribeeParams, Game, GameConfig, RewardUnits, StrategyParams,
};

const H: EntityId = EntityId::HONEST;
const A: EntityId = EntityId::ADVERSARY;
const B: EntityId = EntityId(2);

const UNIT_TRIPLES: [(f64, f64, f64); 5] = [
    (10.0, 100.0, 1000.0),
    (1000.0, 320.0, 31.0),
    (21.0, 42.0, 120.0),
    (88.0, 97.0, 103.0),
    (1.0, 14.0, 500.0),
];

fn game(chain: &str, alpha: f64, beta: f64, units: (f64, f64, f64)) -> Game {
    let adv_power = (alpha * ATTESTATORS_PER_SLOT as f64) as u64;
    let bribee_power = (beta * ATTESTATORS_PER_SLOT as f64) as u64;
    let honest_power = ATTESTATORS_PER_SLOT - adv_power - bribee_power;
    Game::new(GameConfig {
        base_slot: 0,
        chain_string: chain.to_owned(),
        honest_tag: 'H',
        adversary_tag: 'A',
        entity_to_voting_power: [('H', honest_power), ('A', adv_power), ('B', bribee_power)]
            .into_iter()
            .collect(),
        reward_units: RewardUnits {
            base_reward_unit: units.0,
            deadline_reward_unit: units.1,
            deadline_payback_unit: units.2,
        },
    })
    .unwrap()
}

fn bribee_level(level: u8) -> BribeeParams {
    BribeeParams {
        break_bad_slot: None,
        censoring_from_slot: None,
        send_votes_when_able: false,
        last_minute: level >= 1,
        only_sending_to_deadline_proposing_entity: level == 2,
        finish_offers_regardless_of_abort: false,
    }
}

fn adv(patient: bool) -> AdvParams {
    AdvParams { censor_from_slot: None, patient, break_bad_slot: None }
}

/// Wallet of the block the honest entity considers canonical after the game.
fn final_wallet(engine: &Engine) -> &WalletState {
    let head = engine.head(H).unwrap();
    &engine.block(head).unwrap().wallet_state
}

fn has_payment(
    wallet: &WalletState,
    from: Address,
    to: Address,
    channel: PayChannel,
    amount: i64,
) -> bool {
    wallet
        .ledger()
        .iter()
        .any(|p| p.from == from && p.to == to && p.channel == channel && p.amount == amount)
}

struct PaidFlags {
    base: bool,
    deadline: bool,
    payback: bool,
}

fn bribery_payments(engine: &Engine, units: (f64, f64, f64), indices: u64) -> PaidFlags {
    let wallet = final_wallet(engine);
    PaidFlags {
        base: has_payment(
            wallet,
            A.into(),
            B.into(),
            PayChannel::BaseReward,
            (units.0 * indices as f64).ceil() as i64,
        ),
        deadline: has_payment(
            wallet,
            A.into(),
            B.into(),
            PayChannel::DeadlineReward,
            (units.1 * indices as f64).ceil() as i64,
        ),
        payback: has_payment(
            wallet,
            A.into(),
            A.into(),
            PayChannel::DeadlinePayback,
            (units.2 * indices as f64).ceil() as i64,
        ),
    }
}

#[test]
fn aha_patient_adversary_pays_in_full() {
    let _ = env_logger::builder().is_test(true).try_init();
    for units in UNIT_TRIPLES {
        let game = game("AHA", 0.15, 0.06, units);
        let bribee_power = game.voting_power()[&B];
        for level in 0..3 {
            let (engine, _) = game
                .play(adv(true), &[(B, bribee_level(level))].into_iter().collect())
                .unwrap();
            let paid = bribery_payments(&engine, units, bribee_power * 2);
            assert!(paid.base, "level {level}: base reward missing");
            assert!(paid.deadline, "level {level}: deadline reward missing");
            assert!(paid.payback, "level {level}: deadline payback missing");
        }
    }
}

#[test]
fn aha_impatient_adversary_only_tolerates_prompt_votes() {
    for units in UNIT_TRIPLES {
        let game = game("AHA", 0.15, 0.06, units);
        let bribee_power = game.voting_power()[&B];
        for level in 0..3 {
            let (engine, events) = game
                .play(adv(false), &[(B, bribee_level(level))].into_iter().collect())
                .unwrap();
            let paid = bribery_payments(&engine, units, bribee_power * 2);
            let prompt = level == 0;
            assert_eq!(paid.base, prompt, "level {level}");
            assert_eq!(paid.deadline, prompt, "level {level}");
            assert_eq!(paid.payback, prompt, "level {level}");
            if !prompt {
                assert!(events.iter().any(|(_, e)| e.contains("aborts the attack")));
            }
        }
    }
}

#[test]
fn aha_censoring_adversary_still_owes_the_base_reward() {
    for units in UNIT_TRIPLES {
        let game = game("AHA", 0.15, 0.06, units);
        let bribee_power = game.voting_power()[&B];
        let censoring =
            AdvParams { censor_from_slot: Some(3), patient: false, break_bad_slot: None };
        let (engine, _) = game
            .play(censoring, &[(B, bribee_level(0))].into_iter().collect())
            .unwrap();
        let paid = bribery_payments(&engine, units, bribee_power * 2);
        assert!(paid.base);
        assert!(!paid.deadline);
        assert!(!paid.payback);
    }
}

#[test]
fn aha_finishing_offers_after_an_abort_salvages_the_base_reward() {
    for units in UNIT_TRIPLES {
        let game = game("AHA", 0.15, 0.06, units);
        let bribee_power = game.voting_power()[&B];

        let finishing = BribeeParams {
            finish_offers_regardless_of_abort: true,
            ..bribee_level(1)
        };
        // The impatient adversary aborts at slot 1; the bribee delivers
        // anyway, off the winning branch.
        let (engine, _) =
            game.play(adv(false), &[(B, finishing)].into_iter().collect()).unwrap();
        let paid = bribery_payments(&engine, units, bribee_power * 2);
        assert!(paid.base);
        assert!(!paid.deadline);
        assert!(!paid.payback);

        // Voluntary mid-window abort: the slot-2 votes were already out
        // before the bribee noticed, with or without the finishing flag.
        let breaking =
            AdvParams { censor_from_slot: None, patient: true, break_bad_slot: Some(2) };
        for finish in [true, false] {
            let bribee = BribeeParams {
                finish_offers_regardless_of_abort: finish,
                ..bribee_level(1)
            };
            let (engine, _) =
                game.play(breaking, &[(B, bribee)].into_iter().collect()).unwrap();
            let paid = bribery_payments(&engine, units, bribee_power * 2);
            assert!(paid.base, "finish={finish}");
            assert!(!paid.deadline, "finish={finish}");
            assert!(!paid.payback, "finish={finish}");
        }
    }
}

#[test]
fn haa_single_slot_offers_pay_for_one_slot_of_indices() {
    for units in UNIT_TRIPLES {
        let game = game("HAA", 0.4, 0.14, units);
        let bribee_power = game.voting_power()[&B];
        for patient in [true, false] {
            for level in 0..3 {
                let (engine, _) = game
                    .play(adv(patient), &[(B, bribee_level(level))].into_iter().collect())
                    .unwrap();
                let paid = bribery_payments(&engine, units, bribee_power);
                assert!(paid.base, "patient={patient} level={level}");
                assert!(paid.deadline, "patient={patient} level={level}");
                assert!(paid.payback, "patient={patient} level={level}");
            }
        }
    }
}

#[test]
fn declined_offers_leave_the_ledgers_free_of_bribery() {
    let units = (21.0, 42.0, 120.0);
    let game = game("AHA", 0.15, 0.06, units);
    // Deadlines inside the window never strictly exceed this break-bad slot,
    // so every offer is declined outright.
    let declining = BribeeParams { break_bad_slot: Some(4), ..BribeeParams::baseline(0) };
    let (engine, events) =
        game.play(adv(true), &[(B, declining)].into_iter().collect()).unwrap();

    let wallet = final_wallet(&engine);
    assert!(wallet
        .ledger()
        .iter()
        .all(|p| p.channel == PayChannel::Wallet));
    assert!(events.iter().any(|(_, e)| e.contains("declines a bribe")));
    // With no bribee the fork cannot win; the honest chain prevails.
    let head = engine.head(H).unwrap();
    let mut canonical = Vec::new();
    let mut slot = head;
    while slot != engine.base_head_slot() {
        canonical.push(slot);
        slot = engine.block(slot).unwrap().parent_slot;
    }
    assert!(canonical.contains(&2));
    assert!(!canonical.contains(&1));
}

#[test]
fn strategy_spaces_have_the_advertised_shapes() {
    let game = game("AHA", 0.15, 0.06, (1.0, 1.0, 1.0));
    // break_bad: None + 4 slots; patient: 2; censor: None + 2 owned slots.
    assert_eq!(game.all_adv_strategies().len(), 5 * 2 * 3);
    // censoring: None only (B owns no slot); break_bad: 5; send: 2;
    // level: 3; finish: 2.
    assert_eq!(game.all_bribee_strategies(B).len(), 5 * 2 * 3 * 2);

    let all = game.all_params();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].0, A);
    assert_eq!(all[1].0, B);
    // The baseline profile is inside the enumerated spaces.
    let baseline = game.baseline_profile();
    for ((_, space), params) in all.iter().zip(&baseline) {
        assert!(space.contains(params));
    }
    assert!(matches!(baseline[0], StrategyParams::Adversary(_)));
}

#[test]
fn run_table_covers_the_full_product() {
    let game = game("HA", 0.4, 0.201, (1.0, 1.0, 1.0));
    let run = game.compute_table();
    let expected: usize = run.all_params.iter().map(|(_, space)| space.len()).product();
    assert_eq!(run.table.len(), expected);
    assert!(run
        .table
        .values()
        .all(|record| matches!(record, forkbribe_strategy::RunRecord::Completed { .. })));
}
