//! Concrete game outcomes for a fixed set of economic parameters, and the
//! quadratic-scan Nash enumeration over them. The tensor path in
//! [`crate::tensor`] must reproduce everything here; tests hold the two
//! against each other.

use std::collections::BTreeMap;

use forkbribe_engine::{Address, Engine, EngineError, PayChannel, WalletState};
use forkbribe_primitives::EntityId;
use forkbribe_strategy::{EventLog, RunRecord, StrategyProfile, SymbolicRun};
use serde::{Deserialize, Serialize};

/// Economic parameters a symbolic run is priced with.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GameParams {
    pub block_reward: i64,
    pub success_reward: i64,
    pub base_reward_unit: i64,
    pub deadline_reward_unit: i64,
    pub deadline_payback_unit: i64,
}

/// Parameter-independent facts extracted from one finished game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreGameOutcome {
    pub wallet_state: WalletState,
    /// Block slot -> lies on the canonical chain.
    pub slot_to_canonical: BTreeMap<u64, bool>,
    /// Canonical blocks per owner.
    pub entity_to_blocks: BTreeMap<EntityId, u64>,
    pub success: bool,
    pub events: EventLog,
    /// The engine rejected a transition mid-game; all channels are zero.
    pub hard_failure: bool,
}

impl PreGameOutcome {
    /// All-zero outcome for a run the engine rejected; the error text
    /// survives in the event log.
    pub fn failed(error: String) -> Self {
        PreGameOutcome {
            wallet_state: WalletState::new(),
            slot_to_canonical: BTreeMap::new(),
            entity_to_blocks: BTreeMap::new(),
            success: false,
            events: vec![(Default::default(), format!("hard failure: {error}"))],
            hard_failure: true,
        }
    }
}

/// [`PreGameOutcome`] plus priced rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub rewards: BTreeMap<EntityId, i64>,
    pub consensus_voting_rewards: BTreeMap<EntityId, i64>,
    pub pre: PreGameOutcome,
}

/// Extract the parameter-independent outcome of one completed engine.
pub fn pre_outcome(
    engine: &Engine,
    events: &EventLog,
    honest: EntityId,
) -> Result<PreGameOutcome, EngineError> {
    let head = engine.head(honest)?;
    let mut canonical: Vec<u64> = Vec::new();
    let mut slot = head;
    while let Some(block) = engine.block(slot) {
        canonical.push(slot);
        slot = block.parent_slot;
    }

    let slot_to_canonical: BTreeMap<u64, bool> = engine
        .blocks()
        .keys()
        .map(|&slot| (slot, canonical.contains(&slot)))
        .collect();

    let mut entity_to_blocks: BTreeMap<EntityId, u64> = BTreeMap::new();
    let mut success = true;
    for (&slot, &is_canonical) in &slot_to_canonical {
        if let Some(owner) = engine.owner_of(slot) {
            // The fork succeeded only if every scheduled slot ended up on the
            // wrong side of the honest/canonical correspondence.
            if (owner == honest) == is_canonical {
                success = false;
            }
            if is_canonical {
                *entity_to_blocks.entry(owner).or_insert(0) += 1;
            }
        }
    }

    let wallet_state = engine
        .block(head)
        .map(|block| block.wallet_state.clone())
        .unwrap_or_default();

    Ok(PreGameOutcome {
        wallet_state,
        slot_to_canonical,
        entity_to_blocks,
        success,
        events: events.clone(),
        hard_failure: false,
    })
}

/// Price a parameter-independent outcome for `game_params`.
pub fn concrete_outcome(
    pre: &PreGameOutcome,
    adversary: EntityId,
    players: &[EntityId],
    game_params: &GameParams,
) -> GameOutcome {
    let resolved = pre.wallet_state.resolve(
        game_params.base_reward_unit,
        game_params.deadline_reward_unit,
        game_params.deadline_payback_unit,
    );

    let mut rewards: BTreeMap<EntityId, i64> = BTreeMap::new();
    let mut consensus: BTreeMap<EntityId, i64> = BTreeMap::new();
    for &player in players {
        let address = Address::Entity(player);
        let blocks = pre.entity_to_blocks.get(&player).copied().unwrap_or(0) as i64;
        let mut reward = resolved.get(&address).copied().unwrap_or(0);
        reward += blocks * game_params.block_reward;
        if pre.success && player == adversary {
            reward += game_params.success_reward;
        }
        rewards.insert(player, reward);
        consensus.insert(
            player,
            pre.wallet_state.channel_amount(address, PayChannel::Wallet),
        );
    }

    GameOutcome { rewards, consensus_voting_rewards: consensus, pre: pre.clone() }
}

/// Price every profile of a symbolic run.
pub fn concrete_table(
    run: &SymbolicRun,
    game_params: &GameParams,
) -> BTreeMap<StrategyProfile, GameOutcome> {
    let players: Vec<EntityId> = run.all_params.iter().map(|(entity, _)| *entity).collect();
    run.table
        .iter()
        .map(|(profile, record)| {
            let pre = match record {
                RunRecord::Completed { engine, events } => pre_outcome(engine, events, run.honest)
                    .unwrap_or_else(|error| PreGameOutcome::failed(error.to_string())),
                RunRecord::Failed { error } => PreGameOutcome::failed(error.clone()),
            };
            let outcome = concrete_outcome(&pre, run.adversary, &players, game_params);
            (profile.clone(), outcome)
        })
        .collect()
}

/// Reference pure-strategy Nash enumeration: a profile survives if no player
/// has a unilateral deviation that strictly improves its reward.
pub fn nash_equilibria(
    table: &BTreeMap<StrategyProfile, GameOutcome>,
    run: &SymbolicRun,
) -> Vec<StrategyProfile> {
    let mut equilibria = Vec::new();
    for (profile, outcome) in table {
        let mut is_equilibrium = true;
        'players: for (axis, (player, space)) in run.all_params.iter().enumerate() {
            let current = outcome.rewards[player];
            for alternative in space {
                if alternative == &profile[axis] {
                    continue;
                }
                let mut deviated = profile.clone();
                deviated[axis] = *alternative;
                if table[&deviated].rewards[player] > current {
                    is_equilibrium = false;
                    break 'players;
                }
            }
        }
        if is_equilibrium {
            equilibria.push(profile.clone());
        }
    }
    equilibria
}
