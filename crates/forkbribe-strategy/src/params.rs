//! Strategy parameter types. These are the axes of the enumerated strategy
//! spaces and double as cache keys, so they are fully ordered and
//! serialisable.

use serde::{Deserialize, Serialize};

/// Per-index prices the adversary writes into its offers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardUnits {
    pub base_reward_unit: f64,
    pub deadline_reward_unit: f64,
    pub deadline_payback_unit: f64,
}

impl RewardUnits {
    /// Symbolic pricing: one Gwei per index and channel. The analyzer
    /// re-prices runs through the symbolic ledger, so the concrete values
    /// never feed back into behaviour.
    pub fn symbolic() -> Self {
        RewardUnits { base_reward_unit: 1.0, deadline_reward_unit: 1.0, deadline_payback_unit: 1.0 }
    }
}

/// Adversary strategy axes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AdvParams {
    /// From this slot on, censor every bribery claim out of own blocks.
    pub censor_from_slot: Option<u64>,
    /// Patient: only give up on a bribee once its claim deadline is
    /// imminent. Impatient: expect the vote the moment its slot passes.
    pub patient: bool,
    /// Voluntarily abort the attack at this slot.
    pub break_bad_slot: Option<u64>,
}

impl AdvParams {
    /// Passive honest participation: abort before the first block.
    pub fn baseline(base_slot: u64) -> Self {
        AdvParams { censor_from_slot: None, patient: true, break_bad_slot: Some(base_slot) }
    }
}

/// Bribee strategy axes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BribeeParams {
    /// Abandon the attack at this slot; offers whose deadlines do not
    /// strictly exceed it are declined outright.
    pub break_bad_slot: Option<u64>,
    /// Until this slot, own blocks include only the bribee's own claims.
    pub censoring_from_slot: Option<u64>,
    /// Rebroadcast the votes embedded in received claim receipts.
    pub send_votes_when_able: bool,
    /// Emit each bought vote at the slot right before its deadline instead
    /// of at its source slot.
    pub last_minute: bool,
    /// Withhold the bought vote from the public; only the claim receipt
    /// carries it. Requires `last_minute`.
    pub only_sending_to_deadline_proposing_entity: bool,
    /// Keep fulfilling accepted offers even after abandoning the attack.
    pub finish_offers_regardless_of_abort: bool,
}

impl BribeeParams {
    /// Passive honest participation: abandon before the first block.
    pub fn baseline(base_slot: u64) -> Self {
        BribeeParams {
            break_bad_slot: Some(base_slot),
            censoring_from_slot: None,
            send_votes_when_able: false,
            last_minute: false,
            only_sending_to_deadline_proposing_entity: false,
            finish_offers_regardless_of_abort: false,
        }
    }
}

/// One player's strategy choice inside a profile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum StrategyParams {
    Adversary(AdvParams),
    Bribee(BribeeParams),
}

impl From<AdvParams> for StrategyParams {
    fn from(params: AdvParams) -> Self {
        StrategyParams::Adversary(params)
    }
}

impl From<BribeeParams> for StrategyParams {
    fn from(params: BribeeParams) -> Self {
        StrategyParams::Bribee(params)
    }
}
