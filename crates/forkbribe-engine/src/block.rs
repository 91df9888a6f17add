//! Blocks of the simulated chain.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::action::{OfferBribery, PayToAttestState, Vote};
use crate::wallet::WalletState;

/// One block of the simulated DAG.
///
/// Blocks are immutable once sealed. The wallet state and the escrow map are
/// branch-local: each block derives them from its parent's by applying the
/// claims its proposer chose to include.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub slot: u64,
    pub parent_slot: u64,
    /// Proposed during the propose phase of its own slot.
    pub on_time: bool,
    pub wallet_state: WalletState,
    pub pay_to_attests: BTreeMap<OfferBribery, PayToAttestState>,
    /// Attestations included (and rewarded) by this block.
    pub votes: BTreeSet<Vote>,
}
