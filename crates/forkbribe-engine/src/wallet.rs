//! On-chain payment ledger with symbolic reward channels.
//!
//! Every payment carries both a concrete Gwei amount and a symbolic channel
//! tag with a unit count. Consensus rewards live on the `Wallet` channel in
//! plain Gwei; bribery payments additionally record how many validator
//! indices they price, which lets the analyzer re-price a finished game for
//! arbitrary per-index reward parameters without replaying it.

use std::collections::BTreeMap;
use std::fmt;

use forkbribe_primitives::EntityId;
use serde::{Deserialize, Serialize};

/// A payable address: an entity, the consensus protocol itself, or the burn
/// sink.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Address {
    Entity(EntityId),
    Consensus,
    Burned,
}

impl From<EntityId> for Address {
    fn from(entity: EntityId) -> Self {
        Address::Entity(entity)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Entity(entity) => write!(f, "{entity}"),
            Address::Consensus => write!(f, "consensus"),
            Address::Burned => write!(f, "burned"),
        }
    }
}

/// Which reward component a payment belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PayChannel {
    /// Concrete consensus Gwei (attestation and inclusion rewards).
    Wallet,
    BaseReward,
    DeadlineReward,
    DeadlinePayback,
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub from: Address,
    pub to: Address,
    /// Concrete amount in Gwei.
    pub amount: i64,
    /// Symbolic unit count for the bribery channels; 0 on the wallet channel.
    pub units: u64,
    pub channel: PayChannel,
    pub comment: String,
}

impl Payment {
    pub fn consensus(from: Address, to: Address, amount: i64, comment: &str) -> Self {
        Payment {
            from,
            to,
            amount,
            units: 0,
            channel: PayChannel::Wallet,
            comment: comment.to_owned(),
        }
    }

    pub fn bribery(
        from: Address,
        to: Address,
        amount: i64,
        units: u64,
        channel: PayChannel,
        comment: &str,
    ) -> Self {
        Payment { from, to, amount, units, channel, comment: comment.to_owned() }
    }
}

/// Append-only payment ledger plus the reduced balance map.
///
/// Balances net the concrete amounts of every entry; the per-channel views
/// used by the analyzer are recomputed from the ledger on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WalletState {
    balances: BTreeMap<Address, i64>,
    ledger: Vec<Payment>,
}

impl WalletState {
    pub fn new() -> Self {
        WalletState::default()
    }

    /// Record a payment. Both parties are created with a zero balance on
    /// first contact.
    pub fn pay(&self, payment: Payment) -> WalletState {
        let mut next = self.clone();
        *next.balances.entry(payment.to).or_insert(0) += payment.amount;
        *next.balances.entry(payment.from).or_insert(0) -= payment.amount;
        next.ledger.push(payment);
        next
    }

    /// Net concrete balance across all channels.
    pub fn balance(&self, address: Address) -> i64 {
        self.balances.get(&address).copied().unwrap_or(0)
    }

    pub fn ledger(&self) -> &[Payment] {
        &self.ledger
    }

    /// Net concrete Gwei on one channel.
    pub fn channel_amount(&self, address: Address, channel: PayChannel) -> i64 {
        self.ledger
            .iter()
            .filter(|p| p.channel == channel)
            .map(|p| {
                let mut net = 0;
                if p.to == address {
                    net += p.amount;
                }
                if p.from == address {
                    net -= p.amount;
                }
                net
            })
            .sum()
    }

    /// Net symbolic units on one channel (received minus paid).
    pub fn channel_units(&self, address: Address, channel: PayChannel) -> i64 {
        self.ledger
            .iter()
            .filter(|p| p.channel == channel)
            .map(|p| {
                let mut net = 0;
                if p.to == address {
                    net += p.units as i64;
                }
                if p.from == address {
                    net -= p.units as i64;
                }
                net
            })
            .sum()
    }

    /// Concrete balances for arbitrary per-index prices of the three bribery
    /// channels: wallet-channel Gwei plus priced symbolic units.
    pub fn resolve(
        &self,
        base_reward_unit: i64,
        deadline_reward_unit: i64,
        deadline_payback_unit: i64,
    ) -> BTreeMap<Address, i64> {
        let mut resolved: BTreeMap<Address, i64> = BTreeMap::new();
        for payment in &self.ledger {
            let value = match payment.channel {
                PayChannel::Wallet => payment.amount,
                PayChannel::BaseReward => payment.units as i64 * base_reward_unit,
                PayChannel::DeadlineReward => payment.units as i64 * deadline_reward_unit,
                PayChannel::DeadlinePayback => payment.units as i64 * deadline_payback_unit,
            };
            *resolved.entry(payment.to).or_insert(0) += value;
            *resolved.entry(payment.from).or_insert(0) -= value;
        }
        resolved
    }
}
