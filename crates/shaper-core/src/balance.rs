//! Account balance snapshots.

use crate::decimal::Amount;
use serde::{Deserialize, Serialize};

/// Per-coin balance entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub coin: String,
    pub free: Amount,
    pub locked: Amount,
}

impl BalanceEntry {
    pub fn new(coin: impl Into<String>, free: Amount, locked: Amount) -> Self {
        Self {
            coin: coin.into().to_uppercase(),
            free,
            locked,
        }
    }

    pub fn total(&self) -> Amount {
        self.free + self.locked
    }
}

/// Full account snapshot with derived totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub entries: Vec<BalanceEntry>,
    /// Total account value in USD, when the rate service could derive it.
    pub total_usd: Option<Amount>,
    /// Total account value in BTC, when the rate service could derive it.
    pub total_btc: Option<Amount>,
}

impl AccountSnapshot {
    pub fn new(entries: Vec<BalanceEntry>) -> Self {
        Self {
            entries,
            total_usd: None,
            total_btc: None,
        }
    }

    /// Free balance for one coin, zero when absent.
    pub fn free(&self, coin: &str) -> Amount {
        let coin = coin.to_uppercase();
        self.entries
            .iter()
            .find(|e| e.coin == coin)
            .map(|e| e.free)
            .unwrap_or(Amount::ZERO)
    }
}
