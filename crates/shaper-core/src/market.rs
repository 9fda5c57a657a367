//! Per-pair market descriptor.

use crate::decimal::{Amount, Price};
use serde::{Deserialize, Serialize};

/// Exchange-reported constraints for a pair. Loaded once per exchange
/// and reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub base: String,
    pub quote: String,
    /// Decimal places accepted for base amounts.
    pub base_decimals: u32,
    /// Decimal places accepted for quote amounts and prices.
    pub quote_decimals: u32,
    pub min_amount: Amount,
    pub max_amount: Option<Amount>,
    /// Minimum price increment.
    pub price_tick: Price,
}

impl MarketInfo {
    /// Check an amount against the min/max constraints.
    pub fn amount_in_range(&self, amount: Amount) -> bool {
        if amount < self.min_amount {
            return false;
        }
        match self.max_amount {
            Some(max) => amount <= max,
            None => true,
        }
    }
}
