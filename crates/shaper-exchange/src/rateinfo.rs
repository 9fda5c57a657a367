//! Rate conversion against an external price-info service.
//!
//! The watcher's numeric range and the command processor's USD
//! confirmation threshold both go through this contract. The real
//! service is an external collaborator; [`FixedRates`] is the
//! table-driven stand-in.

use crate::error::{ExchangeError, ExchangeResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Rate conversion contract.
#[async_trait]
pub trait RateInfo: Send + Sync {
    /// Convert `amount` of `from` into `to` units.
    async fn convert(&self, amount: Decimal, from: &str, to: &str) -> ExchangeResult<Decimal>;

    /// USD value of `amount` of `coin`.
    async fn usd_value(&self, amount: Decimal, coin: &str) -> ExchangeResult<Decimal> {
        self.convert(amount, coin, "USD").await
    }
}

/// In-memory rate table keyed by `COIN` with USD prices.
#[derive(Default)]
pub struct FixedRates {
    usd_prices: RwLock<HashMap<String, Decimal>>,
}

impl FixedRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_usd_price(&self, coin: &str, price: Decimal) {
        self.usd_prices
            .write()
            .insert(coin.to_uppercase(), price);
    }

    fn usd_price(&self, coin: &str) -> Option<Decimal> {
        let coin = coin.to_uppercase();
        if coin == "USD" {
            return Some(Decimal::ONE);
        }
        self.usd_prices.read().get(&coin).copied()
    }
}

#[async_trait]
impl RateInfo for FixedRates {
    async fn convert(&self, amount: Decimal, from: &str, to: &str) -> ExchangeResult<Decimal> {
        let from_usd = self
            .usd_price(from)
            .ok_or_else(|| ExchangeError::Transient(format!("no rate for {from}")))?;
        let to_usd = self
            .usd_price(to)
            .ok_or_else(|| ExchangeError::Transient(format!("no rate for {to}")))?;
        if to_usd.is_zero() {
            return Err(ExchangeError::Transient(format!("zero rate for {to}")));
        }
        Ok(amount * from_usd / to_usd)
    }
}
