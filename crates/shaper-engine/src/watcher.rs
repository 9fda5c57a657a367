//! Price watcher: maintains the allowed price band.
//!
//! A single background loop derives `[low, high]` either from an
//! operator-supplied numeric range (converted into the traded quote) or
//! from another market's order book on any supported exchange, detects
//! range anomalies, and publishes the result atomically for every maker
//! to consult before placing.

use crate::params::ParamsStore;
use crate::EngineContext;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use shaper_core::{Pair, Price, PwPolicy, PwSourceSpec, TradeParams};
use shaper_exchange::{AdapterRegistry, ExchangeApi, RateInfo};
use shaper_exchange::registry::Credentials;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Mid-price jump (percent) that flags an anomaly.
const ANOMALY_THRESHOLD_PERCENT: u32 = 15;
/// Consecutive confirming ticks before an anomalous range is accepted.
const ANOMALY_CONFIRM_TICKS: u32 = 3;
/// How long a stale range stays usable under the `smart` policy.
const SMART_GRACE_SECS: i64 = 180;
/// Volume share below which a book level is ignored as dust.
const SMART_DUST_SHARE: &str = "0.01";

/// Published watcher state.
#[derive(Debug, Clone, Copy)]
pub struct PwState {
    pub low: Price,
    pub mid: Price,
    pub high: Price,
    pub is_actual: bool,
    pub is_anomaly: bool,
    /// Last successful range update; the smart grace window counts
    /// from here.
    pub updated_at: DateTime<Utc>,
}

impl PwState {
    pub fn contains(&self, price: Price) -> bool {
        price >= self.low && price <= self.high
    }
}

/// What the makers are allowed to do this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeVerdict {
    /// Watcher disabled or unconfigured; no band applies.
    Unrestricted,
    /// Place only inside `[low, high]`.
    Band(Price, Price),
    /// No usable range; block all new placements.
    Blocked,
}

pub struct PriceWatcher {
    params: Arc<ParamsStore>,
    quote: String,
    rate_info: Arc<dyn RateInfo>,
    registry: Arc<AdapterRegistry>,
    /// Market-source adapters, constructed once per exchange id.
    adapters: DashMap<String, Arc<dyn ExchangeApi>>,
    state: RwLock<Option<PwState>>,
    anomaly_streak: Mutex<u32>,
}

impl PriceWatcher {
    pub fn new(
        ctx: &EngineContext,
        registry: Arc<AdapterRegistry>,
        rate_info: Arc<dyn RateInfo>,
    ) -> Self {
        Self {
            params: ctx.params.clone(),
            quote: ctx.pair.quote.clone(),
            rate_info,
            registry,
            adapters: DashMap::new(),
            state: RwLock::new(None),
            anomaly_streak: Mutex::new(0),
        }
    }

    /// Pre-seed the adapter used for a market source. Tests and hosts
    /// with already-constructed adapters use this instead of the
    /// registry path.
    pub fn set_market_adapter(&self, exchange_id: &str, api: Arc<dyn ExchangeApi>) {
        self.adapters.insert(exchange_id.to_lowercase(), api);
    }

    pub fn snapshot(&self) -> Option<PwState> {
        *self.state.read()
    }

    /// One watcher pass: derive the range from the configured source,
    /// run anomaly suppression, publish.
    pub async fn tick(&self) {
        let params = self.params.snapshot();
        if !params.pw_active {
            return;
        }
        let source = match &params.pw_source {
            Some(source) => source.clone(),
            None => return,
        };

        let derived = self.derive_range(&source, &params).await;
        let (low, high) = match derived {
            Some(range) => range,
            None => {
                // Keep the last range but flag it stale
                let mut state = self.state.write();
                if let Some(s) = state.as_mut() {
                    s.is_actual = false;
                }
                return;
            }
        };
        let mid = Price::mid(low, high);

        // Anomaly suppression: a sudden mid jump is not trusted until
        // it persists for N consecutive ticks.
        if let Some(prev) = self.snapshot() {
            if let Some(jump) = mid.pct_from(prev.mid) {
                if jump.abs() > Decimal::from(ANOMALY_THRESHOLD_PERCENT) {
                    let streak = {
                        let mut streak = self.anomaly_streak.lock();
                        *streak += 1;
                        *streak
                    };
                    if streak < ANOMALY_CONFIRM_TICKS {
                        warn!(
                            %mid,
                            prev_mid = %prev.mid,
                            streak,
                            "Price anomaly, update suppressed"
                        );
                        let mut state = self.state.write();
                        if let Some(s) = state.as_mut() {
                            s.is_anomaly = true;
                        }
                        return;
                    }
                    debug!(streak, "Anomalous range confirmed, accepting");
                }
            }
        }
        *self.anomaly_streak.lock() = 0;

        *self.state.write() = Some(PwState {
            low,
            mid,
            high,
            is_actual: true,
            is_anomaly: false,
            updated_at: Utc::now(),
        });
        debug!(%low, %mid, %high, "Watcher range published");
    }

    async fn derive_range(
        &self,
        source: &PwSourceSpec,
        params: &TradeParams,
    ) -> Option<(Price, Price)> {
        match source {
            PwSourceSpec::Range { low, high, coin } => {
                let low = self.rate_info.convert(*low, coin, &self.quote).await;
                let high = self.rate_info.convert(*high, coin, &self.quote).await;
                match (low, high) {
                    (Ok(low), Ok(high)) if low < high => {
                        Some((Price::new(low), Price::new(high)))
                    }
                    (Ok(_), Ok(_)) => {
                        warn!("Numeric range inverted, ignoring");
                        None
                    }
                    _ => {
                        debug!("Rate conversion failed, range not actual");
                        None
                    }
                }
            }
            PwSourceSpec::Market { pair, exchange } => {
                let api = self.market_adapter(exchange)?;
                let pair = Pair::from_str(pair).ok()?;
                let book = match api.get_order_book(&pair).await {
                    Ok(book) => book,
                    Err(e) => {
                        debug!(?e, "Source book fetch failed, range not actual");
                        return None;
                    }
                };
                let dust = Decimal::from_str(SMART_DUST_SHARE).unwrap_or(Decimal::ZERO);
                let smart_bid = book.smart_price(shaper_core::OrderSide::Buy, dust)?;
                let smart_ask = book.smart_price(shaper_core::OrderSide::Sell, dust)?;
                let dev = params.pw_deviation_percent / Decimal::from(100);
                let low = Price::new(smart_bid.inner() * (Decimal::ONE - dev));
                let high = Price::new(smart_ask.inner() * (Decimal::ONE + dev));
                Some((low, high))
            }
        }
    }

    fn market_adapter(&self, exchange: &str) -> Option<Arc<dyn ExchangeApi>> {
        let key = exchange.to_lowercase();
        if let Some(api) = self.adapters.get(&key) {
            return Some(api.clone());
        }
        match self.registry.create(&key, &Credentials::default()) {
            Ok(api) => {
                self.adapters.insert(key, api.clone());
                Some(api)
            }
            Err(e) => {
                warn!(%exchange, ?e, "Source exchange unavailable");
                None
            }
        }
    }

    /// Policy-gated band for placement decisions.
    pub fn placement_range(&self, params: &TradeParams) -> RangeVerdict {
        if !params.pw_active || params.pw_source.is_none() {
            return RangeVerdict::Unrestricted;
        }
        let state = match self.snapshot() {
            Some(state) => state,
            // Enabled but no range ever derived
            None => return RangeVerdict::Blocked,
        };
        if state.is_actual && !state.is_anomaly {
            return RangeVerdict::Band(state.low, state.high);
        }
        match params.pw_policy {
            PwPolicy::Strict => RangeVerdict::Blocked,
            PwPolicy::Smart => {
                let age = Utc::now() - state.updated_at;
                if age < Duration::seconds(SMART_GRACE_SECS) {
                    RangeVerdict::Band(state.low, state.high)
                } else {
                    RangeVerdict::Blocked
                }
            }
        }
    }

    /// When `last` escapes the band, the price the maker should push
    /// back toward.
    pub fn band_breach(&self, last: Price) -> Option<Price> {
        let state = self.snapshot()?;
        if !state.is_actual {
            return None;
        }
        if last < state.low {
            Some(state.low)
        } else if last > state.high {
            Some(state.high)
        } else {
            None
        }
    }
}
