//! The shared trade-parameter record.
//!
//! Mutated only by operator commands, persisted after each mutation, and
//! read as a snapshot by every scheduler tick.

use crate::decimal::Amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market-making policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MmPolicy {
    /// Builder + provider + price defense.
    #[default]
    Optimal,
    /// Builder + tight spread.
    Spread,
    /// Provider only, no price-moving corrections.
    Depth,
}

impl MmPolicy {
    /// Policies under which volume-generating components (the builder) run.
    pub fn is_regular(&self) -> bool {
        matches!(self, Self::Optimal | Self::Spread)
    }
}

impl fmt::Display for MmPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimal => write!(f, "optimal"),
            Self::Spread => write!(f, "spread"),
            Self::Depth => write!(f, "depth"),
        }
    }
}

impl FromStr for MmPolicy {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "optimal" => Ok(Self::Optimal),
            "spread" => Ok(Self::Spread),
            "depth" => Ok(Self::Depth),
            other => Err(crate::error::CoreError::InvalidParam(format!(
                "unknown policy: {other}"
            ))),
        }
    }
}

/// Skew of standing liquidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiquidityTrend {
    #[default]
    Middle,
    Uptrend,
    Downtrend,
}

impl fmt::Display for LiquidityTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Middle => write!(f, "middle"),
            Self::Uptrend => write!(f, "uptrend"),
            Self::Downtrend => write!(f, "downtrend"),
        }
    }
}

impl FromStr for LiquidityTrend {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "middle" => Ok(Self::Middle),
            "uptrend" => Ok(Self::Uptrend),
            "downtrend" => Ok(Self::Downtrend),
            other => Err(crate::error::CoreError::InvalidParam(format!(
                "unknown trend: {other}"
            ))),
        }
    }
}

/// What the watcher does when price escapes the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PwAction {
    /// Place a corrective pm-order pushing price back.
    #[default]
    Fill,
    /// Cancel out-of-band orders, place nothing.
    Prevent,
}

impl FromStr for PwAction {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fill" => Ok(Self::Fill),
            "prevent" => Ok(Self::Prevent),
            other => Err(crate::error::CoreError::InvalidParam(format!(
                "unknown pw action: {other}"
            ))),
        }
    }
}

/// How strictly a stale range blocks the makers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PwPolicy {
    /// A stale-but-known range stays usable for a grace window.
    #[default]
    Smart,
    /// Placements block as soon as the range is not actual.
    Strict,
}

impl FromStr for PwPolicy {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smart" => Ok(Self::Smart),
            "strict" => Ok(Self::Strict),
            other => Err(crate::error::CoreError::InvalidParam(format!(
                "unknown pw policy: {other}"
            ))),
        }
    }
}

/// Where the watcher range comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PwSourceSpec {
    /// Operator-provided numeric range in `coin` units, converted to the
    /// traded quote by the rate-info service.
    Range {
        low: Decimal,
        high: Decimal,
        coin: String,
    },
    /// Another market's order book: `pair@exchange`.
    Market { pair: String, exchange: String },
}

/// The configuration record every scheduler tick reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeParams {
    /// Top-level activity flag (`start mm` / `stop mm`).
    pub is_active: bool,
    pub policy: MmPolicy,

    /// Order amount range, base units.
    pub min_amount: Amount,
    pub max_amount: Amount,
    /// Tick interval range, seconds.
    pub min_interval_sec: u64,
    pub max_interval_sec: u64,
    /// Buy bias in percent, 0..=100.
    pub buy_percent: Decimal,

    // Order-book builder
    pub ob_active: bool,
    /// Target count of standing ob-orders.
    pub order_book_orders_count: u32,
    /// How deep into the visible book positions are drawn from.
    pub order_book_height: u32,
    /// Cap on a single ob-order as a percent of `max_amount`.
    pub order_book_max_order_percent: Decimal,

    // Liquidity provider
    pub liq_active: bool,
    /// Standing sell pool, base units.
    pub liquidity_sell_amount: Amount,
    /// Standing buy pool, quote units.
    pub liquidity_buy_quote_amount: Amount,
    pub liquidity_spread_percent: Decimal,
    pub liquidity_trend: LiquidityTrend,

    // Price watcher
    pub pw_active: bool,
    pub pw_source: Option<PwSourceSpec>,
    pub pw_deviation_percent: Decimal,
    pub pw_action: PwAction,
    pub pw_policy: PwPolicy,
}

impl Default for TradeParams {
    fn default() -> Self {
        Self {
            is_active: false,
            policy: MmPolicy::Optimal,
            min_amount: Amount::new(Decimal::ONE),
            max_amount: Amount::new(Decimal::from(10)),
            min_interval_sec: 60,
            max_interval_sec: 360,
            buy_percent: Decimal::from(50),
            ob_active: false,
            order_book_orders_count: 15,
            order_book_height: 15,
            order_book_max_order_percent: Decimal::from(25),
            liq_active: false,
            liquidity_sell_amount: Amount::ZERO,
            liquidity_buy_quote_amount: Amount::ZERO,
            liquidity_spread_percent: Decimal::from(2),
            liquidity_trend: LiquidityTrend::Middle,
            pw_active: false,
            pw_source: None,
            pw_deviation_percent: Decimal::ZERO,
            pw_action: PwAction::Fill,
            pw_policy: PwPolicy::Smart,
        }
    }
}

impl TradeParams {
    /// Probability in [0, 1] that a generated order is a buy.
    pub fn buy_probability(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        (self.buy_percent / Decimal::from(100))
            .to_f64()
            .unwrap_or(0.5)
            .clamp(0.0, 1.0)
    }
}
