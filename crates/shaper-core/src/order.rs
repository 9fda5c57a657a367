//! The order record and its identifiers.
//!
//! Every order the agent places is tracked by an [`Order`] row: purpose
//! tag, lifecycle flags, timestamps, and filled/remaining quantities. Rows
//! survive process restarts through the ledger journal and are retained
//! after close for statistics.

use crate::decimal::{Amount, Price};
use crate::error::CoreError;
use crate::pair::Pair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Self::Buy),
            "sell" => Ok(Self::Sell),
            other => Err(CoreError::InvalidParam(format!("unknown side: {other}"))),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
        }
    }
}

/// Purpose tag: why the agent placed an order.
///
/// A closed set. An exchange-visible order whose id is not in the ledger
/// is classified "unknown", which is deliberately not a member here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// Market-making core.
    Mm,
    /// Order-book builder depth order.
    Ob,
    /// Standing liquidity order.
    Liq,
    /// Price-watcher order.
    Pw,
    /// Price-maker corrective order.
    Pm,
    /// Closer order.
    Cl,
    /// Quote-hold order.
    Qh,
    /// Ladder order.
    Ld,
    /// Manually placed by the operator.
    Man,
}

impl Purpose {
    pub const ALL: [Purpose; 9] = [
        Purpose::Mm,
        Purpose::Ob,
        Purpose::Liq,
        Purpose::Pw,
        Purpose::Pm,
        Purpose::Cl,
        Purpose::Qh,
        Purpose::Ld,
        Purpose::Man,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mm => "mm",
            Self::Ob => "ob",
            Self::Liq => "liq",
            Self::Pw => "pw",
            Self::Pm => "pm",
            Self::Cl => "cl",
            Self::Qh => "qh",
            Self::Ld => "ld",
            Self::Man => "man",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mm" => Ok(Self::Mm),
            "ob" => Ok(Self::Ob),
            "liq" => Ok(Self::Liq),
            "pw" => Ok(Self::Pw),
            "pm" => Ok(Self::Pm),
            "cl" => Ok(Self::Cl),
            "qh" => Ok(Self::Qh),
            "ld" => Ok(Self::Ld),
            "man" => Ok(Self::Man),
            other => Err(CoreError::InvalidPurpose(other.to_string())),
        }
    }
}

/// Internal order id, stable across restarts.
///
/// Every ledger row gets one at creation, before the exchange has
/// assigned its own id. Format: `shp_{timestamp_ms}_{uuid_short}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("shp_{ts}_{uuid_short}"))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a ledger row was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseCause {
    Expired,
    OutOfPwRange,
    UserCommand,
    ExternalCancel,
    Filled,
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "expired"),
            Self::OutOfPwRange => write!(f, "out_of_pw_range"),
            Self::UserCommand => write!(f, "user_command"),
            Self::ExternalCancel => write!(f, "external_cancel"),
            Self::Filled => write!(f, "filled"),
        }
    }
}

/// The central order record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Internal id, assigned before placement.
    pub id: OrderId,
    /// Exchange-assigned id, set on acceptance.
    pub exchange_id: Option<String>,
    pub pair: Pair,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub purpose: Purpose,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Self-expiry deadline; the collector cancels past it.
    pub expires_at: Option<DateTime<Utc>>,
    /// Limit price; `None` for market orders.
    pub price: Option<Price>,
    pub base_amount: Amount,
    pub quote_amount: Amount,
    pub base_filled: Amount,
    pub quote_filled: Amount,
    pub base_remaining: Amount,
    pub quote_remaining: Amount,
    /// Some post-fill follow-up has run for this row.
    pub processed: bool,
    /// Fully filled on the exchange.
    pub executed: bool,
    /// Cancelled (by us or externally).
    pub cancelled: bool,
    /// Terminal: no longer expected live on the exchange.
    pub closed: bool,
    pub close_cause: Option<CloseCause>,
    /// Consecutive reconciler passes that could not find the order.
    #[serde(default)]
    pub missing_strikes: u8,
    pub ladder_index: Option<u32>,
    pub ladder_state: Option<String>,
    pub not_placed_reason: Option<String>,
}

impl Order {
    /// New limit-order row. Quote amount is derived from price × base.
    pub fn new_limit(
        pair: Pair,
        side: OrderSide,
        purpose: Purpose,
        price: Price,
        base_amount: Amount,
    ) -> Self {
        let now = Utc::now();
        let quote_amount = Amount::new(base_amount.inner() * price.inner());
        Self {
            id: OrderId::new(),
            exchange_id: None,
            pair,
            side,
            order_type: OrderType::Limit,
            purpose,
            created_at: now,
            updated_at: now,
            expires_at: None,
            price: Some(price),
            base_amount,
            quote_amount,
            base_filled: Amount::ZERO,
            quote_filled: Amount::ZERO,
            base_remaining: base_amount,
            quote_remaining: quote_amount,
            processed: false,
            executed: false,
            cancelled: false,
            closed: false,
            close_cause: None,
            missing_strikes: 0,
            ladder_index: None,
            ladder_state: None,
            not_placed_reason: None,
        }
    }

    /// New market-order row. One of the amounts may be zero when the
    /// exchange derives it on execution.
    pub fn new_market(
        pair: Pair,
        side: OrderSide,
        purpose: Purpose,
        base_amount: Amount,
        quote_amount: Amount,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            exchange_id: None,
            pair,
            side,
            order_type: OrderType::Market,
            purpose,
            created_at: now,
            updated_at: now,
            expires_at: None,
            price: None,
            base_amount,
            quote_amount,
            base_filled: Amount::ZERO,
            quote_filled: Amount::ZERO,
            base_remaining: base_amount,
            quote_remaining: quote_amount,
            processed: false,
            executed: false,
            cancelled: false,
            closed: false,
            close_cause: None,
            missing_strikes: 0,
            ladder_index: None,
            ladder_state: None,
            not_placed_reason: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Tag a row as one rung of a ladder.
    pub fn with_ladder(mut self, index: u32, state: impl Into<String>) -> Self {
        self.ladder_index = Some(index);
        self.ladder_state = Some(state.into());
        self
    }

    /// Record exchange acceptance.
    pub fn mark_placed(&mut self, exchange_id: impl Into<String>) {
        self.exchange_id = Some(exchange_id.into());
        self.updated_at = Utc::now();
    }

    /// Record a rejected placement. The row is kept for operator
    /// visibility but never counts as open.
    pub fn mark_not_placed(&mut self, reason: impl Into<String>) {
        self.not_placed_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Record fill progress reported by the exchange. Keeps
    /// `filled + remaining = amount` on both denominations.
    pub fn apply_fill(&mut self, base_filled: Amount, quote_filled: Amount) {
        self.base_filled = base_filled;
        self.quote_filled = quote_filled;
        self.base_remaining = self.base_amount.saturating_sub(base_filled);
        self.quote_remaining = self.quote_amount.saturating_sub(quote_filled);
        self.updated_at = Utc::now();
    }

    /// Terminal close with a cause tag.
    pub fn close(&mut self, cause: CloseCause) {
        self.closed = true;
        self.close_cause = Some(cause);
        match cause {
            CloseCause::Filled => self.executed = true,
            CloseCause::ExternalCancel | CloseCause::Expired | CloseCause::OutOfPwRange
            | CloseCause::UserCommand => self.cancelled = true,
        }
        self.updated_at = Utc::now();
    }

    /// Open means: expected to be live on the exchange.
    pub fn is_open(&self) -> bool {
        !self.closed && self.not_placed_reason.is_none()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| now > e).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_order() -> Order {
        Order::new_limit(
            Pair::new("ADM", "USDT"),
            OrderSide::Buy,
            Purpose::Ob,
            Price::new(dec!(100)),
            Amount::new(dec!(2)),
        )
    }

    #[test]
    fn test_purpose_round_trip() {
        for p in Purpose::ALL {
            assert_eq!(p.as_str().parse::<Purpose>().unwrap(), p);
        }
        assert!("unk".parse::<Purpose>().is_err());
    }

    #[test]
    fn test_order_id_format() {
        let id = OrderId::new();
        assert!(id.as_str().starts_with("shp_"));
        assert_ne!(OrderId::new(), OrderId::new());
    }

    #[test]
    fn test_new_limit_derives_quote() {
        let order = sample_order();
        assert_eq!(order.quote_amount.inner(), dec!(200));
        assert_eq!(order.base_remaining, order.base_amount);
        assert!(order.is_open());
    }

    #[test]
    fn test_fill_conservation() {
        let mut order = sample_order();
        order.apply_fill(Amount::new(dec!(0.7)), Amount::new(dec!(70)));
        assert_eq!(
            order.base_filled + order.base_remaining,
            order.base_amount
        );
        assert_eq!(
            order.quote_filled + order.quote_remaining,
            order.quote_amount
        );
    }

    #[test]
    fn test_close_sets_flags() {
        let mut order = sample_order();
        order.close(CloseCause::Filled);
        assert!(order.closed && order.executed && !order.cancelled);

        let mut order = sample_order();
        order.close(CloseCause::Expired);
        assert!(order.closed && order.cancelled && !order.executed);
        assert!(!order.is_open());
    }

    #[test]
    fn test_expiry() {
        let order = sample_order().with_expiry(Utc::now() - chrono::Duration::seconds(1));
        assert!(order.is_expired(Utc::now()));
        assert!(!sample_order().is_expired(Utc::now()));
    }

    #[test]
    fn test_ladder_rung_fields() {
        let order = sample_order().with_ladder(3, "new");
        assert_eq!(order.ladder_index, Some(3));
        assert_eq!(order.ladder_state.as_deref(), Some("new"));
        assert!(order.is_open());
    }

    #[test]
    fn test_not_placed_row_is_never_open() {
        let mut order = sample_order().with_ladder(0, "not placed");
        order.mark_not_placed("min amount");
        assert_eq!(order.not_placed_reason.as_deref(), Some("min amount"));
        assert!(!order.is_open());
        assert!(!order.closed);
    }
}
