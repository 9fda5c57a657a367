//! The uniform trading-API surface every exchange adapter implements.

use crate::error::{ExchangeError, ExchangeResult};
use async_trait::async_trait;
use shaper_core::{Amount, BalanceEntry, MarketInfo, OrderBook, OrderSide, Pair, Price, Rates};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Deadline applied to every external call. On expiry the call is
/// treated as a transient error.
pub const DEADLINE: Duration = Duration::from_secs(10);

/// Run an adapter call under the global deadline.
pub async fn with_deadline<T, F>(fut: F) -> ExchangeResult<T>
where
    F: Future<Output = ExchangeResult<T>>,
{
    match tokio::time::timeout(DEADLINE, fut).await {
        Ok(result) => result,
        Err(_) => Err(ExchangeError::Transient("deadline exceeded".to_string())),
    }
}

/// Adapter capability set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Features {
    pub place_market_order: bool,
    pub amount_for_market_buy: bool,
    pub amount_for_market_order_necessary: bool,
    pub get_deposit_address: bool,
    pub get_trading_fees: bool,
    pub support_coin_networks: bool,
    /// When set, the exchange caps simultaneous open orders; ob-order
    /// lifetimes are scaled down accordingly.
    pub order_number_limit: Option<u32>,
}

/// An exchange-live order as reported by `get_open_orders`.
#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub exchange_id: String,
    pub side: OrderSide,
    pub price: Price,
    pub amount: Amount,
    pub amount_executed: Amount,
}

/// Status of one order as reported by `get_order_details`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDetailStatus {
    New,
    PartFilled,
    Filled,
    Cancelled,
    /// The distinct "id not recognized by the exchange" outcome.
    Unknown,
}

/// Detail response for one order.
#[derive(Debug, Clone)]
pub struct OrderDetails {
    pub status: OrderDetailStatus,
    pub base_filled: Amount,
    pub quote_filled: Amount,
}

impl OrderDetails {
    pub fn unknown() -> Self {
        Self {
            status: OrderDetailStatus::Unknown,
            base_filled: Amount::ZERO,
            quote_filled: Amount::ZERO,
        }
    }
}

/// Placement request. Either `base_amount` or `quote_amount` may be
/// absent when the exchange derives it; `price` is absent for market
/// orders.
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub pair: Pair,
    pub side: OrderSide,
    pub price: Option<Price>,
    pub base_amount: Option<Amount>,
    pub quote_amount: Option<Amount>,
    pub is_limit: bool,
}

/// Placement result.
#[derive(Debug, Clone)]
pub enum PlaceOutcome {
    Placed { exchange_id: String },
    Rejected { reason: String },
}

/// Tri-state cancel result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// Already filled or already cancelled on the exchange side.
    AlreadyClosed,
    /// The exchange does not recognize the id.
    Unknown,
}

/// Uniform surface every exchange adapter implements.
///
/// The contract is stateless across calls; connection pooling and
/// adapter-internal rate limiting live behind it. Hosts wrap adapters
/// in [`DeadlineApi`] so every call carries the global deadline.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Registry id, e.g. `"paper"`.
    fn exchange_id(&self) -> &str;

    fn features(&self) -> Features;

    /// Market descriptors for every listed pair. Called once; the result
    /// is cached by [`crate::cache::MarketsCache`].
    async fn load_markets(&self) -> ExchangeResult<HashMap<Pair, MarketInfo>>;

    async fn get_balances(&self, include_zero: bool) -> ExchangeResult<Vec<BalanceEntry>>;

    async fn get_open_orders(&self, pair: &Pair) -> ExchangeResult<Vec<OpenOrder>>;

    async fn get_order_details(
        &self,
        exchange_id: &str,
        pair: &Pair,
    ) -> ExchangeResult<OrderDetails>;

    async fn place_order(&self, request: &PlaceOrderRequest) -> ExchangeResult<PlaceOutcome>;

    async fn cancel_order(
        &self,
        exchange_id: &str,
        side: OrderSide,
        pair: &Pair,
    ) -> ExchangeResult<CancelOutcome>;

    async fn get_rates(&self, pair: &Pair) -> ExchangeResult<Rates>;

    async fn get_order_book(&self, pair: &Pair) -> ExchangeResult<OrderBook>;
}

/// Adapter decorator enforcing [`DEADLINE`] on every call.
pub struct DeadlineApi {
    inner: Arc<dyn ExchangeApi>,
}

impl DeadlineApi {
    pub fn wrap(inner: Arc<dyn ExchangeApi>) -> Arc<dyn ExchangeApi> {
        Arc::new(Self { inner })
    }
}

#[async_trait]
impl ExchangeApi for DeadlineApi {
    fn exchange_id(&self) -> &str {
        self.inner.exchange_id()
    }

    fn features(&self) -> Features {
        self.inner.features()
    }

    async fn load_markets(&self) -> ExchangeResult<HashMap<Pair, MarketInfo>> {
        with_deadline(self.inner.load_markets()).await
    }

    async fn get_balances(&self, include_zero: bool) -> ExchangeResult<Vec<BalanceEntry>> {
        with_deadline(self.inner.get_balances(include_zero)).await
    }

    async fn get_open_orders(&self, pair: &Pair) -> ExchangeResult<Vec<OpenOrder>> {
        with_deadline(self.inner.get_open_orders(pair)).await
    }

    async fn get_order_details(
        &self,
        exchange_id: &str,
        pair: &Pair,
    ) -> ExchangeResult<OrderDetails> {
        with_deadline(self.inner.get_order_details(exchange_id, pair)).await
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> ExchangeResult<PlaceOutcome> {
        with_deadline(self.inner.place_order(request)).await
    }

    async fn cancel_order(
        &self,
        exchange_id: &str,
        side: OrderSide,
        pair: &Pair,
    ) -> ExchangeResult<CancelOutcome> {
        with_deadline(self.inner.cancel_order(exchange_id, side, pair)).await
    }

    async fn get_rates(&self, pair: &Pair) -> ExchangeResult<Rates> {
        with_deadline(self.inner.get_rates(pair)).await
    }

    async fn get_order_book(&self, pair: &Pair) -> ExchangeResult<OrderBook> {
        with_deadline(self.inner.get_order_book(pair)).await
    }
}
