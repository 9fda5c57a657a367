//! The order-lifecycle engine.
//!
//! Background makers (order-book builder, liquidity provider, price
//! maker), the reconciler and collector that keep the ledger honest,
//! the price watcher that bounds every placement, and the scheduler
//! that coordinates them against shared balance and rate-limit
//! resources.

pub mod builder;
pub mod collector;
#[cfg(test)]
pub(crate) mod testutil;
pub mod error;
pub mod liquidity;
pub mod params;
pub mod pricemaker;
pub mod reconciler;
pub mod scheduler;
pub mod watcher;

pub use builder::{BuilderReport, ObBuilder};
pub use collector::{CancelSelector, CollectReport, OrderCollector, PriceFilter, TargetPurpose};
pub use error::{EngineError, EngineResult};
pub use liquidity::{LiquidityProvider, LiquidityReport};
pub use params::ParamsStore;
pub use pricemaker::{MakeReport, PriceMaker};
pub use reconciler::{ReconcileReport, Reconciler};
pub use scheduler::{IterationGuard, Scheduler};
pub use watcher::{PriceWatcher, PwState, RangeVerdict};

use shaper_exchange::{BalanceCache, BookCache, ExchangeApi, MarketsCache};
use shaper_ledger::OrderLedger;
use shaper_telemetry::ThrottledNotifier;
use std::sync::Arc;

/// Shared wiring every engine component works against.
pub struct EngineContext {
    /// The traded pair.
    pub pair: shaper_core::Pair,
    pub api: Arc<dyn ExchangeApi>,
    pub ledger: Arc<OrderLedger>,
    pub balances: Arc<BalanceCache>,
    pub books: Arc<BookCache>,
    pub markets: Arc<MarketsCache>,
    pub params: Arc<ParamsStore>,
    pub notifier: Arc<ThrottledNotifier>,
}
