//! Trading-API contract and exchange-facing plumbing.
//!
//! Every adapter implements [`ExchangeApi`]; the rest of the system
//! depends only on that trait. The crate also owns the adapter registry,
//! the freshness-stamped caches that bound API pressure, the rate-info
//! service contract, and the in-memory paper adapter.

pub mod api;
pub mod cache;
pub mod error;
pub mod paper;
pub mod rateinfo;
pub mod registry;

pub use api::{
    with_deadline, CancelOutcome, DeadlineApi, ExchangeApi, Features, OpenOrder,
    OrderDetailStatus, OrderDetails, PlaceOrderRequest, PlaceOutcome, DEADLINE,
};
pub use cache::{BalanceCache, BookCache, MarketsCache};
pub use error::{ExchangeError, ExchangeResult};
pub use paper::PaperExchange;
pub use rateinfo::{FixedRates, RateInfo};
pub use registry::AdapterRegistry;
