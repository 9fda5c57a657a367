//! Core domain types for the order-book-shaping agent.
//!
//! Pure data: decimal newtypes, pairs, the order record and its purpose
//! tags, market descriptors, order books, rates, balances, and the shared
//! trade-parameter record. No IO and no async in this crate.

pub mod balance;
pub mod book;
pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod pair;
pub mod params;
pub mod rates;

pub use balance::{AccountSnapshot, BalanceEntry};
pub use book::{BookLevel, OrderBook};
pub use decimal::{Amount, Price};
pub use error::{CoreError, Result};
pub use market::MarketInfo;
pub use order::{CloseCause, Order, OrderId, OrderSide, OrderType, Purpose};
pub use pair::Pair;
pub use params::{
    LiquidityTrend, MmPolicy, PwAction, PwPolicy, PwSourceSpec, TradeParams,
};
pub use rates::Rates;
