//! Persistent order ledger.
//!
//! Every order the agent has placed, keyed by internal id, durable
//! across restarts, with purpose/time-window statistics on top.

pub mod error;
pub mod stats;
pub mod store;

pub use error::{LedgerError, LedgerResult};
pub use stats::{PurposeStats, StatsWindow};
pub use store::OrderLedger;
