//! Error types for shaper-engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Exchange(#[from] shaper_exchange::ExchangeError),

    #[error(transparent)]
    Ledger(#[from] shaper_ledger::LedgerError),

    #[error("Params IO error: {0}")]
    ParamsIo(#[from] std::io::Error),

    #[error("Params serialization error: {0}")]
    ParamsSerde(#[from] serde_json::Error),

    /// The watcher is enabled but its range is not usable; placements
    /// are blocked for this tick.
    #[error("Price watcher range unavailable")]
    WatcherUnavailable,

    /// Unrecoverable misconfiguration; activity is disabled.
    #[error("Fatal: {0}")]
    Fatal(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
