//! Error types for shaper-bot.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unrecoverable misconfiguration, e.g. the pair is not listed.
    #[error("Fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Exchange(#[from] shaper_exchange::ExchangeError),

    #[error(transparent)]
    Ledger(#[from] shaper_ledger::LedgerError),

    #[error(transparent)]
    Engine(#[from] shaper_engine::EngineError),
}

pub type AppResult<T> = std::result::Result<T, AppError>;
