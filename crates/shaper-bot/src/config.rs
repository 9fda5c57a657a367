//! Startup configuration.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration, loaded once at startup. Runtime policy
/// lives in the trade-parameter store, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Exchange id resolved through the adapter registry.
    pub exchange: String,
    /// The traded pair, e.g. "ADM/USDT".
    pub pair: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Directory for the order ledger and the persisted parameters.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// USD notional at which manual orders require confirmation.
    #[serde(default = "default_confirm_usd")]
    pub amount_to_confirm_usd: Decimal,
    /// Balance cache TTL, seconds.
    #[serde(default = "default_balance_ttl")]
    pub balance_ttl_secs: u64,
    /// Order-book cache TTL, seconds.
    #[serde(default = "default_book_ttl")]
    pub book_ttl_secs: u64,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_confirm_usd() -> Decimal {
    Decimal::from(100)
}

fn default_balance_ttl() -> u64 {
    3
}

fn default_book_ttl() -> u64 {
    2
}

impl AppConfig {
    /// Load configuration: `SHAPER_CONFIG` env var or the default path.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("SHAPER_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            Err(AppError::Config(format!(
                "Config file not found: {config_path}"
            )))
        }
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }
}
