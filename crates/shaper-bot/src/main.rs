//! Order-book-shaping agent entry point.

use anyhow::Result;
use shaper_bot::{AppConfig, Application};
use shaper_exchange::{AdapterRegistry, FixedRates};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    shaper_telemetry::init_logging()?;

    info!("Starting bookshaper v{}", env!("CARGO_PKG_VERSION"));

    // Config path: first CLI arg, then SHAPER_CONFIG, then the default
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::from_file(&path)?,
        None => AppConfig::load()?,
    };
    info!(exchange = %config.exchange, pair = %config.pair, "Configuration loaded");

    let registry = Arc::new(AdapterRegistry::new());
    let rate_info = Arc::new(FixedRates::new());

    let app = Application::new(&config, registry, rate_info)?;
    app.run_preflight().await?;

    let handles = app.spawn_background();
    info!("Background loops running; reading commands from stdin");

    // Operator commands arrive one per line; replies go to stdout.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        let outcome = app.handle_command(line).await;
        println!("{}", outcome.user_message);
    }

    app.shutdown();
    for handle in handles {
        handle.abort();
    }
    Ok(())
}
