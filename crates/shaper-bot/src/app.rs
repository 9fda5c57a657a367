//! Main application wiring.
//!
//! Resolves the exchange adapter through the registry, opens the
//! ledger, constructs the engine components, spawns the background
//! loops, and routes operator commands to the processor.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use shaper_commands::{CommandOutcome, CommandProcessor};
use shaper_core::Pair;
use shaper_engine::{
    EngineContext, LiquidityProvider, ObBuilder, OrderCollector, ParamsStore, PriceMaker,
    PriceWatcher, Reconciler, Scheduler,
};
use shaper_exchange::registry::Credentials;
use shaper_exchange::{
    AdapterRegistry, BalanceCache, BookCache, DeadlineApi, MarketsCache, RateInfo,
};
use shaper_ledger::OrderLedger;
use shaper_telemetry::{LogNotifier, Notifier, ThrottledNotifier};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct Application {
    ctx: Arc<EngineContext>,
    scheduler: Arc<Scheduler>,
    processor: CommandProcessor,
    notifier: Arc<dyn Notifier>,
}

impl Application {
    /// Wire everything together. The registry and rate-info service are
    /// injected so hosts and tests can supply their own adapters.
    pub fn new(
        config: &AppConfig,
        registry: Arc<AdapterRegistry>,
        rate_info: Arc<dyn RateInfo>,
    ) -> AppResult<Self> {
        let pair = Pair::from_str(&config.pair)
            .map_err(|e| AppError::Config(format!("Bad pair '{}': {e}", config.pair)))?;

        let api = DeadlineApi::wrap(registry.create(
            &config.exchange,
            &Credentials {
                api_key: config.api_key.clone(),
                api_secret: config.api_secret.clone(),
            },
        )?);

        let data_dir = PathBuf::from(&config.data_dir);
        let ledger = Arc::new(OrderLedger::open(data_dir.join("orders.jsonl"))?);
        let params = Arc::new(ParamsStore::load(data_dir.join("params.json")));
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        let ctx = Arc::new(EngineContext {
            pair,
            api: api.clone(),
            ledger,
            balances: Arc::new(BalanceCache::new(
                api.clone(),
                Duration::from_secs(config.balance_ttl_secs),
            )),
            books: Arc::new(BookCache::new(
                api.clone(),
                Duration::from_secs(config.book_ttl_secs),
            )),
            markets: Arc::new(MarketsCache::new(api)),
            params,
            notifier: Arc::new(ThrottledNotifier::hourly(notifier.clone())),
        });

        let reconciler = Arc::new(Reconciler::new(ctx.clone()));
        let collector = Arc::new(OrderCollector::new(ctx.clone()));
        let watcher = Arc::new(PriceWatcher::new(&ctx, registry, rate_info.clone()));
        let builder = Arc::new(ObBuilder::new(
            ctx.clone(),
            reconciler.clone(),
            collector.clone(),
            watcher.clone(),
        ));
        let provider = Arc::new(LiquidityProvider::new(
            ctx.clone(),
            reconciler.clone(),
            collector.clone(),
            watcher.clone(),
        ));
        let maker = Arc::new(PriceMaker::new(ctx.clone(), watcher.clone()));

        let scheduler = Arc::new(Scheduler::new(
            ctx.clone(),
            builder,
            provider.clone(),
            watcher,
            collector.clone(),
            maker.clone(),
        ));
        let processor = CommandProcessor::new(
            ctx.clone(),
            reconciler,
            collector,
            provider,
            maker,
            rate_info,
            config.amount_to_confirm_usd,
        );

        Ok(Self {
            ctx,
            scheduler,
            processor,
            notifier,
        })
    }

    /// Validate the traded pair against the exchange. A pair the
    /// exchange does not list is a fatal misconfiguration: activity is
    /// disabled and the operator notified.
    pub async fn run_preflight(&self) -> AppResult<()> {
        match self.ctx.markets.get(&self.ctx.pair).await? {
            Some(market) => {
                info!(
                    pair = %self.ctx.pair,
                    min_amount = %market.min_amount,
                    tick = %market.price_tick,
                    "Preflight ok"
                );
                Ok(())
            }
            None => {
                let message = format!(
                    "{} is not listed on {}",
                    self.ctx.pair,
                    self.ctx.api.exchange_id()
                );
                error!(%message, "Preflight failed, disabling activity");
                self.ctx.params.update(|p| p.is_active = false)?;
                self.notifier
                    .notify(shaper_telemetry::NotifyType::Error, &message);
                Err(AppError::Fatal(message))
            }
        }
    }

    /// Spawn the background maker loops.
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        self.scheduler.spawn()
    }

    /// Execute one operator command and route its notification.
    pub async fn handle_command(&self, input: &str) -> CommandOutcome {
        let outcome = self.processor.handle(input).await;
        if let Some(notify) = &outcome.notify {
            self.notifier.notify(outcome.notify_type, notify);
        }
        outcome
    }

    /// Stop scheduling further iterations; in-flight ticks finish.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }
}
