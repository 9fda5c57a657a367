//! Command execution against the engine.
//!
//! The processor owns the confirmation state machine and the single
//! foreground path for operator-driven mutations: `tradeParams`
//! changes, manual placements, collector runs, and price moves.

use crate::confirm::Confirmation;
use crate::error::{CommandError, CommandResult};
use crate::format;
use crate::parser::{parse, ClearTarget, Command, Subsystem};
use rust_decimal::Decimal;
use shaper_core::{
    Amount, CloseCause, Order, OrderSide, Pair, Price, Purpose, PwAction, PwPolicy,
};
use shaper_engine::{
    CancelSelector, EngineContext, LiquidityProvider, OrderCollector, PriceFilter, PriceMaker,
    Reconciler, TargetPurpose,
};
use shaper_exchange::{ExchangeError, PlaceOrderRequest, PlaceOutcome, RateInfo};
use shaper_ledger::StatsWindow;
use shaper_telemetry::NotifyType;
use std::sync::Arc;
use tracing::info;

/// Structured result of one command: the operator reply plus an
/// optional notification for the host to route.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub user_message: String,
    pub notify: Option<String>,
    pub notify_type: NotifyType,
}

impl CommandOutcome {
    fn reply(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            notify: None,
            notify_type: NotifyType::Info,
        }
    }

    fn with_notify(message: impl Into<String>, notify: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            user_message: message,
            notify: Some(notify.into()),
            notify_type: NotifyType::Info,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            notify: Some(message.clone()),
            user_message: message,
            notify_type: NotifyType::Error,
        }
    }
}

pub struct CommandProcessor {
    ctx: Arc<EngineContext>,
    reconciler: Arc<Reconciler>,
    collector: Arc<OrderCollector>,
    provider: Arc<LiquidityProvider>,
    maker: Arc<PriceMaker>,
    rate_info: Arc<dyn RateInfo>,
    confirmation: Confirmation,
    amount_to_confirm_usd: Decimal,
}

impl CommandProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: Arc<EngineContext>,
        reconciler: Arc<Reconciler>,
        collector: Arc<OrderCollector>,
        provider: Arc<LiquidityProvider>,
        maker: Arc<PriceMaker>,
        rate_info: Arc<dyn RateInfo>,
        amount_to_confirm_usd: Decimal,
    ) -> Self {
        Self {
            ctx,
            reconciler,
            collector,
            provider,
            maker,
            rate_info,
            confirmation: Confirmation::new(),
            amount_to_confirm_usd,
        }
    }

    /// Handle one line of operator input.
    pub async fn handle(&self, input: &str) -> CommandOutcome {
        let mut input = input.to_string();
        loop {
            let parsed = match parse(&input) {
                Ok(parsed) => parsed,
                Err(CommandError::Validation(msg)) => return CommandOutcome::reply(msg),
                Err(e) => return CommandOutcome::error(format!("Command failed: {e}")),
            };

            if parsed.command == Command::Confirm {
                match self.confirmation.take() {
                    Some(raw) => {
                        // Re-run the parked command with the inline marker.
                        // An inline -y always wins over the pending slot.
                        input = format!("{raw} -y");
                        continue;
                    }
                    None => return CommandOutcome::reply("Nothing to confirm"),
                }
            }

            if !parsed.confirmed {
                if let Some(prompt) = self.confirmation_prompt(&parsed.command).await {
                    self.confirmation.request(&input);
                    return CommandOutcome::reply(prompt);
                }
            }

            return match self.execute(parsed.command).await {
                Ok(outcome) => outcome,
                Err(CommandError::Validation(msg)) => CommandOutcome::reply(msg),
                Err(CommandError::Exchange(ExchangeError::Rejected(reason)))
                | Err(CommandError::Engine(shaper_engine::EngineError::Exchange(
                    ExchangeError::Rejected(reason),
                ))) => CommandOutcome::reply(format!("Rejected: {reason}")),
                Err(e) => CommandOutcome::error(format!("Command failed: {e}")),
            };
        }
    }

    /// Does this command need a `y` first? Returns the prompt text.
    async fn confirmation_prompt(&self, command: &Command) -> Option<String> {
        match command {
            Command::Make { price } => Some(format!(
                "Moving the market price to {price} may consume significant depth. Confirm with y (10 minutes)."
            )),
            Command::Clear { force: true, .. } => Some(
                "Force-clearing marks orders closed even when the exchange state is uncertain. Confirm with y (10 minutes)."
                    .to_string(),
            ),
            Command::Fill {
                quote, amount, ..
            }
            | Command::Place {
                quote, amount, ..
            } => {
                let (value, coin) = match (quote, amount) {
                    (Some(q), _) => (*q, self.ctx.pair.quote.clone()),
                    (None, Some(a)) => (*a, self.ctx.pair.base.clone()),
                    (None, None) => return None,
                };
                match self.rate_info.usd_value(value, &coin).await {
                    Ok(usd) if usd < self.amount_to_confirm_usd => None,
                    Ok(usd) => Some(format!(
                        "This order is worth ≈ {usd:.2} USD. Confirm with y (10 minutes)."
                    )),
                    // No rate available: err on the side of confirming
                    Err(_) => Some(
                        "Unable to estimate the USD value of this order. Confirm with y (10 minutes)."
                            .to_string(),
                    ),
                }
            }
            _ => None,
        }
    }

    async fn execute(&self, command: Command) -> CommandResult<CommandOutcome> {
        match command {
            Command::Start { policy } => {
                let params = self.ctx.params.update(|p| {
                    p.is_active = true;
                    if let Some(policy) = policy {
                        p.policy = policy;
                    }
                })?;
                info!(policy = %params.policy, "Market making started");
                Ok(CommandOutcome::with_notify(
                    format!("Market making started with policy {}", params.policy),
                    format!("mm started ({})", params.policy),
                ))
            }
            Command::Stop => {
                self.ctx.params.update(|p| p.is_active = false)?;
                Ok(CommandOutcome::with_notify(
                    "Market making stopped. Live orders are kept",
                    "mm stopped",
                ))
            }
            Command::EnableOb {
                count,
                max_order_percent,
            } => {
                let params = self.ctx.params.update(|p| {
                    p.ob_active = true;
                    if let Some(count) = count {
                        p.order_book_orders_count = count;
                    }
                    if let Some(pct) = max_order_percent {
                        p.order_book_max_order_percent = pct;
                    }
                })?;
                Ok(CommandOutcome::reply(format!(
                    "Order-book builder enabled: {} orders, max {}% of max amount",
                    params.order_book_orders_count, params.order_book_max_order_percent
                )))
            }
            Command::EnableLiq {
                spread_percent,
                sell_amount,
                sell_coin,
                buy_amount,
                buy_coin,
                trend,
            } => {
                if sell_coin != self.ctx.pair.base {
                    return Err(CommandError::Validation(format!(
                        "Sell liquidity must be in {}",
                        self.ctx.pair.base
                    )));
                }
                if buy_coin != self.ctx.pair.quote {
                    return Err(CommandError::Validation(format!(
                        "Buy liquidity must be in {}",
                        self.ctx.pair.quote
                    )));
                }
                let params = self.ctx.params.update(|p| {
                    p.liq_active = true;
                    p.liquidity_spread_percent = spread_percent;
                    p.liquidity_sell_amount = Amount::new(sell_amount);
                    p.liquidity_buy_quote_amount = Amount::new(buy_amount);
                    if let Some(trend) = trend {
                        p.liquidity_trend = trend;
                    }
                })?;
                // A new liquidity set reseeds the standing pools
                self.provider.request_reseed();
                Ok(CommandOutcome::reply(format!(
                    "Liquidity enabled: {} {} asks + {} {} bids, {}% spread, {} trend",
                    params.liquidity_sell_amount,
                    self.ctx.pair.base,
                    params.liquidity_buy_quote_amount,
                    self.ctx.pair.quote,
                    params.liquidity_spread_percent,
                    params.liquidity_trend,
                )))
            }
            Command::EnablePw {
                source,
                deviation_percent,
                policy,
                action,
            } => {
                self.ctx.params.update(|p| {
                    p.pw_active = true;
                    p.pw_source = Some(source.clone());
                    p.pw_deviation_percent = deviation_percent;
                    p.pw_policy = policy.unwrap_or(PwPolicy::Smart);
                    p.pw_action = action.unwrap_or(PwAction::Fill);
                })?;
                Ok(CommandOutcome::reply("Price watcher enabled"))
            }
            Command::Disable(subsystem) => {
                self.ctx.params.update(|p| match subsystem {
                    Subsystem::Ob => p.ob_active = false,
                    Subsystem::Liq => p.liq_active = false,
                    Subsystem::Pw => p.pw_active = false,
                })?;
                Ok(CommandOutcome::reply(format!("{subsystem:?} disabled")))
            }
            Command::Amount { min, max } => {
                self.ctx.params.update(|p| {
                    p.min_amount = Amount::new(min);
                    p.max_amount = Amount::new(max);
                })?;
                Ok(CommandOutcome::reply(format!(
                    "Order amounts set to {min}..{max} {}",
                    self.ctx.pair.base
                )))
            }
            Command::Interval { min_sec, max_sec } => {
                self.ctx.params.update(|p| {
                    p.min_interval_sec = min_sec;
                    p.max_interval_sec = max_sec;
                })?;
                Ok(CommandOutcome::reply(format!(
                    "Tick interval set to {min_sec}..{max_sec} seconds"
                )))
            }
            Command::BuyPercent(pct) => {
                self.ctx.params.update(|p| p.buy_percent = pct)?;
                Ok(CommandOutcome::reply(format!("Buy bias set to {pct}%")))
            }
            Command::Clear {
                pair,
                target,
                side,
                price_filter,
                force,
            } => self.exec_clear(pair, target, side, price_filter, force).await,
            Command::Fill {
                pair,
                side,
                quote,
                amount,
                low,
                high,
                count,
            } => {
                self.check_pair(&pair)?;
                self.exec_fill(side, quote, amount, low, high, count).await
            }
            Command::Place {
                side,
                pair,
                amount,
                quote,
                price,
            } => {
                self.check_pair(&pair)?;
                self.exec_place(side, amount, quote, price).await
            }
            Command::Make { price } => {
                let report = self.maker.make_price(Price::new(price)).await?;
                Ok(CommandOutcome::with_notify(
                    format::format_make(&report),
                    format!("pm-order: {} {} @ {}", report.side, report.amount, report.price),
                ))
            }
            Command::Confirm => Ok(CommandOutcome::reply("Nothing to confirm")),
            Command::Rates => {
                let rates = self.ctx.api.get_rates(&self.ctx.pair).await?;
                Ok(CommandOutcome::reply(format::format_rates(
                    &self.ctx.pair,
                    &rates,
                )))
            }
            Command::Stats => {
                let stats = self.ctx.ledger.stats_by_purpose(
                    &self.ctx.pair,
                    &Purpose::ALL,
                    StatsWindow::Day,
                );
                Ok(CommandOutcome::reply(format::format_stats(
                    &self.ctx.pair,
                    StatsWindow::Day,
                    &stats,
                )))
            }
            Command::Orders => {
                self.reconciler.reconcile(None).await;
                let orders = self.ctx.ledger.open_orders(&self.ctx.pair);
                Ok(CommandOutcome::reply(format::format_orders(
                    &self.ctx.pair,
                    &orders,
                )))
            }
            Command::Balances => {
                let snapshot = self.ctx.balances.get().await?;
                Ok(CommandOutcome::reply(format::format_balances(&snapshot)))
            }
            Command::Account => {
                let mut snapshot = self.ctx.balances.get().await?;
                let mut total = Decimal::ZERO;
                let mut complete = true;
                for entry in &snapshot.entries {
                    match self
                        .rate_info
                        .usd_value(entry.total().inner(), &entry.coin)
                        .await
                    {
                        Ok(usd) => total += usd,
                        Err(_) => complete = false,
                    }
                }
                if complete {
                    snapshot.total_usd = Some(Amount::new(total));
                    if let Ok(btc) = self.rate_info.convert(total, "USD", "BTC").await {
                        snapshot.total_btc = Some(Amount::new(btc));
                    }
                }
                Ok(CommandOutcome::reply(format::format_balances(&snapshot)))
            }
            Command::Params => Ok(CommandOutcome::reply(format::format_params(
                &self.ctx.params.snapshot(),
            ))),
            Command::Info => {
                let params = self.ctx.params.snapshot();
                Ok(CommandOutcome::reply(format!(
                    "{} on {} | mm {} ({}) | ob {} | liq {} | pw {}",
                    self.ctx.pair,
                    self.ctx.api.exchange_id(),
                    if params.is_active { "active" } else { "stopped" },
                    params.policy,
                    if params.ob_active { "on" } else { "off" },
                    if params.liq_active { "on" } else { "off" },
                    if params.pw_active { "on" } else { "off" },
                )))
            }
            Command::PairInfo => {
                match self.ctx.markets.get(&self.ctx.pair).await? {
                    Some(market) => Ok(CommandOutcome::reply(format::format_market(
                        &self.ctx.pair,
                        &market,
                    ))),
                    None => Ok(CommandOutcome::reply(format!(
                        "{} is not listed on {}",
                        self.ctx.pair,
                        self.ctx.api.exchange_id()
                    ))),
                }
            }
            Command::Calc { amount, from, to } => {
                match self.rate_info.convert(amount, &from, &to).await {
                    Ok(value) => Ok(CommandOutcome::reply(format!(
                        "{amount} {from} ≈ {value} {to}"
                    ))),
                    Err(_) => Ok(CommandOutcome::reply(format!(
                        "No rate available for {from}->{to}"
                    ))),
                }
            }
            Command::Deposit { coin } => {
                let supported = self.ctx.api.features().get_deposit_address;
                Ok(CommandOutcome::reply(if supported {
                    format!(
                        "{} supports deposit address lookup for {coin}; use the exchange surface",
                        self.ctx.api.exchange_id()
                    )
                } else {
                    format!(
                        "{} does not support deposit address lookup",
                        self.ctx.api.exchange_id()
                    )
                }))
            }
            Command::Version => Ok(CommandOutcome::reply(format!(
                "bookshaper {}",
                env!("CARGO_PKG_VERSION")
            ))),
            Command::Help => Ok(CommandOutcome::reply(HELP_TEXT)),
        }
    }

    fn check_pair(&self, pair: &Option<Pair>) -> CommandResult<()> {
        match pair {
            Some(pair) if *pair != self.ctx.pair => Err(CommandError::Validation(format!(
                "Only {} is traded by this agent",
                self.ctx.pair
            ))),
            _ => Ok(()),
        }
    }

    async fn exec_clear(
        &self,
        pair: Option<Pair>,
        target: ClearTarget,
        side: Option<OrderSide>,
        price_filter: Option<(bool, Decimal)>,
        force: bool,
    ) -> CommandResult<CommandOutcome> {
        self.check_pair(&pair)?;
        let target = match target {
            ClearTarget::All => TargetPurpose::All,
            ClearTarget::Unknown => TargetPurpose::Unknown,
            ClearTarget::Purpose(purpose) => TargetPurpose::Purposes(vec![purpose]),
        };
        let selector = CancelSelector {
            target,
            pair: self.ctx.pair.clone(),
            side,
            price_filter: price_filter.map(|(above, price)| {
                if above {
                    PriceFilter::Above(Price::new(price))
                } else {
                    PriceFilter::Below(Price::new(price))
                }
            }),
            expired_only: false,
            force,
        };

        // Fresh fills first so already-gone orders are not "cancelled"
        self.reconciler.reconcile(None).await;
        let report = self
            .collector
            .collect(&selector, CloseCause::UserCommand, "clear command")
            .await?;
        Ok(CommandOutcome::with_notify(
            format!("Clear done: {report}"),
            format!("clear: {report}"),
        ))
    }

    async fn exec_fill(
        &self,
        side: OrderSide,
        quote: Option<Decimal>,
        amount: Option<Decimal>,
        low: Decimal,
        high: Decimal,
        count: u32,
    ) -> CommandResult<CommandOutcome> {
        let market = self
            .ctx
            .markets
            .get(&self.ctx.pair)
            .await?
            .ok_or_else(|| {
                CommandError::Validation(format!("{} is not listed", self.ctx.pair))
            })?;

        // Prices spread evenly across [low, high]
        let step = if count > 1 {
            (high - low) / Decimal::from(count - 1)
        } else {
            Decimal::ZERO
        };
        let orders: Vec<(Price, Amount)> = (0..count)
            .map(|i| {
                let price = Price::new(low + step * Decimal::from(i)).round_to_tick(market.price_tick);
                let base = match (quote, amount) {
                    (Some(q), _) => Amount::new(q / Decimal::from(count) / price.inner()),
                    (None, Some(a)) => Amount::new(a / Decimal::from(count)),
                    (None, None) => Amount::ZERO,
                };
                (price, base.round_dp_down(market.base_decimals))
            })
            .collect();

        // Whole-command balance pre-check before anything is placed
        let balances = self.ctx.balances.get().await?;
        let (coin, needed) = match side {
            OrderSide::Buy => (
                self.ctx.pair.quote.clone(),
                orders
                    .iter()
                    .map(|(p, b)| p.inner() * b.inner())
                    .sum::<Decimal>(),
            ),
            OrderSide::Sell => (
                self.ctx.pair.base.clone(),
                orders.iter().map(|(_, b)| b.inner()).sum::<Decimal>(),
            ),
        };
        if balances.free(&coin).inner() < needed {
            return Ok(CommandOutcome::reply(format!("Not enough {coin}")));
        }

        let mut placed = 0usize;
        let mut not_placed = 0usize;
        for (index, (price, base)) in orders.into_iter().enumerate() {
            if !market.amount_in_range(base) {
                continue;
            }
            let outcome = self
                .ctx
                .api
                .place_order(&PlaceOrderRequest {
                    pair: self.ctx.pair.clone(),
                    side,
                    price: Some(price),
                    base_amount: Some(base),
                    quote_amount: None,
                    is_limit: true,
                })
                .await?;
            match outcome {
                PlaceOutcome::Placed { exchange_id } => {
                    let mut order =
                        Order::new_limit(self.ctx.pair.clone(), side, Purpose::Ld, price, base)
                            .with_ladder(index as u32, "new");
                    order.mark_placed(exchange_id);
                    self.ctx.ledger.insert(order)?;
                    self.ctx.balances.invalidate();
                    placed += 1;
                }
                PlaceOutcome::Rejected { reason } => {
                    // Rejected rungs stay in the ledger for operator
                    // visibility; they never count as open
                    let mut order =
                        Order::new_limit(self.ctx.pair.clone(), side, Purpose::Ld, price, base)
                            .with_ladder(index as u32, "not placed");
                    order.mark_not_placed(reason);
                    self.ctx.ledger.insert(order)?;
                    not_placed += 1;
                }
            }
        }
        let mut message =
            format!("Placed {placed} of {count} {side} orders across {low}..{high}");
        if not_placed > 0 {
            message.push_str(&format!(", {not_placed} rejected by the exchange"));
        }
        Ok(CommandOutcome::reply(message))
    }

    async fn exec_place(
        &self,
        side: OrderSide,
        amount: Option<Decimal>,
        quote: Option<Decimal>,
        price: Option<Decimal>,
    ) -> CommandResult<CommandOutcome> {
        let is_limit = price.is_some();
        if !is_limit && !self.ctx.api.features().place_market_order {
            return Err(CommandError::Validation(format!(
                "Market orders are not supported on {}",
                self.ctx.api.exchange_id()
            )));
        }

        // Resolve the execution price for sizing and balance checks
        let reference_price = match price {
            Some(p) => Price::new(p),
            None => self.ctx.api.get_rates(&self.ctx.pair).await?.last,
        };
        let base = match (amount, quote) {
            (Some(a), _) => Amount::new(a),
            (None, Some(q)) if !reference_price.is_zero() => {
                Amount::new(q / reference_price.inner())
            }
            _ => return Err(CommandError::Validation("No amount given".to_string())),
        };

        let balances = self.ctx.balances.get().await?;
        let (coin, needed) = match side {
            OrderSide::Buy => (
                self.ctx.pair.quote.clone(),
                base.inner() * reference_price.inner(),
            ),
            OrderSide::Sell => (self.ctx.pair.base.clone(), base.inner()),
        };
        if balances.free(&coin).inner() < needed {
            return Ok(CommandOutcome::reply(format!("Not enough {coin}")));
        }

        let outcome = self
            .ctx
            .api
            .place_order(&PlaceOrderRequest {
                pair: self.ctx.pair.clone(),
                side,
                price: price.map(Price::new),
                base_amount: Some(base),
                quote_amount: None,
                is_limit,
            })
            .await?;

        match outcome {
            PlaceOutcome::Placed { exchange_id } => {
                let mut order = if is_limit {
                    Order::new_limit(
                        self.ctx.pair.clone(),
                        side,
                        Purpose::Man,
                        reference_price,
                        base,
                    )
                } else {
                    Order::new_market(
                        self.ctx.pair.clone(),
                        side,
                        Purpose::Man,
                        base,
                        Amount::new(base.inner() * reference_price.inner()),
                    )
                };
                order.mark_placed(&exchange_id);
                self.ctx.ledger.insert(order)?;
                self.ctx.balances.invalidate();
                Ok(CommandOutcome::reply(format!(
                    "{side} order placed: {base} {} at {}",
                    self.ctx.pair.base,
                    if is_limit {
                        reference_price.to_string()
                    } else {
                        "market".to_string()
                    },
                )))
            }
            PlaceOutcome::Rejected { reason } => {
                Ok(CommandOutcome::reply(format!("Rejected: {reason}")))
            }
        }
    }
}

const HELP_TEXT: &str = "Commands:
  start mm [optimal|spread|depth] / stop mm
  enable ob [count] [pct%] | enable liq <spread%> <a1> <c1> <a2> <c2> [trend] | enable pw <range|dev%> [src] [policy] [action]
  disable ob|liq|pw
  amount <min>-<max> | interval <min>-<max> sec|min|hour | buypercent <n>
  clear [pair] <purpose|all|unk> [buy|sell] [>P c | <P c] [force]
  fill [pair] buy|sell quote=X|amount=X low=L high=H count=N
  buy|sell [pair] amount=X|quote=X [price=P|market]
  make price <target> now
  y (confirm the pending command)
  rates stats orders balances params info pair calc deposit account version help";

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use shaper_core::TradeParams;
    use shaper_engine::{ParamsStore, PriceWatcher};
    use shaper_exchange::{
        AdapterRegistry, BalanceCache, BookCache, ExchangeApi, FixedRates, MarketsCache,
        PaperExchange,
    };
    use shaper_ledger::OrderLedger;
    use shaper_telemetry::{LogNotifier, ThrottledNotifier};
    use std::time::Duration;
    use tempfile::TempDir;

    fn pair() -> Pair {
        Pair::new("ADM", "USDT")
    }

    struct Harness {
        processor: CommandProcessor,
        ctx: Arc<EngineContext>,
        paper: Arc<PaperExchange>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let paper = Arc::new(PaperExchange::new());
        let api: Arc<dyn shaper_exchange::ExchangeApi> = paper.clone();
        let ctx = Arc::new(EngineContext {
            pair: pair(),
            api: api.clone(),
            ledger: Arc::new(OrderLedger::open(dir.path().join("orders.jsonl")).unwrap()),
            balances: Arc::new(BalanceCache::new(api.clone(), Duration::from_millis(0))),
            books: Arc::new(BookCache::new(api.clone(), Duration::from_millis(0))),
            markets: Arc::new(MarketsCache::new(api.clone())),
            params: Arc::new(ParamsStore::in_memory(TradeParams::default())),
            notifier: Arc::new(ThrottledNotifier::hourly(Arc::new(LogNotifier))),
        });

        let rates = Arc::new(FixedRates::new());
        rates.set_usd_price("USDT", dec!(1));
        rates.set_usd_price("ADM", dec!(1));
        rates.set_usd_price("BTC", dec!(50000));

        let reconciler = Arc::new(Reconciler::new(ctx.clone()));
        let collector = Arc::new(OrderCollector::new(ctx.clone()));
        let watcher = Arc::new(PriceWatcher::new(
            &ctx,
            Arc::new(AdapterRegistry::new()),
            rates.clone(),
        ));
        let provider = Arc::new(LiquidityProvider::new(
            ctx.clone(),
            reconciler.clone(),
            collector.clone(),
            watcher.clone(),
        ));
        let maker = Arc::new(PriceMaker::new(ctx.clone(), watcher));

        let processor = CommandProcessor::new(
            ctx.clone(),
            reconciler,
            collector,
            provider,
            maker,
            rates,
            dec!(100),
        );
        Harness {
            processor,
            ctx,
            paper,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_start_stop_mutate_params() {
        let h = harness();
        let outcome = h.processor.handle("start mm spread").await;
        assert!(outcome.user_message.contains("spread"));
        assert!(h.ctx.params.snapshot().is_active);

        h.processor.handle("stop mm").await;
        assert!(!h.ctx.params.snapshot().is_active);
    }

    #[tokio::test]
    async fn test_clear_price_filter_selects_two_of_four() {
        let h = harness();
        h.paper.set_balance("ADM", Amount::new(dec!(100)));
        h.paper.seed_flat_book(&pair(), dec!(0.5), dec!(0.0001), 3, dec!(10));

        // Four sell mm-orders at 0.3 / 0.4 / 0.6 / 0.7
        for price in [dec!(0.3), dec!(0.4), dec!(0.6), dec!(0.7)] {
            let outcome = h
                .paper
                .place_order(&PlaceOrderRequest {
                    pair: pair(),
                    side: OrderSide::Sell,
                    price: Some(Price::new(price)),
                    base_amount: Some(Amount::new(dec!(1))),
                    quote_amount: None,
                    is_limit: true,
                })
                .await
                .unwrap();
            let exchange_id = match outcome {
                PlaceOutcome::Placed { exchange_id } => exchange_id,
                other => panic!("{other:?}"),
            };
            let mut order = Order::new_limit(
                pair(),
                OrderSide::Sell,
                Purpose::Mm,
                Price::new(price),
                Amount::new(dec!(1)),
            );
            order.mark_placed(exchange_id);
            h.ctx.ledger.insert(order).unwrap();
        }

        let outcome = h.processor.handle("/clear mm sell >0.5 USDT").await;
        assert!(
            outcome.user_message.contains("attempted=2, cancelled=2"),
            "got: {}",
            outcome.user_message
        );
        assert_eq!(h.ctx.ledger.find_open(Some(Purpose::Mm), &pair()).len(), 2);
    }

    #[tokio::test]
    async fn test_fill_rejects_on_insufficient_balance() {
        let h = harness();
        h.paper.seed_flat_book(&pair(), dec!(105), dec!(0.0001), 3, dec!(10));
        h.paper.set_balance("USDT", Amount::new(dec!(0.005)));

        let outcome = h
            .processor
            .handle("fill buy quote=0.01 low=100 high=110 count=5")
            .await;
        assert!(
            outcome.user_message.contains("Not enough USDT"),
            "got: {}",
            outcome.user_message
        );
        assert!(h.ctx.ledger.is_empty());
        assert!(h.paper.live_order_ids().is_empty());
    }

    #[tokio::test]
    async fn test_fill_places_ladder_orders() {
        let h = harness();
        h.paper.seed_flat_book(&pair(), dec!(105), dec!(0.0001), 3, dec!(10));
        h.paper.set_balance("USDT", Amount::new(dec!(1000)));

        let outcome = h
            .processor
            .handle("fill buy quote=50 low=100 high=110 count=5")
            .await;
        assert!(outcome.user_message.contains("Placed 5 of 5"));

        let open = h.ctx.ledger.find_open(Some(Purpose::Ld), &pair());
        assert_eq!(open.len(), 5);
        let mut rungs: Vec<(u32, Decimal)> = open
            .iter()
            .map(|o| (o.ladder_index.unwrap(), o.price.unwrap().inner()))
            .collect();
        rungs.sort();
        assert_eq!(rungs.first().copied(), Some((0, dec!(100))));
        assert_eq!(rungs.last().copied(), Some((4, dec!(110))));
        assert!(open.iter().all(|o| o.ladder_state.as_deref() == Some("new")));
    }

    #[tokio::test]
    async fn test_fill_records_rejected_rungs_as_not_placed() {
        let h = harness();
        h.paper.seed_flat_book(&pair(), dec!(105), dec!(0.0001), 3, dec!(10));
        h.paper.set_balance("USDT", Amount::new(dec!(1000)));
        h.paper.inject_place_rejections(1);

        let outcome = h
            .processor
            .handle("fill buy quote=50 low=100 high=110 count=5")
            .await;
        assert!(
            outcome.user_message.contains("Placed 4 of 5"),
            "got: {}",
            outcome.user_message
        );
        assert!(outcome.user_message.contains("1 rejected"));

        // The rejected rung is visible in the ledger but never open
        assert_eq!(h.ctx.ledger.find_open(Some(Purpose::Ld), &pair()).len(), 4);
        let not_placed: Vec<_> = h
            .ctx
            .ledger
            .all_orders()
            .into_iter()
            .filter(|o| o.not_placed_reason.is_some())
            .collect();
        assert_eq!(not_placed.len(), 1);
        assert_eq!(not_placed[0].ladder_state.as_deref(), Some("not placed"));
        assert_eq!(not_placed[0].ladder_index, Some(0));
    }

    #[tokio::test]
    async fn test_account_reports_usd_and_btc_totals() {
        let h = harness();
        h.paper.set_balance("USDT", Amount::new(dec!(100)));

        let outcome = h.processor.handle("account").await;
        assert!(
            outcome.user_message.contains("≈ 100 USD total"),
            "got: {}",
            outcome.user_message
        );
        assert!(outcome.user_message.contains("0.002 BTC total"));
    }

    #[tokio::test]
    async fn test_make_requires_confirmation_and_y_is_idempotent() {
        let h = harness();
        // Best ask 1.00 with 50 base cumulative up to 1.10
        h.paper.set_book(
            &pair(),
            shaper_core::OrderBook::new(
                vec![shaper_core::BookLevel::new(
                    Price::new(dec!(0.95)),
                    Amount::new(dec!(10)),
                )],
                vec![
                    shaper_core::BookLevel::new(Price::new(dec!(1.00)), Amount::new(dec!(10))),
                    shaper_core::BookLevel::new(Price::new(dec!(1.05)), Amount::new(dec!(20))),
                    shaper_core::BookLevel::new(Price::new(dec!(1.10)), Amount::new(dec!(20))),
                ],
            ),
        );
        h.paper.set_rates(
            &pair(),
            shaper_core::Rates {
                bid: Price::new(dec!(0.95)),
                ask: Price::new(dec!(1.00)),
                last: Price::new(dec!(1.00)),
                high_24h: Price::new(dec!(1.2)),
                low_24h: Price::new(dec!(0.9)),
                volume_24h: Amount::new(dec!(100)),
                quote_volume_24h: Amount::new(dec!(100)),
            },
        );
        h.paper.set_balance("USDT", Amount::new(dec!(100)));

        // First pass: a confirmation prompt, nothing placed
        let outcome = h.processor.handle("make price 1.10 USDT now").await;
        assert!(outcome.user_message.contains("Confirm with y"));
        assert!(h.ctx.ledger.is_empty());

        // y executes exactly once
        let outcome = h.processor.handle("y").await;
        assert!(
            outcome.user_message.contains("Pm-order placed"),
            "got: {}",
            outcome.user_message
        );
        let open = h.ctx.ledger.find_open(Some(Purpose::Pm), &pair());
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].side, OrderSide::Buy);
        assert_eq!(open[0].price.unwrap().inner(), dec!(1.1));
        // 50 base depth × reliability ≥ 1.05
        assert!(open[0].base_amount.inner() >= dec!(52.5));

        // Second y: nothing pending
        let outcome = h.processor.handle("y").await;
        assert_eq!(outcome.user_message, "Nothing to confirm");
        assert_eq!(h.ctx.ledger.find_open(Some(Purpose::Pm), &pair()).len(), 1);
    }

    #[tokio::test]
    async fn test_inline_marker_skips_confirmation() {
        let h = harness();
        h.paper.seed_flat_book(&pair(), dec!(1), dec!(0.0001), 5, dec!(10));
        h.paper.set_balance("USDT", Amount::new(dec!(1000)));

        // Notional 500 USD ≥ the 100 USD threshold, but -y pre-confirms
        let outcome = h
            .processor
            .handle("buy amount=500 price=1 -y")
            .await;
        assert!(
            outcome.user_message.contains("order placed"),
            "got: {}",
            outcome.user_message
        );
        assert_eq!(h.ctx.ledger.find_open(Some(Purpose::Man), &pair()).len(), 1);
    }

    #[tokio::test]
    async fn test_small_order_skips_confirmation() {
        let h = harness();
        h.paper.seed_flat_book(&pair(), dec!(1), dec!(0.0001), 5, dec!(10));
        h.paper.set_balance("USDT", Amount::new(dec!(100)));

        let outcome = h.processor.handle("buy amount=5 price=1").await;
        assert!(outcome.user_message.contains("order placed"));
    }

    #[tokio::test]
    async fn test_enable_liq_validates_coins() {
        let h = harness();
        let outcome = h.processor.handle("enable liq 2% 100 BTC 50 USDT").await;
        assert!(outcome.user_message.contains("must be in ADM"));
        assert!(!h.ctx.params.snapshot().liq_active);

        let outcome = h.processor.handle("enable liq 2% 100 ADM 50 USDT uptrend").await;
        assert!(outcome.user_message.contains("Liquidity enabled"));
        let params = h.ctx.params.snapshot();
        assert!(params.liq_active);
        assert_eq!(params.liquidity_sell_amount.inner(), dec!(100));
    }

    #[tokio::test]
    async fn test_validation_error_returns_usage() {
        let h = harness();
        let outcome = h.processor.handle("interval 5-1 sec").await;
        assert!(outcome.user_message.contains("Usage: interval"));
    }

    #[tokio::test]
    async fn test_info_and_version() {
        let h = harness();
        let outcome = h.processor.handle("info").await;
        assert!(outcome.user_message.contains("ADM/USDT"));
        assert!(outcome.user_message.contains("paper"));

        let outcome = h.processor.handle("version").await;
        assert!(outcome.user_message.contains("bookshaper"));
    }
}
