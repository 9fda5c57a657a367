//! End-to-end tests: the full application against the paper exchange.

use rust_decimal_macros::dec;
use shaper_bot::{AppConfig, Application};
use shaper_core::{Amount, CloseCause, Order, OrderSide, Pair, Price, Purpose, PwPolicy};
use shaper_exchange::{AdapterRegistry, ExchangeApi, FixedRates, PaperExchange};
use std::sync::Arc;
use tempfile::TempDir;

fn pair() -> Pair {
    Pair::new("ADM", "USDT")
}

fn config(dir: &TempDir) -> AppConfig {
    AppConfig {
        exchange: "paper".to_string(),
        pair: "ADM/USDT".to_string(),
        api_key: String::new(),
        api_secret: String::new(),
        data_dir: dir.path().to_string_lossy().to_string(),
        amount_to_confirm_usd: dec!(1000),
        balance_ttl_secs: 0,
        book_ttl_secs: 0,
    }
}

/// Registry whose "paper" id always resolves to one shared instance,
/// so tests can seed and inspect the exchange the app talks to.
fn shared_registry(paper: Arc<PaperExchange>) -> Arc<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    registry.register("paper", move |_| paper.clone() as Arc<dyn ExchangeApi>);
    Arc::new(registry)
}

fn usd_rates() -> Arc<FixedRates> {
    let rates = Arc::new(FixedRates::new());
    rates.set_usd_price("USDT", dec!(1));
    rates.set_usd_price("ADM", dec!(1));
    rates
}

#[tokio::test]
async fn test_preflight_rejects_unlisted_pair() {
    let dir = TempDir::new().unwrap();
    let paper = Arc::new(PaperExchange::new());
    // Nothing seeded: the pair is not listed

    let app = Application::new(&config(&dir), shared_registry(paper), usd_rates()).unwrap();
    // Activity was on from a previous run
    app.context().params.update(|p| p.is_active = true).unwrap();

    let err = app.run_preflight().await.unwrap_err();
    assert!(err.to_string().contains("not listed"));
    // Fatal misconfiguration disables activity
    assert!(!app.context().params.snapshot().is_active);
}

#[tokio::test]
async fn test_command_round_trip_configures_engine() {
    let dir = TempDir::new().unwrap();
    let paper = Arc::new(PaperExchange::new());
    paper.seed_flat_book(&pair(), dec!(100), dec!(0.0001), 20, dec!(10));
    paper.set_balance("USDT", Amount::new(dec!(10000)));
    paper.set_balance("ADM", Amount::new(dec!(1000)));

    let app = Application::new(&config(&dir), shared_registry(paper), usd_rates()).unwrap();
    app.run_preflight().await.unwrap();

    let outcome = app.handle_command("start mm optimal").await;
    assert!(outcome.user_message.contains("optimal"));
    let outcome = app.handle_command("enable ob 10 25%").await;
    assert!(outcome.user_message.contains("10 orders"));
    app.handle_command("amount 1-2").await;
    app.handle_command("buypercent 40").await;

    let params = app.context().params.snapshot();
    assert!(params.is_active && params.ob_active);
    assert_eq!(params.order_book_orders_count, 10);
    assert_eq!(params.min_amount.inner(), dec!(1));
    assert_eq!(params.buy_percent, dec!(40));

    let outcome = app.handle_command("rates").await;
    assert!(outcome.user_message.contains("last 100"));
    let outcome = app.handle_command("orders").await;
    assert!(outcome.user_message.contains("No open orders"));
}

#[tokio::test]
async fn test_fill_then_restart_replays_ledger() {
    let dir = TempDir::new().unwrap();
    let paper = Arc::new(PaperExchange::new());
    paper.seed_flat_book(&pair(), dec!(105), dec!(0.0001), 5, dec!(10));
    paper.set_balance("USDT", Amount::new(dec!(1000)));
    let registry = shared_registry(paper.clone());

    {
        let app = Application::new(&config(&dir), registry.clone(), usd_rates()).unwrap();
        app.run_preflight().await.unwrap();
        let outcome = app
            .handle_command("fill buy quote=50 low=100 high=110 count=5")
            .await;
        assert!(outcome.user_message.contains("Placed 5 of 5"));
    }

    // A new process over the same data dir sees the same open orders
    let app = Application::new(&config(&dir), registry, usd_rates()).unwrap();
    let open = app.context().ledger.find_open(Some(Purpose::Ld), &pair());
    assert_eq!(open.len(), 5);
    assert!(open.iter().all(|o| o.ladder_index.is_some()));
}

/// Price-shock scenario: with a strict watcher band of [95, 105] and
/// the book collapsed to 90, stray sell ob-orders below the band are
/// swept and nothing new is placed outside it.
#[tokio::test]
async fn test_band_shock_sweeps_and_blocks() {
    use shaper_engine::{
        EngineContext, ObBuilder, OrderCollector, ParamsStore, PriceWatcher, Reconciler,
    };
    use shaper_exchange::{BalanceCache, BookCache, MarketsCache, PlaceOrderRequest, PlaceOutcome};
    use shaper_ledger::OrderLedger;
    use shaper_telemetry::{LogNotifier, ThrottledNotifier};
    use std::time::Duration;

    let dir = TempDir::new().unwrap();
    let paper = Arc::new(PaperExchange::new());
    // External shock: asks now start at 90
    paper.seed_flat_book(&pair(), dec!(90), dec!(0.0001), 20, dec!(10));
    paper.set_balance("ADM", Amount::new(dec!(1000)));
    paper.set_balance("USDT", Amount::new(dec!(100000)));

    let params = shaper_core::TradeParams {
        is_active: true,
        ob_active: true,
        order_book_orders_count: 10,
        order_book_max_order_percent: dec!(100),
        min_amount: Amount::new(dec!(1)),
        max_amount: Amount::new(dec!(2)),
        pw_active: true,
        pw_policy: PwPolicy::Strict,
        pw_source: Some(shaper_core::PwSourceSpec::Range {
            low: dec!(95),
            high: dec!(105),
            coin: "USD".into(),
        }),
        ..shaper_core::TradeParams::default()
    };

    let api: Arc<dyn ExchangeApi> = paper.clone();
    let ctx = Arc::new(EngineContext {
        pair: pair(),
        api: api.clone(),
        ledger: Arc::new(OrderLedger::open(dir.path().join("orders.jsonl")).unwrap()),
        balances: Arc::new(BalanceCache::new(api.clone(), Duration::from_millis(0))),
        books: Arc::new(BookCache::new(api.clone(), Duration::from_millis(0))),
        markets: Arc::new(MarketsCache::new(api.clone())),
        params: Arc::new(ParamsStore::in_memory(params)),
        notifier: Arc::new(ThrottledNotifier::hourly(Arc::new(LogNotifier))),
    });

    // Sell ob-orders placed before the shock, now below the band
    let mut stray_ids = Vec::new();
    for price in [dec!(90.5), dec!(91)] {
        let outcome = paper
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
            Purpose::Ob,
            Price::new(price),
            Amount::new(dec!(1)),
        );
        order.mark_placed(exchange_id);
        stray_ids.push(order.id.clone());
        ctx.ledger.insert(order).unwrap();
    }

    let rates = usd_rates();
    let reconciler = Arc::new(Reconciler::new(ctx.clone()));
    let collector = Arc::new(OrderCollector::new(ctx.clone()));
    let watcher = Arc::new(PriceWatcher::new(
        &ctx,
        Arc::new(AdapterRegistry::new()),
        rates,
    ));
    watcher.tick().await;

    let builder = ObBuilder::new(ctx.clone(), reconciler, collector, watcher);

    // Two ticks are the allowance for the sweep
    builder.tick().await.unwrap();
    builder.tick().await.unwrap();

    for id in &stray_ids {
        let row = ctx.ledger.find_by_id(id).unwrap();
        assert!(row.closed, "stray order survived the band sweep");
        assert_eq!(row.close_cause, Some(CloseCause::OutOfPwRange));
    }
    // No placement outside [95, 105]: with the book at 90 nothing
    // inside the band is reachable, so nothing was placed at all
    for order in ctx.ledger.find_open(Some(Purpose::Ob), &pair()) {
        let price = order.price.unwrap().inner();
        assert!((dec!(95)..=dec!(105)).contains(&price));
    }
}

#[tokio::test]
async fn test_clear_unknown_removes_foreign_orders() {
    let dir = TempDir::new().unwrap();
    let paper = Arc::new(PaperExchange::new());
    paper.seed_flat_book(&pair(), dec!(100), dec!(0.0001), 5, dec!(10));
    paper.set_balance("USDT", Amount::new(dec!(1000)));

    let foreign = paper.inject_foreign_order(
        &pair(),
        OrderSide::Sell,
        Price::new(dec!(101)),
        Amount::new(dec!(5)),
    );

    let app = Application::new(&config(&dir), shared_registry(paper.clone()), usd_rates())
        .unwrap();
    app.run_preflight().await.unwrap();

    let outcome = app.handle_command("clear unk").await;
    assert!(
        outcome.user_message.contains("cancelled=1"),
        "got: {}",
        outcome.user_message
    );
    assert!(!paper.live_order_ids().contains(&foreign));
}
