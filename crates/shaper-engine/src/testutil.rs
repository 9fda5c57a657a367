//! Shared test harness: a paper exchange wired into an engine context.

use crate::params::ParamsStore;
use crate::EngineContext;
use shaper_core::{Amount, Order, OrderId, OrderSide, Pair, Price, Purpose, TradeParams};
use shaper_exchange::{
    BalanceCache, BookCache, ExchangeApi, MarketsCache, PaperExchange, PlaceOrderRequest,
    PlaceOutcome,
};
use shaper_ledger::OrderLedger;
use shaper_telemetry::{LogNotifier, ThrottledNotifier};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub fn pair() -> Pair {
    Pair::new("ADM", "USDT")
}

pub fn make_ctx(dir: &TempDir, params: TradeParams) -> (Arc<EngineContext>, Arc<PaperExchange>) {
    let paper = Arc::new(PaperExchange::new());
    let api: Arc<dyn shaper_exchange::ExchangeApi> = paper.clone();
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
    (ctx, paper)
}

/// Place a limit order on the paper exchange and track it in the
/// ledger, the way a maker would.
pub async fn place_tracked(
    ctx: &EngineContext,
    paper: &PaperExchange,
    purpose: Purpose,
    side: OrderSide,
    price: rust_decimal::Decimal,
    base: rust_decimal::Decimal,
) -> (OrderId, String) {
    let outcome = paper
        .place_order(&PlaceOrderRequest {
            pair: pair(),
            side,
            price: Some(Price::new(price)),
            base_amount: Some(Amount::new(base)),
            quote_amount: None,
            is_limit: true,
        })
        .await
        .unwrap();
    let exchange_id = match outcome {
        PlaceOutcome::Placed { exchange_id } => exchange_id,
        other => panic!("placement rejected: {other:?}"),
    };
    let mut order = Order::new_limit(pair(), side, purpose, Price::new(price), Amount::new(base));
    order.mark_placed(exchange_id.clone());
    let id = order.id.clone();
    ctx.ledger.insert(order).unwrap();
    (id, exchange_id)
}
