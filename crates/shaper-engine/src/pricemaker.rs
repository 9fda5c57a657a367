//! Price maker: one-shot corrective orders that move the market price.
//!
//! Computes the opposite-side depth up to the target level, inflates it
//! by a reliability factor to defeat races with other participants, and
//! places a single pm-order at the target.

use crate::error::EngineResult;
use crate::watcher::{PriceWatcher, RangeVerdict};
use crate::EngineContext;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use shaper_core::{Amount, Order, OrderId, OrderSide, Price, Purpose, Rates};
use shaper_exchange::{ExchangeError, PlaceOrderRequest, PlaceOutcome};
use std::sync::Arc;
use tracing::{debug, info};

/// Reliability factor bounds applied to the depth estimate.
const RELIABILITY_LOW: f64 = 1.05;
const RELIABILITY_HIGH: f64 = 1.10;

/// Outcome of one price move, with before/after rates for the report.
#[derive(Debug, Clone)]
pub struct MakeReport {
    pub side: OrderSide,
    pub price: Price,
    pub amount: Amount,
    pub rates_before: Rates,
    pub rates_after: Option<Rates>,
    pub order_id: OrderId,
}

pub struct PriceMaker {
    ctx: Arc<EngineContext>,
    watcher: Arc<PriceWatcher>,
}

impl PriceMaker {
    pub fn new(ctx: Arc<EngineContext>, watcher: Arc<PriceWatcher>) -> Self {
        Self { ctx, watcher }
    }

    /// Push the market price toward `target` with a single pm-order.
    pub async fn make_price(&self, target: Price) -> EngineResult<MakeReport> {
        let params = self.ctx.params.snapshot();
        let verdict = self.watcher.placement_range(&params);
        if verdict == RangeVerdict::Blocked {
            return Err(crate::EngineError::WatcherUnavailable);
        }
        // Drawn up front so no rng lives across a suspension point
        let reliability = {
            let mut rng = rand::thread_rng();
            Decimal::from_f64(rng.gen_range(RELIABILITY_LOW..RELIABILITY_HIGH))
                .unwrap_or(Decimal::new(105, 2))
        };

        let rates_before = self.ctx.api.get_rates(&self.ctx.pair).await?;
        let side = if target > rates_before.last {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };

        let book = self.ctx.books.get(&self.ctx.pair).await?;
        let depth = book.depth_to_price(side, target);
        // Reliability is applied to the raw depth, before any band clamp
        let mut amount = if depth.is_positive() {
            Amount::new(depth.inner() * reliability)
        } else {
            params.min_amount
        };

        let mut price = target;
        if let RangeVerdict::Band(low, high) = verdict {
            price = price.clamp_to(low, high);
        }
        if let Some(market) = self.ctx.markets.get(&self.ctx.pair).await? {
            price = price.round_to_tick(market.price_tick);
            amount = amount.round_dp_down(market.base_decimals);
            if amount < market.min_amount {
                amount = market.min_amount;
            }
        }

        let snapshot = self.ctx.balances.get().await?;
        let (coin, needed) = match side {
            OrderSide::Buy => (
                self.ctx.pair.quote.as_str(),
                amount.inner() * price.inner(),
            ),
            OrderSide::Sell => (self.ctx.pair.base.as_str(), amount.inner()),
        };
        if snapshot.free(coin).inner() < needed {
            return Err(ExchangeError::Rejected(format!("Not enough {coin}")).into());
        }

        debug!(%side, %price, %amount, %depth, "Placing pm-order");
        let outcome = self
            .ctx
            .api
            .place_order(&PlaceOrderRequest {
                pair: self.ctx.pair.clone(),
                side,
                price: Some(price),
                base_amount: Some(amount),
                quote_amount: None,
                is_limit: true,
            })
            .await?;

        let exchange_id = match outcome {
            PlaceOutcome::Placed { exchange_id } => exchange_id,
            PlaceOutcome::Rejected { reason } => {
                return Err(ExchangeError::Rejected(reason).into());
            }
        };

        let mut order = Order::new_limit(self.ctx.pair.clone(), side, Purpose::Pm, price, amount);
        order.mark_placed(exchange_id);
        let order_id = order.id.clone();
        self.ctx.ledger.insert(order)?;
        self.ctx.balances.invalidate();
        self.ctx.books.invalidate(&self.ctx.pair);

        let rates_after = self.ctx.api.get_rates(&self.ctx.pair).await.ok();
        info!(%side, %price, %amount, "Pm-order placed");

        // Delayed rate snapshot for the log, off the command path
        let api = self.ctx.api.clone();
        let pair = self.ctx.pair.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(7)).await;
            if let Ok(rates) = api.get_rates(&pair).await {
                info!(last = %rates.last, bid = %rates.bid, ask = %rates.ask, "Post-move rates");
            }
        });
        Ok(MakeReport {
            side,
            price,
            amount,
            rates_before,
            rates_after,
            order_id,
        })
    }
}
