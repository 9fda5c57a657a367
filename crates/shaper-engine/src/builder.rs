//! Order-book builder: short-lived depth orders inside the visible book.
//!
//! Each iteration reconciles, sweeps expired and out-of-band ob-orders,
//! then places up to five new ones at randomized positions between
//! existing levels. Orders closer to the spread expire sooner.

use crate::collector::{CancelSelector, OrderCollector, PriceFilter};
use crate::error::EngineResult;
use crate::reconciler::Reconciler;
use crate::watcher::{PriceWatcher, RangeVerdict};
use crate::EngineContext;
use chrono::Utc;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use shaper_core::{
    Amount, CloseCause, MarketInfo, Order, OrderBook, OrderSide, Price, Purpose, TradeParams,
};
use shaper_exchange::{ExchangeError, PlaceOrderRequest, PlaceOutcome};
use shaper_telemetry::NotifyType;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on placements per iteration.
const MAX_PLACEMENTS_PER_TICK: usize = 5;
/// Lifetime draw floor, milliseconds.
const MIN_LIFETIME_MS: f64 = 1500.0;
/// Lifetime draw span per configured order, milliseconds.
const LIFETIME_SLOT_MS: f64 = 500.0;
/// Soft padding applied when a band edge lies outside the visible window.
const EDGE_PADDING_PERCENT: u32 = 5;

/// What one builder iteration did.
#[derive(Debug, Default, Clone)]
pub struct BuilderReport {
    pub expired_cancelled: usize,
    pub out_of_band_cancelled: usize,
    pub placed: usize,
    pub skipped_balance: usize,
    pub skipped_range: bool,
}

/// A fully drawn ob-order, ready to place.
#[derive(Debug)]
struct ObDraw {
    side: OrderSide,
    price: Price,
    amount: Amount,
    lifetime_ms: u64,
}

pub struct ObBuilder {
    ctx: Arc<EngineContext>,
    reconciler: Arc<Reconciler>,
    collector: Arc<OrderCollector>,
    watcher: Arc<PriceWatcher>,
}

impl ObBuilder {
    pub fn new(
        ctx: Arc<EngineContext>,
        reconciler: Arc<Reconciler>,
        collector: Arc<OrderCollector>,
        watcher: Arc<PriceWatcher>,
    ) -> Self {
        Self {
            ctx,
            reconciler,
            collector,
            watcher,
        }
    }

    /// One builder iteration.
    pub async fn tick(&self) -> EngineResult<BuilderReport> {
        let params = self.ctx.params.snapshot();
        let mut report = BuilderReport::default();

        // Reconcile-before-decide: the count below must reflect this tick
        self.reconciler.reconcile(Some(Purpose::Ob)).await;

        let expired = self
            .collector
            .collect(
                &CancelSelector::purposes(self.ctx.pair.clone(), vec![Purpose::Ob]).expired(),
                CloseCause::Expired,
                "ob expiry sweep",
            )
            .await?;
        report.expired_cancelled = expired.cancelled;

        let verdict = self.watcher.placement_range(&params);
        if let RangeVerdict::Band(low, high) = verdict {
            let out_of_band = self
                .collector
                .collect(
                    &CancelSelector::purposes(self.ctx.pair.clone(), vec![Purpose::Ob])
                        .with_price_filter(PriceFilter::Outside { low, high }),
                    CloseCause::OutOfPwRange,
                    "ob band sweep",
                )
                .await?;
            report.out_of_band_cancelled = out_of_band.cancelled;
        }
        if verdict == RangeVerdict::Blocked {
            debug!("Watcher range unavailable, ob placements blocked");
            report.skipped_range = true;
            return Ok(report);
        }

        let surviving = self
            .ctx
            .ledger
            .find_open(Some(Purpose::Ob), &self.ctx.pair)
            .len();
        let target = params.order_book_orders_count as usize;
        let to_place = target
            .saturating_sub(surviving)
            .min(MAX_PLACEMENTS_PER_TICK);
        if to_place == 0 {
            return Ok(report);
        }

        let book = self.ctx.books.get(&self.ctx.pair).await?;
        let market = match self.ctx.markets.get(&self.ctx.pair).await? {
            Some(market) => market,
            None => {
                warn!(pair = %self.ctx.pair, "Pair not listed, builder idle");
                return Ok(report);
            }
        };

        for _ in 0..to_place {
            let draw = match self.draw_order(&params, &book, &market, verdict) {
                Some(draw) => draw,
                None => continue,
            };
            if !self.balance_covers(&draw).await? {
                report.skipped_balance += 1;
                continue;
            }

            let request = PlaceOrderRequest {
                pair: self.ctx.pair.clone(),
                side: draw.side,
                price: Some(draw.price),
                base_amount: Some(draw.amount),
                quote_amount: None,
                is_limit: true,
            };
            match self.ctx.api.place_order(&request).await {
                Ok(PlaceOutcome::Placed { exchange_id }) => {
                    let mut order = Order::new_limit(
                        self.ctx.pair.clone(),
                        draw.side,
                        Purpose::Ob,
                        draw.price,
                        draw.amount,
                    )
                    .with_expiry(
                        Utc::now() + chrono::Duration::milliseconds(draw.lifetime_ms as i64),
                    );
                    order.mark_placed(exchange_id);
                    self.ctx.ledger.insert(order)?;
                    self.ctx.balances.invalidate();
                    report.placed += 1;
                }
                Ok(PlaceOutcome::Rejected { reason }) => {
                    debug!(%reason, "Ob placement rejected, skipping");
                }
                Err(ExchangeError::Transient(msg)) => {
                    // Abandon the tick; no ledger write happened
                    info!(%msg, "Transient placement failure, abandoning tick");
                    return Ok(report);
                }
                Err(e) => {
                    warn!(?e, "Ob placement failed");
                    return Ok(report);
                }
            }
        }

        debug!(
            placed = report.placed,
            expired = report.expired_cancelled,
            "Builder tick done"
        );
        Ok(report)
    }

    /// Draw side, book position, gap price, amount, and lifetime. All
    /// randomness happens here, before any suspension point.
    fn draw_order(
        &self,
        params: &TradeParams,
        book: &OrderBook,
        market: &MarketInfo,
        verdict: RangeVerdict,
    ) -> Option<ObDraw> {
        let mut rng = rand::thread_rng();

        let side = if rng.gen_bool(params.buy_probability()) {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        let levels = book.side(side);
        let height = levels.len().min(params.order_book_height as usize);
        // Position 1 (the best price) is never used
        if height < 2 {
            return None;
        }
        let position = rng.gen_range(2..=height);

        let tick = market.price_tick;
        let before = levels[position - 2].price;
        let at = levels[position - 1].price;
        let (gap_low, gap_high) = if before < at {
            (before + tick, at - tick)
        } else {
            (at + tick, before - tick)
        };
        let mut price = if gap_high < gap_low {
            // Gap under one tick: sit at the adjacent price
            at
        } else {
            uniform_price(&mut rng, gap_low, gap_high).round_to_tick(tick)
        };

        if let RangeVerdict::Band(band_low, band_high) = verdict {
            if price < band_low || price > band_high {
                price = self.resample_in_band(
                    &mut rng,
                    levels,
                    height,
                    band_low,
                    band_high,
                    tick,
                )?;
            }
        }

        let amount = {
            let low = params.min_amount;
            let mut high = Amount::new(
                params.max_amount.inner() * params.order_book_max_order_percent
                    / Decimal::from(100),
            );
            if high <= low {
                high = Amount::new(low.inner() * Decimal::new(11, 1));
            }
            Amount::new(uniform_decimal(&mut rng, low.inner(), high.inner()))
                .round_dp_down(market.base_decimals)
        };
        if !market.amount_in_range(amount) {
            return None;
        }

        let lifetime_ms = self.draw_lifetime(&mut rng, params, position);

        Some(ObDraw {
            side,
            price,
            amount,
            lifetime_ms,
        })
    }

    /// Pick a price inside the band, bounded by the visible window
    /// (softly padded when a band edge lies outside it).
    fn resample_in_band(
        &self,
        rng: &mut impl Rng,
        levels: &[shaper_core::BookLevel],
        height: usize,
        band_low: Price,
        band_high: Price,
        tick: Price,
    ) -> Option<Price> {
        let visible: Vec<Price> = levels[..height].iter().map(|l| l.price).collect();
        let visible_low = *visible.iter().min()?;
        let visible_high = *visible.iter().max()?;

        let pad = Decimal::from(EDGE_PADDING_PERCENT) / Decimal::from(100);
        let window_low = if band_low < visible_low {
            Price::new(visible_low.inner() * (Decimal::ONE - pad))
        } else {
            visible_low
        };
        let window_high = if band_high > visible_high {
            Price::new(visible_high.inner() * (Decimal::ONE + pad))
        } else {
            visible_high
        };

        let low = if band_low > window_low { band_low } else { window_low };
        let high = if band_high < window_high {
            band_high
        } else {
            window_high
        };
        if low > high {
            return None;
        }
        Some(uniform_price(rng, low, high).round_to_tick(tick).clamp_to(low, high))
    }

    /// `⌊U(1500, M·500) · ∛position⌋` ms, scaled down when the exchange
    /// caps simultaneous open orders below the configured count.
    fn draw_lifetime(&self, rng: &mut impl Rng, params: &TradeParams, position: usize) -> u64 {
        let target = params.order_book_orders_count.max(1) as f64;
        let span_high = (target * LIFETIME_SLOT_MS).max(MIN_LIFETIME_MS + 1.0);
        let base: f64 = rng.gen_range(MIN_LIFETIME_MS..span_high);
        let mut lifetime = base * (position as f64).cbrt();
        if let Some(limit) = self.ctx.api.features().order_number_limit {
            let limit = limit as f64;
            if target > limit {
                lifetime *= limit / target;
            }
        }
        lifetime.floor() as u64
    }

    /// Cached-snapshot balance pre-check with an hourly-throttled
    /// warning on shortfall.
    async fn balance_covers(&self, draw: &ObDraw) -> EngineResult<bool> {
        let snapshot = self.ctx.balances.get().await?;
        let (coin, needed) = match draw.side {
            OrderSide::Buy => (
                self.ctx.pair.quote.as_str(),
                draw.amount.inner() * draw.price.inner(),
            ),
            OrderSide::Sell => (self.ctx.pair.base.as_str(), draw.amount.inner()),
        };
        if snapshot.free(coin).inner() < needed {
            self.ctx.notifier.notify_throttled(
                "ob-balance",
                NotifyType::Warning,
                &format!("Order-book builder: not enough {coin} for a {needed} order"),
            );
            return Ok(false);
        }
        Ok(true)
    }
}

fn uniform_decimal(rng: &mut impl Rng, low: Decimal, high: Decimal) -> Decimal {
    if high <= low {
        return low;
    }
    let frac = Decimal::from_f64(rng.gen::<f64>()).unwrap_or_default();
    low + (high - low) * frac
}

fn uniform_price(rng: &mut impl Rng, low: Price, high: Price) -> Price {
    Price::new(uniform_decimal(rng, low.inner(), high.inner()))
}
