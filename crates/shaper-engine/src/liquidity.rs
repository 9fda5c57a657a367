//! Liquidity provider: standing bid/ask pools around a trend anchor.
//!
//! Keeps a configured sell pool (base units) and buy pool (quote units)
//! distributed inside the spread window. Each tick reconciles, drops
//! orders that left the window, and places the delta back.

use crate::collector::{CancelSelector, OrderCollector, PriceFilter};
use crate::error::EngineResult;
use crate::reconciler::Reconciler;
use crate::watcher::{PriceWatcher, RangeVerdict};
use crate::EngineContext;
use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use shaper_core::{
    Amount, CloseCause, LiquidityTrend, MarketInfo, Order, OrderSide, Price, Purpose,
};
use shaper_exchange::{ExchangeError, PlaceOrderRequest, PlaceOutcome};
use shaper_telemetry::NotifyType;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Standing amounts are split across this many orders per side.
const MIN_CHUNKS: u32 = 2;
const MAX_CHUNKS: u32 = 4;

/// What one provider iteration did.
#[derive(Debug, Default, Clone)]
pub struct LiquidityReport {
    pub cancelled: usize,
    pub placed: usize,
    pub sell_base_live: Amount,
    pub buy_quote_live: Amount,
}

/// One side's price window.
#[derive(Debug, Clone, Copy)]
struct Window {
    low: Price,
    high: Price,
}

pub struct LiquidityProvider {
    ctx: Arc<EngineContext>,
    reconciler: Arc<Reconciler>,
    collector: Arc<OrderCollector>,
    watcher: Arc<PriceWatcher>,
    /// Set by `enable liq` and policy changes; forces a full reseed.
    reseed: AtomicBool,
}

impl LiquidityProvider {
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
            reseed: AtomicBool::new(false),
        }
    }

    /// Drop the standing pools on the next tick and rebuild them.
    pub fn request_reseed(&self) {
        self.reseed.store(true, Ordering::SeqCst);
    }

    /// One provider iteration.
    pub async fn tick(&self) -> EngineResult<LiquidityReport> {
        let params = self.ctx.params.snapshot();
        let mut report = LiquidityReport::default();
        if !params.liq_active {
            return Ok(report);
        }

        self.reconciler.reconcile(Some(Purpose::Liq)).await;

        if self.reseed.swap(false, Ordering::SeqCst) {
            let cleared = self
                .collector
                .collect(
                    &CancelSelector::purposes(self.ctx.pair.clone(), vec![Purpose::Liq]),
                    CloseCause::UserCommand,
                    "liquidity reseed",
                )
                .await?;
            info!(cancelled = cleared.cancelled, "Liquidity pools reset");
            report.cancelled += cleared.cancelled;
        }

        let rates = self.ctx.api.get_rates(&self.ctx.pair).await?;
        let anchor = rates.mid();
        let (buy_window, sell_window) = windows(
            anchor,
            params.liquidity_spread_percent,
            params.liquidity_trend,
        );

        // Drop orders that drifted out of the current windows
        for (side, window) in [(OrderSide::Buy, buy_window), (OrderSide::Sell, sell_window)] {
            let swept = self
                .collector
                .collect(
                    &CancelSelector::purposes(self.ctx.pair.clone(), vec![Purpose::Liq])
                        .with_side(side)
                        .with_price_filter(PriceFilter::Outside {
                            low: window.low,
                            high: window.high,
                        }),
                    CloseCause::Expired,
                    "liquidity window sweep",
                )
                .await?;
            report.cancelled += swept.cancelled;
        }

        let market = match self.ctx.markets.get(&self.ctx.pair).await? {
            Some(market) => market,
            None => {
                warn!(pair = %self.ctx.pair, "Pair not listed, provider idle");
                return Ok(report);
            }
        };

        // Live totals after the sweeps
        let open = self.ctx.ledger.find_open(Some(Purpose::Liq), &self.ctx.pair);
        report.sell_base_live = open
            .iter()
            .filter(|o| o.side == OrderSide::Sell)
            .map(|o| o.base_remaining)
            .sum();
        report.buy_quote_live = open
            .iter()
            .filter(|o| o.side == OrderSide::Buy)
            .map(|o| o.quote_remaining)
            .sum();

        let sell_delta = params.liquidity_sell_amount.saturating_sub(report.sell_base_live);
        let buy_delta = params
            .liquidity_buy_quote_amount
            .saturating_sub(report.buy_quote_live);

        // Band gating: no placements without a usable range, and the
        // windows shrink to the band's intersection
        let (buy_window, sell_window) = match self.watcher.placement_range(&params) {
            RangeVerdict::Unrestricted => (Some(buy_window), Some(sell_window)),
            RangeVerdict::Band(low, high) => (
                intersect(buy_window, low, high),
                intersect(sell_window, low, high),
            ),
            RangeVerdict::Blocked => {
                debug!("Watcher range unavailable, liq placements blocked");
                return Ok(report);
            }
        };

        let draws = draw_placements(
            &market,
            sell_window,
            sell_delta,
            buy_window,
            buy_delta,
        );

        for (side, price, base) in draws {
            if !self.balance_covers(side, price, base).await? {
                continue;
            }
            let request = PlaceOrderRequest {
                pair: self.ctx.pair.clone(),
                side,
                price: Some(price),
                base_amount: Some(base),
                quote_amount: None,
                is_limit: true,
            };
            match self.ctx.api.place_order(&request).await {
                Ok(PlaceOutcome::Placed { exchange_id }) => {
                    let mut order = Order::new_limit(
                        self.ctx.pair.clone(),
                        side,
                        Purpose::Liq,
                        price,
                        base,
                    );
                    order.mark_placed(exchange_id);
                    self.ctx.ledger.insert(order)?;
                    self.ctx.balances.invalidate();
                    report.placed += 1;
                }
                Ok(PlaceOutcome::Rejected { reason }) => {
                    debug!(%reason, "Liq placement rejected, skipping");
                }
                Err(ExchangeError::Transient(msg)) => {
                    info!(%msg, "Transient placement failure, abandoning tick");
                    return Ok(report);
                }
                Err(e) => {
                    warn!(?e, "Liq placement failed");
                    return Ok(report);
                }
            }
        }

        debug!(
            placed = report.placed,
            cancelled = report.cancelled,
            "Provider tick done"
        );
        Ok(report)
    }

    async fn balance_covers(
        &self,
        side: OrderSide,
        price: Price,
        base: Amount,
    ) -> EngineResult<bool> {
        let snapshot = self.ctx.balances.get().await?;
        let (coin, needed) = match side {
            OrderSide::Buy => (self.ctx.pair.quote.as_str(), base.inner() * price.inner()),
            OrderSide::Sell => (self.ctx.pair.base.as_str(), base.inner()),
        };
        if snapshot.free(coin).inner() < needed {
            self.ctx.notifier.notify_throttled(
                "liq-balance",
                NotifyType::Warning,
                &format!("Liquidity provider: not enough {coin} for a {needed} order"),
            );
            return Ok(false);
        }
        Ok(true)
    }
}

/// Per-side spread windows around the anchor for a trend.
fn windows(
    anchor: Price,
    spread_percent: Decimal,
    trend: LiquidityTrend,
) -> (Window, Window) {
    let s = spread_percent / Decimal::from(100);
    let half = s / Decimal::TWO;
    let a = anchor.inner();
    let at = |f: Decimal| Price::new(a * (Decimal::ONE + f));

    match trend {
        // Both pools hug the anchor
        LiquidityTrend::Middle => (
            Window { low: at(-s), high: anchor },
            Window { low: anchor, high: at(s) },
        ),
        // Asks skewed higher, bids closer to the anchor
        LiquidityTrend::Uptrend => (
            Window { low: at(-half), high: anchor },
            Window { low: at(half), high: at(s) },
        ),
        // Symmetric opposite
        LiquidityTrend::Downtrend => (
            Window { low: at(-s), high: at(-half) },
            Window { low: anchor, high: at(half) },
        ),
    }
}

/// The window's overlap with the allowed band, if any.
fn intersect(window: Window, low: Price, high: Price) -> Option<Window> {
    let clipped = Window {
        low: if window.low > low { window.low } else { low },
        high: if window.high < high { window.high } else { high },
    };
    (clipped.low <= clipped.high).then_some(clipped)
}

/// Split each side's delta into 2..=4 randomized chunks with drawn
/// prices. All randomness happens before any suspension point.
fn draw_placements(
    market: &MarketInfo,
    sell_window: Option<Window>,
    sell_delta_base: Amount,
    buy_window: Option<Window>,
    buy_delta_quote: Amount,
) -> Vec<(OrderSide, Price, Amount)> {
    let mut rng = rand::thread_rng();
    let mut out = Vec::new();

    if let Some(window) = sell_window {
        for chunk in split_chunks(&mut rng, sell_delta_base.inner(), market.min_amount.inner()) {
            let price = draw_price(&mut rng, window, market.price_tick);
            let base = Amount::new(chunk).round_dp_down(market.base_decimals);
            if market.amount_in_range(base) {
                out.push((OrderSide::Sell, price, base));
            }
        }
    }

    if let Some(window) = buy_window {
        for chunk in split_chunks(&mut rng, buy_delta_quote.inner(), Decimal::ZERO) {
            let price = draw_price(&mut rng, window, market.price_tick);
            if price.is_zero() {
                continue;
            }
            let base = Amount::new(chunk / price.inner()).round_dp_down(market.base_decimals);
            if market.amount_in_range(base) {
                out.push((OrderSide::Buy, price, base));
            }
        }
    }
    out
}

fn split_chunks(rng: &mut impl Rng, total: Decimal, min_chunk: Decimal) -> Vec<Decimal> {
    if total <= Decimal::ZERO {
        return Vec::new();
    }
    let max_by_min = if min_chunk > Decimal::ZERO {
        (total / min_chunk)
            .floor()
            .min(Decimal::from(MAX_CHUNKS))
            .max(Decimal::ONE)
    } else {
        Decimal::from(MAX_CHUNKS)
    };
    let upper = max_by_min.to_u32().unwrap_or(1).max(1);
    if upper < MIN_CHUNKS {
        return vec![total];
    }
    let k = rng.gen_range(MIN_CHUNKS..=upper.min(MAX_CHUNKS));
    // Even split with ±20% jitter, remainder on the last chunk
    let even = total / Decimal::from(k);
    let mut chunks = Vec::with_capacity(k as usize);
    let mut used = Decimal::ZERO;
    for _ in 0..k - 1 {
        let jitter = Decimal::from_f64(rng.gen_range(0.8..1.2)).unwrap_or(Decimal::ONE);
        let chunk = even * jitter;
        chunks.push(chunk);
        used += chunk;
    }
    chunks.push(total - used);
    chunks
}

fn draw_price(rng: &mut impl Rng, window: Window, tick: Price) -> Price {
    let frac = Decimal::from_f64(rng.gen::<f64>()).unwrap_or_default();
    let raw = window.low.inner() + (window.high.inner() - window.low.inner()) * frac;
    let price = Price::new(raw).round_to_tick(tick);
    price.clamp_to(window.low, window.high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_ctx, pair, place_tracked};
    use rust_decimal_macros::dec;
    use shaper_core::TradeParams;
    use tempfile::TempDir;

    fn liq_params(trend: LiquidityTrend) -> TradeParams {
        TradeParams {
            is_active: true,
            liq_active: true,
            liquidity_sell_amount: Amount::new(dec!(100)),
            liquidity_buy_quote_amount: Amount::new(dec!(50)),
            liquidity_spread_percent: dec!(2),
            liquidity_trend: trend,
            min_amount: Amount::new(dec!(0.01)),
            ..TradeParams::default()
        }
    }

    fn provider(ctx: &Arc<EngineContext>) -> LiquidityProvider {
        let watcher = Arc::new(PriceWatcher::new(
            ctx,
            Arc::new(shaper_exchange::AdapterRegistry::new()),
            Arc::new(shaper_exchange::FixedRates::new()),
        ));
        LiquidityProvider::new(
            ctx.clone(),
            Arc::new(Reconciler::new(ctx.clone())),
            Arc::new(OrderCollector::new(ctx.clone())),
            watcher,
        )
    }

    #[tokio::test]
    async fn test_seeds_pools_uptrend() {
        let dir = TempDir::new().unwrap();
        let (ctx, paper) = make_ctx(&dir, liq_params(LiquidityTrend::Uptrend));
        paper.seed_flat_book(&pair(), dec!(100), dec!(0.0001), 5, dec!(10));
        paper.set_balance("ADM", Amount::new(dec!(500)));
        paper.set_balance("USDT", Amount::new(dec!(5000)));

        let report = provider(&ctx).tick().await.unwrap();
        assert!(report.placed >= 4, "placed {}", report.placed);

        let open = ctx.ledger.find_open(Some(Purpose::Liq), &pair());
        let sells: Vec<_> = open.iter().filter(|o| o.side == OrderSide::Sell).collect();
        let buys: Vec<_> = open.iter().filter(|o| o.side == OrderSide::Buy).collect();
        assert!(sells.len() >= 2);
        assert!(buys.len() >= 2);

        // Pool totals within 5% of the configured budgets
        let sell_base: Amount = sells.iter().map(|o| o.base_amount).sum();
        assert!(sell_base.inner() >= dec!(95), "sell pool {sell_base}");
        let buy_quote: Amount = buys.iter().map(|o| o.quote_amount).sum();
        assert!(buy_quote.inner() >= dec!(47.5), "buy pool {buy_quote}");

        // Anchor is the seeded mid (100); uptrend skews asks higher
        for sell in &sells {
            let p = sell.price.unwrap().inner();
            assert!(p >= dec!(101) && p <= dec!(102), "ask at {p}");
        }
        for buy in &buys {
            let p = buy.price.unwrap().inner();
            assert!(p >= dec!(99) && p <= dec!(100), "bid at {p}");
        }
    }

    #[tokio::test]
    async fn test_out_of_window_orders_swept() {
        let dir = TempDir::new().unwrap();
        let (ctx, paper) = make_ctx(&dir, liq_params(LiquidityTrend::Middle));
        paper.seed_flat_book(&pair(), dec!(100), dec!(0.0001), 5, dec!(10));
        paper.set_balance("ADM", Amount::new(dec!(500)));
        paper.set_balance("USDT", Amount::new(dec!(5000)));

        // A liq ask stranded far above the 2% window
        let (stray_id, _) =
            place_tracked(&ctx, &paper, Purpose::Liq, OrderSide::Sell, dec!(110), dec!(5)).await;

        let report = provider(&ctx).tick().await.unwrap();

        assert!(report.cancelled >= 1);
        let stray = ctx.ledger.find_by_id(&stray_id).unwrap();
        assert!(stray.closed);
        assert_eq!(stray.close_cause, Some(CloseCause::Expired));
    }

    #[tokio::test]
    async fn test_reseed_drops_and_rebuilds() {
        let dir = TempDir::new().unwrap();
        let (ctx, paper) = make_ctx(&dir, liq_params(LiquidityTrend::Middle));
        paper.seed_flat_book(&pair(), dec!(100), dec!(0.0001), 5, dec!(10));
        paper.set_balance("ADM", Amount::new(dec!(500)));
        paper.set_balance("USDT", Amount::new(dec!(5000)));

        let provider = provider(&ctx);
        provider.tick().await.unwrap();
        let before: Vec<_> = ctx
            .ledger
            .find_open(Some(Purpose::Liq), &pair())
            .iter()
            .map(|o| o.id.clone())
            .collect();
        assert!(!before.is_empty());

        provider.request_reseed();
        provider.tick().await.unwrap();

        // Old pool rows are closed, a fresh pool stands
        for id in &before {
            assert!(ctx.ledger.find_by_id(id).unwrap().closed);
        }
        assert!(!ctx.ledger.find_open(Some(Purpose::Liq), &pair()).is_empty());
    }

    #[tokio::test]
    async fn test_band_narrows_windows() {
        let dir = TempDir::new().unwrap();
        let mut params = liq_params(LiquidityTrend::Middle);
        params.pw_active = true;
        params.pw_source = Some(shaper_core::PwSourceSpec::Range {
            low: dec!(99),
            high: dec!(101),
            coin: "USD".into(),
        });
        let (ctx, paper) = make_ctx(&dir, params);
        paper.seed_flat_book(&pair(), dec!(100), dec!(0.0001), 5, dec!(10));
        paper.set_balance("ADM", Amount::new(dec!(500)));
        paper.set_balance("USDT", Amount::new(dec!(5000)));

        let rates = Arc::new(shaper_exchange::FixedRates::new());
        rates.set_usd_price("USDT", dec!(1));
        let watcher = Arc::new(PriceWatcher::new(
            &ctx,
            Arc::new(shaper_exchange::AdapterRegistry::new()),
            rates,
        ));
        watcher.tick().await;

        let provider = LiquidityProvider::new(
            ctx.clone(),
            Arc::new(Reconciler::new(ctx.clone())),
            Arc::new(OrderCollector::new(ctx.clone())),
            watcher,
        );
        provider.tick().await.unwrap();

        // Spread windows are 98..102 but the band narrows them to 99..101
        for order in ctx.ledger.find_open(Some(Purpose::Liq), &pair()) {
            let p = order.price.unwrap().inner();
            assert!(p >= dec!(99) && p <= dec!(101), "price {p} escaped the band");
        }
    }

    #[tokio::test]
    async fn test_inactive_provider_is_idle() {
        let dir = TempDir::new().unwrap();
        let mut params = liq_params(LiquidityTrend::Middle);
        params.liq_active = false;
        let (ctx, paper) = make_ctx(&dir, params);
        paper.seed_flat_book(&pair(), dec!(100), dec!(0.0001), 5, dec!(10));

        let report = provider(&ctx).tick().await.unwrap();
        assert_eq!(report.placed, 0);
        assert!(ctx.ledger.is_empty());
    }

    #[test]
    fn test_windows_by_trend() {
        let anchor = Price::new(dec!(100));
        let (buy, sell) = windows(anchor, dec!(2), LiquidityTrend::Middle);
        assert_eq!(buy.low.inner(), dec!(98));
        assert_eq!(buy.high.inner(), dec!(100));
        assert_eq!(sell.low.inner(), dec!(100));
        assert_eq!(sell.high.inner(), dec!(102));

        let (buy, sell) = windows(anchor, dec!(2), LiquidityTrend::Uptrend);
        assert_eq!(buy.low.inner(), dec!(99));
        assert_eq!(sell.low.inner(), dec!(101));
        assert_eq!(sell.high.inner(), dec!(102));

        let (buy, sell) = windows(anchor, dec!(2), LiquidityTrend::Downtrend);
        assert_eq!(buy.low.inner(), dec!(98));
        assert_eq!(buy.high.inner(), dec!(99));
        assert_eq!(sell.high.inner(), dec!(101));
    }

    #[test]
    fn test_split_chunks_conserves_total() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let chunks = split_chunks(&mut rng, dec!(100), dec!(1));
            let total: Decimal = chunks.iter().sum();
            assert_eq!(total, dec!(100));
            assert!(chunks.len() >= 2 && chunks.len() <= 4);
        }
        // Tiny totals collapse to a single chunk
        assert_eq!(split_chunks(&mut rng, dec!(1.5), dec!(1)), vec![dec!(1.5)]);
        assert!(split_chunks(&mut rng, dec!(0), dec!(1)).is_empty());
    }
}
