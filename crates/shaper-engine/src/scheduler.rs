//! Scheduler/supervisor for the background maker loops.
//!
//! Owns the tick loops for the builder, the liquidity provider, and the
//! price watcher. Each loop checks the activity flag and the policy
//! gate, skips when the previous iteration is still in flight, and
//! draws the next tick delay uniformly from the configured interval.
//! Flipping the activity flag off never cancels an in-flight tick; it
//! only prevents further iterations from starting.

use crate::builder::ObBuilder;
use crate::collector::{CancelSelector, OrderCollector, PriceFilter, TargetPurpose};
use crate::liquidity::LiquidityProvider;
use crate::pricemaker::PriceMaker;
use crate::watcher::PriceWatcher;
use crate::EngineContext;
use rand::Rng;
use shaper_core::{CloseCause, MmPolicy, PwAction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Builder tick delay bounds, milliseconds.
const BUILDER_TICK_MS: (u64, u64) = (1500, 3000);
/// Watcher tick delay bounds, milliseconds.
const WATCHER_TICK_MS: (u64, u64) = (1000, 3000);

/// Per-component re-entrancy guard.
///
/// `try_enter` hands out at most one token at a time; the token clears
/// the guard on drop, so no two iterations of the same component can
/// overlap even if a tick outlives its scheduling slot.
#[derive(Debug, Default)]
pub struct IterationGuard {
    running: AtomicBool,
}

pub struct IterationToken<'a> {
    guard: &'a IterationGuard,
}

impl IterationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_enter(&self) -> Option<IterationToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| IterationToken { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for IterationToken<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    ctx: Arc<EngineContext>,
    builder: Arc<ObBuilder>,
    provider: Arc<LiquidityProvider>,
    watcher: Arc<PriceWatcher>,
    collector: Arc<OrderCollector>,
    maker: Arc<PriceMaker>,
    builder_guard: IterationGuard,
    provider_guard: IterationGuard,
    watcher_guard: IterationGuard,
    shutdown: AtomicBool,
}

impl Scheduler {
    pub fn new(
        ctx: Arc<EngineContext>,
        builder: Arc<ObBuilder>,
        provider: Arc<LiquidityProvider>,
        watcher: Arc<PriceWatcher>,
        collector: Arc<OrderCollector>,
        maker: Arc<PriceMaker>,
    ) -> Self {
        Self {
            ctx,
            builder,
            provider,
            watcher,
            collector,
            maker,
            builder_guard: IterationGuard::new(),
            provider_guard: IterationGuard::new(),
            watcher_guard: IterationGuard::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Stop scheduling further iterations. In-flight ticks finish.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Spawn the three background loops.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(self).builder_loop()),
            tokio::spawn(Arc::clone(self).provider_loop()),
            tokio::spawn(Arc::clone(self).watcher_loop()),
        ]
    }

    fn draw_delay(bounds: (u64, u64)) -> Duration {
        let ms = rand::thread_rng().gen_range(bounds.0..=bounds.1);
        Duration::from_millis(ms)
    }

    async fn builder_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(Self::draw_delay(BUILDER_TICK_MS)).await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let params = self.ctx.params.snapshot();
            // Volume-generating corrections run only under the regular
            // policy set
            if !(params.is_active && params.policy.is_regular() && params.ob_active) {
                trace!("Builder gated off, skipping tick");
                continue;
            }
            match self.builder_guard.try_enter() {
                Some(_token) => {
                    if let Err(e) = self.builder.tick().await {
                        warn!(?e, "Builder tick failed");
                    }
                }
                None => debug!("Previous builder iteration still running, skipping"),
            }
        }
    }

    async fn provider_loop(self: Arc<Self>) {
        loop {
            let params = self.ctx.params.snapshot();
            let bounds = (
                params.min_interval_sec.max(1) * 1000,
                params.max_interval_sec.max(params.min_interval_sec.max(1)) * 1000,
            );
            tokio::time::sleep(Self::draw_delay(bounds)).await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let params = self.ctx.params.snapshot();
            // The provider runs under every policy, including `depth`
            if !(params.is_active && params.liq_active) {
                trace!("Provider gated off, skipping tick");
                continue;
            }
            match self.provider_guard.try_enter() {
                Some(_token) => {
                    if let Err(e) = self.provider.tick().await {
                        warn!(?e, "Provider tick failed");
                    }
                }
                None => debug!("Previous provider iteration still running, skipping"),
            }
        }
    }

    async fn watcher_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(Self::draw_delay(WATCHER_TICK_MS)).await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let params = self.ctx.params.snapshot();
            if !params.pw_active {
                continue;
            }
            match self.watcher_guard.try_enter() {
                Some(_token) => {
                    self.watcher.tick().await;
                    if let Err(e) = self.defend_band().await {
                        warn!(?e, "Band defense failed");
                    }
                }
                None => debug!("Previous watcher iteration still running, skipping"),
            }
        }
    }

    /// When the traded price escapes the band: `fill` pushes it back
    /// with a pm-order, `prevent` cancels out-of-band orders.
    async fn defend_band(&self) -> crate::EngineResult<()> {
        let params = self.ctx.params.snapshot();
        let rates = self.ctx.api.get_rates(&self.ctx.pair).await?;
        let target = match self.watcher.band_breach(rates.last) {
            Some(target) => target,
            None => return Ok(()),
        };

        match params.pw_action {
            PwAction::Fill => {
                // Price-moving corrections only under the optimal policy
                if params.is_active && params.policy == MmPolicy::Optimal {
                    let report = self.maker.make_price(target).await?;
                    debug!(price = %report.price, amount = %report.amount, "Band defense pm-order");
                }
            }
            PwAction::Prevent => {
                if let Some(state) = self.watcher.snapshot() {
                    self.collector
                        .collect(
                            &CancelSelector {
                                target: TargetPurpose::All,
                                pair: self.ctx.pair.clone(),
                                side: None,
                                price_filter: Some(PriceFilter::Outside {
                                    low: state.low,
                                    high: state.high,
                                }),
                                expired_only: false,
                                force: false,
                            },
                            CloseCause::OutOfPwRange,
                            "pw prevent",
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_guard_single_token() {
        let guard = IterationGuard::new();
        let token = guard.try_enter().expect("first entry");
        assert!(guard.is_running());
        // No second token while the first is live
        assert!(guard.try_enter().is_none());
        drop(token);
        assert!(!guard.is_running());
        assert!(guard.try_enter().is_some());
    }

    #[tokio::test]
    async fn test_guard_prevents_overlap_across_tasks() {
        let guard = Arc::new(IterationGuard::new());
        let entered = Arc::new(AtomicBool::new(false));

        let g = guard.clone();
        let e = entered.clone();
        let handle = tokio::spawn(async move {
            let _token = g.try_enter().unwrap();
            e.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        // Wait for the task to take the token
        while !entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(guard.try_enter().is_none());
        handle.await.unwrap();
        assert!(guard.try_enter().is_some());
    }
}
