//! Position Controller (§4.9): the per-position reaction to market data,
//! fills, operator edits, and operator close. Every method here is expected
//! to run from inside that position's Operation Serializer slot (wired up
//! in `operator.rs`), so it can read-modify-write the stored `Position`
//! without racing itself.

use crate::book::metrics::DerivedMetrics;
use crate::config::CoreConfig;
use crate::gateway::OrderGateway;
use crate::ids::{OrderId, PositionId};
use crate::monitor::MarketMonitor;
use crate::odds::{apply_premium, quantize_to_ladder};
use crate::position::model::{OrderStatus, Position, PositionPatch, PositionStatus, Side};
use crate::position::store::PositionStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PositionController {
    store: Arc<PositionStore>,
    gateway: Arc<dyn OrderGateway>,
    monitor: Arc<MarketMonitor>,
    config: Arc<CoreConfig>,
}

impl PositionController {
    pub fn new(
        store: Arc<PositionStore>,
        gateway: Arc<dyn OrderGateway>,
        monitor: Arc<MarketMonitor>,
        config: Arc<CoreConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            gateway,
            monitor,
            config,
        })
    }

    /// Event: `MarketDataEvent`. Steps 1-8 of §4.9.
    pub async fn on_market_data(&self, position_id: PositionId, metrics: DerivedMetrics) {
        let Some(before) = self.store.get(&position_id) else {
            return;
        };
        if before.status.is_terminal() {
            return;
        }

        self.store.mutate(&position_id, |p| {
            p.last_best_taker_odds = metrics.best_taker_odds;
        });

        let risk = self.breaches_risk(&before, &metrics);

        if risk != before.risk_breached {
            if risk {
                self.transition_to_risk_paused(position_id).await;
                return;
            } else {
                self.store.mutate(&position_id, |p| {
                    p.risk_breached = false;
                    p.status = PositionStatus::Active;
                });
            }
        }

        let Some(position) = self.store.get(&position_id) else {
            return;
        };
        if position.risk_breached || position.status.is_terminal() {
            return;
        }

        let Some(best_taker_odds) = metrics.best_taker_odds else {
            self.cancel_active_order(position_id).await;
            return;
        };

        if !self.rate_limit_elapsed(&position) {
            return;
        }

        self.ensure_order_current(position_id, best_taker_odds).await;
    }

    /// Event: `FillEvent`. `order_id` has already been attributed to this
    /// position by the Market Monitor (via its active order or the
    /// recently-cancelled map), so this just applies the new filled stake.
    pub async fn on_fill(&self, position_id: PositionId, _order_id: OrderId, new_filled_stake: u64) {
        let applied = self
            .store
            .mutate(&position_id, |p| {
                p.filled_stake = p.filled_stake.max(new_filled_stake);
            })
            .is_some();
        if !applied {
            return;
        }

        let Some(position) = self.store.get(&position_id) else {
            return;
        };
        if position.status.is_terminal() {
            return;
        }

        if position.is_complete(self.config.complete_fraction) {
            self.complete_position(position_id).await;
            return;
        }

        // Fall through into "ensure order current" using the position's
        // own cached market snapshot, since a fill alone carries no new
        // metrics.
        if let Some(best) = position.last_best_taker_odds {
            self.ensure_order_current(position_id, best).await;
        }
    }

    /// Event: `OperatorEditEvent`.
    pub async fn on_operator_edit(&self, position_id: PositionId, patch: PositionPatch) {
        let Some(_) = self.store.mutate(&position_id, |p| p.apply_patch(patch)) else {
            return;
        };
        let Some(position) = self.store.get(&position_id) else {
            return;
        };
        if position.status.is_terminal() {
            return;
        }
        if let Some(best) = position.last_best_taker_odds {
            self.ensure_order_current(position_id, best).await;
        }
    }

    /// Event: `OperatorCloseEvent`.
    pub async fn on_operator_close(&self, position_id: PositionId) {
        self.cancel_active_order(position_id).await;
        self.monitor.detach(position_id);
        self.store.mutate(&position_id, |p| {
            p.status = PositionStatus::Closed;
            p.closed_at = Some(Utc::now());
        });
        self.store.remove(&position_id);
    }

    /// §4.9 step 2: `risk = (vig != null && vig > maxVig) OR liquidity[A] <
    /// minLiquidity OR liquidity[B] < minLiquidity`. A missing `vig`
    /// contributes `false`, not a breach; both sides' liquidity are checked
    /// unconditionally, not just the side this position would quote into.
    fn breaches_risk(&self, position: &Position, metrics: &DerivedMetrics) -> bool {
        let vig_breach = matches!(metrics.vig, Some(v) if v > position.max_vig);
        let liquidity_breach =
            metrics.liquidity.a < position.min_liquidity || metrics.liquidity.b < position.min_liquidity;
        vig_breach || liquidity_breach
    }

    async fn transition_to_risk_paused(&self, position_id: PositionId) {
        if let Some(order_id) = self.store.get(&position_id).and_then(|p| p.active_order_id) {
            let _ = self.cancel_order(position_id, order_id).await;
        }
        self.store.mutate(&position_id, |p| {
            p.risk_breached = true;
            p.status = PositionStatus::RiskPaused;
        });
    }

    async fn complete_position(&self, position_id: PositionId) {
        if let Some(order_id) = self.store.get(&position_id).and_then(|p| p.active_order_id) {
            let _ = self.cancel_order(position_id, order_id).await;
        }
        self.store.mutate(&position_id, |p| {
            p.status = PositionStatus::Completed;
        });
    }

    fn rate_limit_elapsed(&self, position: &Position) -> bool {
        match position.last_order_action_at {
            None => true,
            Some(last) => {
                let elapsed = Utc::now().signed_duration_since(last);
                elapsed.to_std().unwrap_or_default() >= self.config.min_order_update_interval
            }
        }
    }

    /// Steps 7-8 of §4.9: compute the desired maker odds and repost if the
    /// active order (if any) no longer matches it.
    async fn ensure_order_current(&self, position_id: PositionId, best_taker_odds: u64) {
        let desired = match apply_premium(
            best_taker_odds,
            self.store.get(&position_id).map(|p| p.premium_bps).unwrap_or(0),
            self.config.ladder_step,
            self.config.odds_unit,
        ) {
            Ok(Some(odds)) => odds,
            Ok(None) => {
                self.cancel_active_order(position_id).await;
                return;
            }
            Err(e) => {
                warn!(position = %position_id, error = %e, "failed to compute desired maker odds");
                self.cancel_active_order(position_id).await;
                return;
            }
        };

        let Some(position) = self.store.get(&position_id) else {
            return;
        };

        let needs_repost = position.active_order_id.is_none() || position.last_quoted_maker_odds != Some(desired);
        if !needs_repost {
            return;
        }

        if let Some(order_id) = position.active_order_id {
            // §4.9 step 8 / Failure semantics: a zero-cancelled result means
            // the order was already filled or gone at the venue. Give the
            // corresponding fill event a moment to land, then re-fetch
            // `filled_stake` before sizing a repost off of it.
            if self.cancel_order(position_id, order_id).await {
                tokio::time::sleep(self.config.zero_cancel_recheck_delay).await;
            }
        }

        let Some(position) = self.store.get(&position_id) else {
            return;
        };
        if position.status.is_terminal() {
            return;
        }

        let remaining = position.max_stake.saturating_sub(position.filled_stake);
        if remaining == 0 {
            self.complete_position(position_id).await;
            return;
        }

        if let Err(e) = quantize_to_ladder(desired, self.config.ladder_step, self.config.odds_unit) {
            warn!(position = %position_id, error = %e, "desired odds failed final ladder check");
            return;
        }

        match self
            .gateway
            .post_maker_order(&position.market_id, position.chosen_side, remaining, desired)
            .await
        {
            Ok(order_id) => {
                self.store.mutate(&position_id, |p| {
                    p.active_order_id = Some(order_id);
                    p.last_quoted_maker_odds = Some(desired);
                    p.order_status = OrderStatus::Active;
                    p.last_order_action_at = Some(Utc::now());
                    if p.status == PositionStatus::Created || p.status == PositionStatus::Initializing {
                        p.status = PositionStatus::Active;
                    }
                });
            }
            Err(e) => {
                warn!(position = %position_id, error = %e, "post_maker_order failed after retries");
                self.store.mutate(&position_id, |p| {
                    p.order_status = OrderStatus::Error;
                    p.active_order_id = None;
                });
            }
        }
    }

    async fn cancel_active_order(&self, position_id: PositionId) {
        if let Some(order_id) = self.store.get(&position_id).and_then(|p| p.active_order_id) {
            let _ = self.cancel_order(position_id, order_id).await;
        }
    }

    /// Cancels `order_id` and returns whether the gateway cancelled nothing
    /// (the order was already filled or gone at the venue).
    async fn cancel_order(&self, position_id: PositionId, order_id: OrderId) -> bool {
        self.monitor.note_cancelled(order_id.clone(), position_id);
        let outcome = self.gateway.cancel_orders(&[order_id.clone()]).await;

        self.store.mutate(&position_id, |p| {
            if p.active_order_id.as_ref() == Some(&order_id) {
                p.active_order_id = None;
                p.order_status = OrderStatus::Cancelled;
                p.last_order_action_at = Some(Utc::now());
            }
        });

        let zero_cancelled = outcome.cancelled_count() == 0;
        if zero_cancelled {
            info!(position = %position_id, order = %order_id, "cancel returned zero; order is filled or already gone, relying on fill event");
        }
        zero_cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::mirror::MakerOrder;
    use crate::book::metrics::SideLiquidity;
    use crate::gateway::{PaperGatewayConfig, PaperOrderGateway};
    use crate::ids::MarketId;
    use crate::position::model::{Position, PositionSpec};
    use futures_util::future::BoxFuture;
    use std::time::Duration;

    struct DummyTransport;

    #[async_trait::async_trait]
    impl crate::transport::Transport for DummyTransport {
        async fn fetch_snapshot(&self, _market_id: &MarketId) -> Result<Vec<MakerOrder>, crate::errors::CoreError> {
            Ok(vec![])
        }
        fn subscribe(&self, _market_id: MarketId, _handler: crate::transport::DeltaHandler) -> crate::transport::Subscription {
            crate::transport::Subscription::new(Arc::new(std::sync::atomic::AtomicBool::new(false)))
        }
    }

    fn no_op_market_data() -> crate::monitor::MarketDataHandler {
        Arc::new(|_pid, _metrics| -> BoxFuture<'static, ()> { Box::pin(async {}) })
    }

    fn no_op_fill() -> crate::monitor::FillHandler {
        Arc::new(|_pid, _oid, _stake| -> BoxFuture<'static, ()> { Box::pin(async {}) })
    }

    fn harness() -> (Arc<PositionController>, Arc<PositionStore>, PositionId) {
        let store = Arc::new(PositionStore::new());
        let config = Arc::new(CoreConfig {
            min_order_update_interval: Duration::from_millis(0),
            ..CoreConfig::default()
        });
        let monitor = MarketMonitor::new(
            Arc::new(DummyTransport),
            crate::ids::MakerId::new("self"),
            store.clone(),
            Arc::new(crate::serializer::OperationSerializer::new()),
            config.clone(),
            no_op_market_data(),
            no_op_fill(),
        );
        let gateway = Arc::new(PaperOrderGateway::new(PaperGatewayConfig {
            base_latency: Duration::from_millis(1),
            latency_jitter: Duration::from_millis(1),
            ..Default::default()
        }));
        let controller = PositionController::new(store.clone(), gateway, monitor, config);

        let id = PositionId::new();
        let spec = PositionSpec {
            market_id: MarketId::new("m1"),
            chosen_side: Side::A,
            max_stake: 1_000,
            premium_bps: 1_000,
            max_vig: 50_000,
            min_liquidity: 10,
            min_for_odds: 10,
            min_for_vig: 10,
        };
        store.insert(Position::new(id, spec));
        (controller, store, id)
    }

    fn metrics(best_taker_odds: u64, vig: i128, liquidity: u64) -> DerivedMetrics {
        DerivedMetrics {
            best_taker_odds: Some(best_taker_odds),
            vig: Some(vig),
            liquidity: SideLiquidity { a: liquidity, b: liquidity },
        }
    }

    #[tokio::test]
    async fn posts_a_maker_order_on_first_quote() {
        let (controller, store, id) = harness();
        controller.on_market_data(id, metrics(400_000, 0, 100)).await;

        let position = store.get(&id).unwrap();
        assert!(position.active_order_id.is_some());
        assert_eq!(position.last_quoted_maker_odds, Some(360_000));
    }

    #[tokio::test]
    async fn does_not_repost_when_best_taker_odds_is_unchanged() {
        let (controller, store, id) = harness();
        controller.on_market_data(id, metrics(400_000, 0, 100)).await;
        let first_order = store.get(&id).unwrap().active_order_id;

        controller.on_market_data(id, metrics(400_000, 0, 100)).await;
        let second_order = store.get(&id).unwrap().active_order_id;

        assert_eq!(first_order, second_order);
    }

    #[tokio::test]
    async fn reposts_when_the_market_moves() {
        let (controller, store, id) = harness();
        controller.on_market_data(id, metrics(400_000, 0, 100)).await;
        let first_order = store.get(&id).unwrap().active_order_id;

        controller.on_market_data(id, metrics(500_000, 0, 100)).await;
        let position = store.get(&id).unwrap();

        assert_ne!(position.active_order_id, first_order);
        assert_eq!(position.last_quoted_maker_odds, Some(450_000));
    }

    #[tokio::test]
    async fn vig_breach_cancels_and_pauses() {
        let (controller, store, id) = harness();
        controller.on_market_data(id, metrics(400_000, 0, 100)).await;
        assert!(store.get(&id).unwrap().active_order_id.is_some());

        controller.on_market_data(id, metrics(400_000, 100_000, 100)).await;
        let position = store.get(&id).unwrap();

        assert!(position.active_order_id.is_none());
        assert_eq!(position.status, PositionStatus::RiskPaused);
        assert!(position.risk_breached);
    }

    #[tokio::test]
    async fn recovers_from_risk_pause_once_vig_is_back_in_bounds() {
        let (controller, store, id) = harness();
        controller.on_market_data(id, metrics(400_000, 100_000, 100)).await;
        assert_eq!(store.get(&id).unwrap().status, PositionStatus::RiskPaused);

        controller.on_market_data(id, metrics(400_000, 0, 100)).await;
        let position = store.get(&id).unwrap();

        assert_eq!(position.status, PositionStatus::Active);
        assert!(!position.risk_breached);
        assert!(position.active_order_id.is_some());
    }

    #[tokio::test]
    async fn liquidity_below_minimum_is_also_a_risk_breach() {
        let (controller, store, id) = harness();
        controller.on_market_data(id, metrics(400_000, 0, 1)).await;
        let position = store.get(&id).unwrap();

        assert_eq!(position.status, PositionStatus::RiskPaused);
    }

    #[tokio::test]
    async fn fill_reaching_complete_fraction_closes_out_the_order() {
        let (controller, store, id) = harness();
        controller.on_market_data(id, metrics(400_000, 0, 100)).await;
        let order_id = store.get(&id).unwrap().active_order_id.unwrap();

        controller.on_fill(id, order_id, 999).await;
        let position = store.get(&id).unwrap();

        assert_eq!(position.status, PositionStatus::Completed);
        assert!(position.active_order_id.is_none());
    }

    #[tokio::test]
    async fn partial_fill_does_not_reprice_or_repost_the_resting_order() {
        let (controller, store, id) = harness();
        controller.on_market_data(id, metrics(400_000, 0, 100)).await;
        let first_order = store.get(&id).unwrap().active_order_id;

        controller.on_fill(id, first_order.clone().unwrap(), 100).await;
        let position = store.get(&id).unwrap();

        assert_eq!(position.active_order_id, first_order);
        assert_eq!(position.last_quoted_maker_odds, Some(360_000));
        assert_eq!(position.filled_stake, 100);
    }

    #[tokio::test]
    async fn operator_close_cancels_and_removes_the_position() {
        let (controller, store, id) = harness();
        controller.on_market_data(id, metrics(400_000, 0, 100)).await;

        controller.on_operator_close(id).await;

        assert!(store.get(&id).is_none());
    }

    #[tokio::test]
    async fn missing_best_taker_odds_cancels_the_resting_order() {
        let (controller, store, id) = harness();
        controller.on_market_data(id, metrics(400_000, 0, 100)).await;
        assert!(store.get(&id).unwrap().active_order_id.is_some());

        controller
            .on_market_data(
                id,
                DerivedMetrics {
                    best_taker_odds: None,
                    vig: Some(0),
                    liquidity: SideLiquidity { a: 100, b: 100 },
                },
            )
            .await;

        let position = store.get(&id).unwrap();
        assert!(position.active_order_id.is_none());
    }
}
