//! In-memory simulated venue, grounded on `PaperExecutionAdapter`: adds
//! latency and a configurable rejection probability, then accepts the order
//! as resting (no fills — fills arrive separately via whatever drives the
//! test's mirror deltas). Used for `--paper` mode and in scenario tests.

use crate::errors::CoreError;
use crate::gateway::types::{CancelOutcome, OrderGateway};
use crate::ids::{MarketId, OrderId};
use crate::odds::assert_ladder_valid;
use crate::position::model::Side;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PaperGatewayConfig {
    pub base_latency: Duration,
    pub latency_jitter: Duration,
    pub reject_prob: f64,
    pub ladder_step: u64,
    pub odds_unit: u64,
}

impl Default for PaperGatewayConfig {
    fn default() -> Self {
        Self {
            base_latency: Duration::from_millis(50),
            latency_jitter: Duration::from_millis(50),
            reject_prob: 0.0,
            ladder_step: 1_000,
            odds_unit: 1_000_000,
        }
    }
}

pub struct PaperOrderGateway {
    config: PaperGatewayConfig,
    resting: Mutex<HashSet<OrderId>>,
}

impl PaperOrderGateway {
    pub fn new(config: PaperGatewayConfig) -> Self {
        Self {
            config,
            resting: Mutex::new(HashSet::new()),
        }
    }

    /// Whether an order id is still considered live at the simulated venue.
    pub fn is_resting(&self, order_id: &OrderId) -> bool {
        self.resting.lock().contains(order_id)
    }
}

#[async_trait]
impl OrderGateway for PaperOrderGateway {
    async fn post_maker_order(
        &self,
        _market_id: &MarketId,
        _side: Side,
        _stake_wire: u64,
        odds_wire: u64,
    ) -> Result<OrderId, CoreError> {
        assert_ladder_valid(odds_wire, self.config.ladder_step, self.config.odds_unit)?;

        let mut rng = StdRng::from_entropy();
        let jitter_ms = rng.gen_range(0..=self.config.latency_jitter.as_millis() as u64);
        tokio::time::sleep(self.config.base_latency + Duration::from_millis(jitter_ms)).await;

        if rng.gen::<f64>() < self.config.reject_prob {
            return Err(CoreError::OrderRejected {
                reason: "simulated rejection".to_string(),
            });
        }

        let order_id = OrderId::new(format!("paper-{}", Uuid::new_v4()));
        self.resting.lock().insert(order_id.clone());
        Ok(order_id)
    }

    async fn cancel_orders(&self, order_ids: &[OrderId]) -> CancelOutcome {
        let mut outcome = CancelOutcome::default();
        let mut resting = self.resting.lock();
        for order_id in order_ids {
            if resting.remove(order_id) {
                outcome.cancelled.push(order_id.clone());
            }
            // Already gone (filled or never posted): neither cancelled nor
            // failed, matching `HttpOrderGateway`'s `OrderGone` handling.
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn post_then_cancel_round_trip() {
        let gw = PaperOrderGateway::new(PaperGatewayConfig {
            base_latency: Duration::from_millis(1),
            latency_jitter: Duration::from_millis(1),
            ..Default::default()
        });
        let id = gw
            .post_maker_order(&MarketId::new("m1"), Side::A, 100, 360_000)
            .await
            .unwrap();
        assert!(gw.is_resting(&id));
        let outcome = gw.cancel_orders(&[id.clone()]).await;
        assert_eq!(outcome.cancelled_count(), 1);
        assert!(!gw.is_resting(&id));
    }

    #[tokio::test]
    async fn rejects_off_ladder_odds() {
        let gw = PaperOrderGateway::new(PaperGatewayConfig {
            base_latency: Duration::from_millis(1),
            latency_jitter: Duration::from_millis(1),
            ..Default::default()
        });
        let result = gw
            .post_maker_order(&MarketId::new("m1"), Side::A, 100, 360_001)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancelling_unknown_order_is_not_an_error() {
        let gw = PaperOrderGateway::new(PaperGatewayConfig::default());
        let outcome = gw.cancel_orders(&[OrderId::new("ghost")]).await;
        assert_eq!(outcome.cancelled_count(), 0);
        assert!(outcome.failed.is_empty());
    }
}
