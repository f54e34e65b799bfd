//! Order Gateway contract: post and cancel maker orders against the venue.
//! Grounded on `ExecutionAdapter`'s `place_order` shape, generalized to
//! stake/odds wire units and bulk cancellation.

use crate::errors::CoreError;
use crate::ids::{MarketId, OrderId};
use crate::position::model::Side;
use async_trait::async_trait;

/// Outcome of a (possibly partial) cancellation batch, returned verbatim to
/// the caller rather than collapsed into a single count.
#[derive(Debug, Default)]
pub struct CancelOutcome {
    pub cancelled: Vec<OrderId>,
    pub failed: Vec<(OrderId, CoreError)>,
}

impl CancelOutcome {
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.len()
    }
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// `odds_wire` MUST already be ladder-valid; callers that haven't
    /// checked get `InvalidOdds` back before anything is transmitted.
    async fn post_maker_order(
        &self,
        market_id: &MarketId,
        side: Side,
        stake_wire: u64,
        odds_wire: u64,
    ) -> Result<OrderId, CoreError>;

    async fn cancel_orders(&self, order_ids: &[OrderId]) -> CancelOutcome;
}
