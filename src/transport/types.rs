//! Transport contract: snapshot fetch plus a push/poll subscription of
//! equivalent semantics, per §4.4. Grounded on `PolymarketMarketWsCache`'s
//! `spawn`/`request_subscribe`/reconnect-loop shape.

use crate::book::mirror::{DeltaStatus, MakerOrder, OrderDelta};
use crate::errors::CoreError;
use crate::ids::{MarketId, OrderId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Wire representation of a maker order as the venue would serialize it.
/// Intentionally not `MakerOrder` itself: the wire shape is the venue's to
/// define, ours to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMakerOrder {
    pub id: String,
    pub market_id: String,
    pub maker_id: String,
    pub total_stake: u64,
    pub filled_stake: u64,
    pub maker_odds: u64,
    pub maker_side_is_a: bool,
    pub update_time: u64,
}

impl WireMakerOrder {
    pub fn into_maker_order(self, odds_unit: u64) -> Result<MakerOrder, CoreError> {
        MakerOrder::new(
            self.id.into(),
            self.market_id.into(),
            self.maker_id.into(),
            self.total_stake,
            self.filled_stake,
            self.maker_odds,
            self.maker_side_is_a,
            self.update_time,
            odds_unit,
        )
        .map_err(|e| CoreError::Transport {
            message: e.to_string(),
        })
    }
}

/// Diffs a freshly-fetched snapshot against `known` (the order set a poll
/// loop or reconnect resync last saw), mutating `known` to match, and
/// returns both the `ACTIVE` deltas for every order in the new snapshot and
/// synthesized `INACTIVE` deltas for every order that dropped out of it.
/// Per §9, a snapshot is authoritative: an order missing from it is gone,
/// even though no explicit delta for it ever arrived.
pub(crate) fn diff_snapshot_into_deltas(
    known: &mut HashMap<OrderId, MakerOrder>,
    fresh: Vec<MakerOrder>,
) -> Vec<OrderDelta> {
    let mut seen = HashSet::with_capacity(fresh.len());
    let mut deltas = Vec::with_capacity(fresh.len());

    for order in fresh {
        seen.insert(order.id.clone());
        deltas.push(OrderDelta {
            order: order.clone(),
            status: DeltaStatus::Active,
        });
        known.insert(order.id.clone(), order);
    }

    let gone: Vec<OrderId> = known
        .keys()
        .filter(|id| !seen.contains(*id))
        .cloned()
        .collect();
    for id in gone {
        if let Some(mut last) = known.remove(&id) {
            last.update_time = last.update_time.saturating_add(1);
            deltas.push(OrderDelta {
                order: last,
                status: DeltaStatus::Inactive,
            });
        }
    }

    deltas
}

/// Called with every delta batch for a market, in arrival order.
pub type DeltaHandler = Arc<dyn Fn(MarketId, Vec<OrderDelta>) + Send + Sync>;

/// Handle to a live subscription. `unsubscribe` is idempotent; dropping the
/// handle does not itself cancel the subscription (the Market Monitor holds
/// this explicitly and calls `unsubscribe` on ref-count zero).
pub struct Subscription {
    cancel: Arc<std::sync::atomic::AtomicBool>,
}

impl Subscription {
    pub fn new(cancel: Arc<std::sync::atomic::AtomicBool>) -> Self {
        Self { cancel }
    }

    pub fn unsubscribe(&self) {
        self.cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_snapshot(&self, market_id: &MarketId) -> Result<Vec<MakerOrder>, CoreError>;

    fn subscribe(&self, market_id: MarketId, handler: DeltaHandler) -> Subscription;
}
