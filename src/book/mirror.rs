//! In-memory order book mirror for a single market.
//!
//! Holds every other participant's live maker orders (ours are excluded at
//! the point of insertion — see §4.3) keyed by outcome side, and republishes
//! an immutable [`MirrorView`] via `ArcSwap` after every snapshot/delta batch
//! so readers (controllers computing metrics) never block behind the
//! writer's lock. Grounded on `BookStore`'s `ArcSwap<BookSnapshot>` pattern.

use crate::ids::{MakerId, MarketId, OrderId};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single maker order as mirrored from the venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakerOrder {
    pub id: OrderId,
    pub market_id: MarketId,
    pub maker_id: MakerId,
    pub total_stake: u64,
    pub filled_stake: u64,
    pub maker_odds: u64,
    pub maker_side_is_a: bool,
    /// Monotone per-entry sequence used to drop out-of-order duplicate
    /// updates for the same order id.
    pub update_time: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum MakerOrderError {
    #[error("filled_stake {filled} exceeds total_stake {total}")]
    FilledExceedsTotal { filled: u64, total: u64 },
    #[error("maker_odds {0} outside (0, ODDS_UNIT)")]
    OddsOutOfRange(u64),
}

impl MakerOrder {
    pub fn new(
        id: OrderId,
        market_id: MarketId,
        maker_id: MakerId,
        total_stake: u64,
        filled_stake: u64,
        maker_odds: u64,
        maker_side_is_a: bool,
        update_time: u64,
        odds_unit: u64,
    ) -> Result<Self, MakerOrderError> {
        if filled_stake > total_stake {
            return Err(MakerOrderError::FilledExceedsTotal {
                filled: filled_stake,
                total: total_stake,
            });
        }
        if maker_odds == 0 || maker_odds >= odds_unit {
            return Err(MakerOrderError::OddsOutOfRange(maker_odds));
        }
        Ok(Self {
            id,
            market_id,
            maker_id,
            total_stake,
            filled_stake,
            maker_odds,
            maker_side_is_a,
            update_time,
        })
    }

    pub fn remaining_maker_stake(&self) -> u64 {
        self.total_stake - self.filled_stake
    }

    pub fn remaining_taker_capacity(&self, odds_unit: u64) -> u64 {
        crate::stake::remaining_taker_capacity(self.remaining_maker_stake(), self.maker_odds, odds_unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaStatus {
    Active,
    Inactive,
}

/// One update from the transport layer for a single order.
#[derive(Debug, Clone)]
pub struct OrderDelta {
    pub order: MakerOrder,
    pub status: DeltaStatus,
}

/// Immutable, cheaply-cloneable view of a market's mirrored orders, sorted
/// odds-descending per side so "best" queries are a slice head lookup.
#[derive(Debug, Clone, Default)]
pub struct MirrorView {
    pub side_a: Vec<MakerOrder>,
    pub side_b: Vec<MakerOrder>,
}

impl MirrorView {
    fn sorted_from(mut orders_a: Vec<MakerOrder>, mut orders_b: Vec<MakerOrder>) -> Self {
        orders_a.sort_by(|a, b| b.maker_odds.cmp(&a.maker_odds));
        orders_b.sort_by(|a, b| b.maker_odds.cmp(&a.maker_odds));
        Self {
            side_a: orders_a,
            side_b: orders_b,
        }
    }
}

/// Per-market mirror: owns the authoritative order set, publishes a
/// [`MirrorView`] snapshot for lock-free reads.
pub struct MarketMirror {
    market_id: MarketId,
    self_maker_id: MakerId,
    inner: Mutex<Inner>,
    view: ArcSwap<MirrorView>,
    dropped_deltas: AtomicU64,
}

struct Inner {
    side_a: HashMap<OrderId, MakerOrder>,
    side_b: HashMap<OrderId, MakerOrder>,
}

impl MarketMirror {
    pub fn new(market_id: MarketId, self_maker_id: MakerId) -> Arc<Self> {
        Arc::new(Self {
            market_id,
            self_maker_id,
            inner: Mutex::new(Inner {
                side_a: HashMap::new(),
                side_b: HashMap::new(),
            }),
            view: ArcSwap::from_pointee(MirrorView::default()),
            dropped_deltas: AtomicU64::new(0),
        })
    }

    pub fn market_id(&self) -> &MarketId {
        &self.market_id
    }

    /// Number of deltas dropped for being malformed or stale. Exposed for
    /// observability; never affects correctness.
    pub fn dropped_delta_count(&self) -> u64 {
        self.dropped_deltas.load(Ordering::Relaxed)
    }

    /// Replaces the entire mirrored order set atomically.
    pub fn apply_snapshot(&self, orders: Vec<MakerOrder>) {
        let mut inner = self.inner.lock();
        inner.side_a.clear();
        inner.side_b.clear();
        for order in orders {
            if order.maker_id == self.self_maker_id {
                continue;
            }
            if order.maker_side_is_a {
                inner.side_a.insert(order.id.clone(), order);
            } else {
                inner.side_b.insert(order.id.clone(), order);
            }
        }
        self.publish(&inner);
    }

    /// Applies an ordered batch of deltas. Malformed or stale (by
    /// `update_time`) entries are dropped and counted, never panicking.
    pub fn apply_deltas(&self, deltas: &[OrderDelta]) {
        let mut inner = self.inner.lock();
        for delta in deltas {
            if delta.order.maker_id == self.self_maker_id {
                continue;
            }

            // An order id may in principle reappear on the opposite side; the
            // invariant that it lives in at most one bucket is enforced here
            // rather than trusted from the wire.
            let stale = match (
                inner.side_a.get(&delta.order.id),
                inner.side_b.get(&delta.order.id),
            ) {
                (Some(existing), _) | (_, Some(existing)) => {
                    delta.order.update_time <= existing.update_time
                }
                (None, None) => false,
            };
            if stale {
                self.dropped_deltas.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            inner.side_a.remove(&delta.order.id);
            inner.side_b.remove(&delta.order.id);

            let bucket = if delta.order.maker_side_is_a {
                &mut inner.side_a
            } else {
                &mut inner.side_b
            };

            match delta.status {
                DeltaStatus::Active => {
                    bucket.insert(delta.order.id.clone(), delta.order.clone());
                }
                DeltaStatus::Inactive => {
                    bucket.remove(&delta.order.id);
                }
            }
        }
        self.publish(&inner);
    }

    fn publish(&self, inner: &Inner) {
        let a: Vec<MakerOrder> = inner.side_a.values().cloned().collect();
        let b: Vec<MakerOrder> = inner.side_b.values().cloned().collect();
        self.view.store(Arc::new(MirrorView::sorted_from(a, b)));
    }

    /// Current lock-free snapshot of the mirror.
    pub fn view(&self) -> Arc<MirrorView> {
        self.view.load_full()
    }

    /// `true` if `order_id` lives in at most one side bucket (property 4 in
    /// spec §8); used by tests, cheap enough to also assert defensively.
    #[cfg(test)]
    fn in_both_buckets(&self, order_id: &OrderId) -> bool {
        let inner = self.inner.lock();
        inner.side_a.contains_key(order_id) && inner.side_b.contains_key(order_id)
    }
}

/// Registry of per-market mirrors, shared by the Market Monitor.
pub struct MirrorRegistry {
    self_maker_id: MakerId,
    mirrors: Mutex<HashMap<MarketId, Arc<MarketMirror>>>,
}

impl MirrorRegistry {
    pub fn new(self_maker_id: MakerId) -> Self {
        Self {
            self_maker_id,
            mirrors: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, market_id: &MarketId) -> Arc<MarketMirror> {
        let mut mirrors = self.mirrors.lock();
        mirrors
            .entry(market_id.clone())
            .or_insert_with(|| MarketMirror::new(market_id.clone(), self.self_maker_id.clone()))
            .clone()
    }

    pub fn get(&self, market_id: &MarketId) -> Option<Arc<MarketMirror>> {
        self.mirrors.lock().get(market_id).cloned()
    }

    pub fn remove(&self, market_id: &MarketId) {
        self.mirrors.lock().remove(market_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, side_a: bool, odds: u64, stake: u64, filled: u64, t: u64) -> MakerOrder {
        MakerOrder::new(
            OrderId::new(id),
            MarketId::new("m1"),
            MakerId::new("other"),
            stake,
            filled,
            odds,
            side_a,
            t,
            1_000_000,
        )
        .unwrap()
    }

    #[test]
    fn self_orders_are_never_mirrored() {
        let mirror = MarketMirror::new(MarketId::new("m1"), MakerId::new("self"));
        let mut mine = order("o1", true, 500_000, 100, 0, 1);
        mine.maker_id = MakerId::new("self");
        mirror.apply_snapshot(vec![mine]);
        assert!(mirror.view().side_a.is_empty());
    }

    #[test]
    fn stale_delta_is_dropped() {
        let mirror = MarketMirror::new(MarketId::new("m1"), MakerId::new("self"));
        mirror.apply_snapshot(vec![order("o1", true, 500_000, 100, 0, 5)]);
        mirror.apply_deltas(&[OrderDelta {
            order: order("o1", true, 999_000, 100, 0, 3),
            status: DeltaStatus::Active,
        }]);
        let view = mirror.view();
        assert_eq!(view.side_a[0].maker_odds, 500_000);
    }

    #[test]
    fn inactive_delta_removes_order() {
        let mirror = MarketMirror::new(MarketId::new("m1"), MakerId::new("self"));
        mirror.apply_snapshot(vec![order("o1", true, 500_000, 100, 0, 1)]);
        mirror.apply_deltas(&[OrderDelta {
            order: order("o1", true, 500_000, 100, 0, 2),
            status: DeltaStatus::Inactive,
        }]);
        assert!(mirror.view().side_a.is_empty());
    }

    #[test]
    fn snapshot_then_same_as_active_deltas_converges() {
        let orders = vec![
            order("o1", true, 500_000, 100, 0, 1),
            order("o2", false, 400_000, 50, 10, 1),
        ];

        let via_snapshot = MarketMirror::new(MarketId::new("m1"), MakerId::new("self"));
        via_snapshot.apply_snapshot(orders.clone());

        let via_deltas = MarketMirror::new(MarketId::new("m1"), MakerId::new("self"));
        let deltas: Vec<OrderDelta> = orders
            .into_iter()
            .map(|order| OrderDelta {
                order,
                status: DeltaStatus::Active,
            })
            .collect();
        via_deltas.apply_deltas(&deltas);

        let snap_view = via_snapshot.view();
        let delta_view = via_deltas.view();
        assert_eq!(snap_view.side_a.len(), delta_view.side_a.len());
        assert_eq!(snap_view.side_b.len(), delta_view.side_b.len());
    }

    #[test]
    fn order_never_lives_in_both_buckets() {
        let mirror = MarketMirror::new(MarketId::new("m1"), MakerId::new("self"));
        mirror.apply_snapshot(vec![order("o1", true, 500_000, 100, 0, 1)]);
        mirror.apply_deltas(&[OrderDelta {
            order: order("o1", false, 500_000, 100, 0, 2),
            status: DeltaStatus::Active,
        }]);
        assert!(!mirror.in_both_buckets(&OrderId::new("o1")));
    }
}
