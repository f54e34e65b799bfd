//! Market Monitor (§4.8): glue between the Order Book Mirror and the
//! Position Controllers attached to a market. Owns one Transport
//! subscription per market, ref-counted across attached positions, and
//! fans every delta batch out as a `MarketDataEvent` (recomputed metrics)
//! plus zero or more `FillEvent`s for self-owned orders — all dispatched
//! through the Operation Serializer so a position only ever processes one
//! event at a time.

use crate::book::metrics::{metrics_for, DerivedMetrics};
use crate::book::mirror::MirrorRegistry;
use crate::config::CoreConfig;
use crate::errors::CoreError;
use crate::ids::{MakerId, MarketId, OrderId, PositionId};
use crate::position::store::PositionStore;
use crate::serializer::OperationSerializer;
use crate::transport::{DeltaHandler, Subscription, Transport};
use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;

pub type MarketDataHandler = Arc<dyn Fn(PositionId, DerivedMetrics) -> BoxFuture<'static, ()> + Send + Sync>;
pub type FillHandler = Arc<dyn Fn(PositionId, OrderId, u64) -> BoxFuture<'static, ()> + Send + Sync>;

struct MarketSubscription {
    subscription: Subscription,
    attached: Vec<PositionId>,
}

pub struct MarketMonitor {
    transport: Arc<dyn Transport>,
    self_maker_id: MakerId,
    mirrors: MirrorRegistry,
    positions: Arc<PositionStore>,
    serializer: Arc<OperationSerializer>,
    config: Arc<CoreConfig>,
    on_market_data: MarketDataHandler,
    on_fill: FillHandler,
    subs: Mutex<HashMap<MarketId, MarketSubscription>>,
    /// Short-TTL map so a fill that arrives for an order we already
    /// cancelled locally is still credited to the right position.
    recently_cancelled: RwLock<HashMap<OrderId, (PositionId, Instant)>>,
}

impl MarketMonitor {
    pub fn new(
        transport: Arc<dyn Transport>,
        self_maker_id: MakerId,
        positions: Arc<PositionStore>,
        serializer: Arc<OperationSerializer>,
        config: Arc<CoreConfig>,
        on_market_data: MarketDataHandler,
        on_fill: FillHandler,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            mirrors: MirrorRegistry::new(self_maker_id.clone()),
            self_maker_id,
            positions,
            serializer,
            config,
            on_market_data,
            on_fill,
            subs: Mutex::new(HashMap::new()),
            recently_cancelled: RwLock::new(HashMap::new()),
        })
    }

    /// Attaches `position_id` to its market's subscription, creating one on
    /// first attach. Delivers the first `MarketDataEvent` before returning.
    pub async fn attach(self: &Arc<Self>, position_id: PositionId) -> Result<(), CoreError> {
        let market_id = self
            .positions
            .get(&position_id)
            .ok_or(CoreError::PositionGone)?
            .market_id;

        self.positions.mutate(&position_id, |p| {
            if p.status == crate::position::model::PositionStatus::Created {
                p.status = crate::position::model::PositionStatus::Initializing;
            }
        });

        let mirror = self.mirrors.get_or_create(&market_id);

        // The subscription must exist in `subs` before this function's
        // first `.await`, or a concurrent `attach` for the same market
        // would also see no entry and open a second subscription.
        let needs_snapshot = {
            let mut subs = self.subs.lock();
            match subs.get_mut(&market_id) {
                Some(sub) => {
                    sub.attached.push(position_id);
                    false
                }
                None => {
                    let monitor = self.clone();
                    let handler: DeltaHandler = Arc::new(move |delivered_market_id, deltas| {
                        monitor.on_delta_batch(&delivered_market_id, deltas);
                    });
                    let subscription = self.transport.subscribe(market_id.clone(), handler);
                    subs.insert(
                        market_id.clone(),
                        MarketSubscription {
                            subscription,
                            attached: vec![position_id],
                        },
                    );
                    true
                }
            }
        };

        if needs_snapshot {
            let snapshot = self.transport.fetch_snapshot(&market_id).await?;
            mirror.apply_snapshot(snapshot);
        }

        let done = self.deliver_market_data(&market_id, position_id);
        let _ = done.await;
        Ok(())
    }

    /// Decrements the market's attachment count; unsubscribes and drops the
    /// mirror once the last position detaches.
    pub fn detach(&self, position_id: PositionId) {
        let market_id = match self.positions.get(&position_id) {
            Some(p) => p.market_id,
            None => return,
        };

        let mut subs = self.subs.lock();
        if let Some(sub) = subs.get_mut(&market_id) {
            sub.attached.retain(|id| *id != position_id);
            if sub.attached.is_empty() {
                sub.subscription.unsubscribe();
                subs.remove(&market_id);
                self.mirrors.remove(&market_id);
            }
        }
    }

    /// Records that `order_id` (belonging to `position_id`) was just
    /// cancelled locally, so a late fill referencing it is still credited.
    pub fn note_cancelled(&self, order_id: OrderId, position_id: PositionId) {
        self.recently_cancelled
            .write()
            .insert(order_id, (position_id, Instant::now()));
    }

    fn on_delta_batch(&self, market_id: &MarketId, deltas: Vec<crate::book::mirror::OrderDelta>) {
        let mirror = self.mirrors.get_or_create(market_id);

        for delta in &deltas {
            if delta.order.maker_id == self.self_maker_id {
                if let Some(position_id) = self.owning_position(market_id, &delta.order.id) {
                    let order_id = delta.order.id.clone();
                    let new_filled = delta.order.filled_stake;
                    let fut = (self.on_fill)(position_id, order_id, new_filled);
                    self.serializer.enqueue(position_id, move || fut);
                }
            }
        }

        mirror.apply_deltas(&deltas);
        self.evict_expired_cancellations();

        let attached: Vec<PositionId> = self
            .subs
            .lock()
            .get(market_id)
            .map(|s| s.attached.clone())
            .unwrap_or_default();

        for position_id in attached {
            self.deliver_market_data(market_id, position_id);
        }
    }

    /// Enqueues a `MarketDataEvent` for `position_id` and returns a receiver
    /// that resolves once the controller has acted on it. Callers that only
    /// need to fan updates out (`on_delta_batch`) drop the receiver; `attach`
    /// awaits it so the first quote decision lands before returning.
    fn deliver_market_data(&self, market_id: &MarketId, position_id: PositionId) -> oneshot::Receiver<()> {
        let position = self.positions.get(&position_id);
        let Some(position) = position else {
            let (tx, rx) = oneshot::channel();
            let _ = tx.send(());
            return rx;
        };
        let mirror = self.mirrors.get_or_create(market_id);
        let view = mirror.view();
        let metrics = metrics_for(
            &view,
            position.chosen_side,
            position.min_for_odds,
            position.min_for_vig,
            self.config.odds_unit,
        );
        let fut = (self.on_market_data)(position_id, metrics);
        self.serializer.enqueue(position_id, move || fut)
    }

    fn owning_position(&self, market_id: &MarketId, order_id: &OrderId) -> Option<PositionId> {
        if let Some((position_id, _)) = self.recently_cancelled.read().get(order_id) {
            return Some(*position_id);
        }
        self.positions
            .ids_for_market(market_id)
            .into_iter()
            .find(|id| {
                self.positions
                    .get(id)
                    .and_then(|p| p.active_order_id)
                    .map(|active| active == *order_id)
                    .unwrap_or(false)
            })
    }

    fn evict_expired_cancellations(&self) {
        let ttl = self.config.recent_cancel_ttl;
        let now = Instant::now();
        self.recently_cancelled
            .write()
            .retain(|_, (_, at)| now.duration_since(*at) < ttl);
    }
}
