//! `MakerCore`: the facade an operator (CLI, or an embedding application)
//! drives. Owns the Position Store, wires the Market Monitor's callbacks
//! into the Position Controller, and dispatches every operator action
//! through the Operation Serializer so it never races a concurrent market
//! data or fill event for the same position.

use crate::config::CoreConfig;
use crate::controller::PositionController;
use crate::errors::CoreError;
use crate::gateway::OrderGateway;
use crate::ids::{MakerId, PositionId};
use crate::monitor::MarketMonitor;
use crate::position::model::{Position, PositionPatch, PositionSpec};
use crate::position::store::PositionStore;
use crate::serializer::OperationSerializer;
use crate::transport::Transport;
use std::sync::{Arc, Weak};
use tracing::info;

pub struct MakerCore {
    store: Arc<PositionStore>,
    monitor: Arc<MarketMonitor>,
    controller: Arc<PositionController>,
    serializer: Arc<OperationSerializer>,
}

impl MakerCore {
    /// Assembles the monitor/controller pair. The controller closures handed
    /// to `MarketMonitor::new` capture only a `Weak<PositionController>`:
    /// `MarketMonitor` holds `Arc<PositionController>`'s sibling (via this
    /// struct), and `PositionController` holds `Arc<MarketMonitor>`, so a
    /// strong cycle here would leak both forever once `MakerCore` is dropped.
    pub fn new(
        self_maker_id: MakerId,
        transport: Arc<dyn Transport>,
        gateway: Arc<dyn OrderGateway>,
        config: Arc<CoreConfig>,
    ) -> Arc<Self> {
        let store = Arc::new(PositionStore::new());
        let serializer = Arc::new(OperationSerializer::new());

        let controller_slot: Arc<parking_lot::RwLock<Weak<PositionController>>> =
            Arc::new(parking_lot::RwLock::new(Weak::new()));

        let on_market_data = {
            let slot = controller_slot.clone();
            Arc::new(move |position_id, metrics| -> futures_util::future::BoxFuture<'static, ()> {
                let slot = slot.clone();
                Box::pin(async move {
                    if let Some(controller) = slot.read().upgrade() {
                        controller.on_market_data(position_id, metrics).await;
                    }
                })
            })
        };

        let on_fill = {
            let slot = controller_slot.clone();
            Arc::new(move |position_id, order_id, filled| -> futures_util::future::BoxFuture<'static, ()> {
                let slot = slot.clone();
                Box::pin(async move {
                    if let Some(controller) = slot.read().upgrade() {
                        controller.on_fill(position_id, order_id, filled).await;
                    }
                })
            })
        };

        let monitor = MarketMonitor::new(
            transport,
            self_maker_id,
            store.clone(),
            serializer.clone(),
            config.clone(),
            on_market_data,
            on_fill,
        );

        let controller = PositionController::new(store.clone(), gateway, monitor.clone(), config);
        *controller_slot.write() = Arc::downgrade(&controller);

        Arc::new(Self {
            store,
            monitor,
            controller,
            serializer,
        })
    }

    /// Creates a new position, attaches it to its market, and waits for the
    /// first market-data-driven quote decision before returning.
    pub async fn create_position(self: &Arc<Self>, spec: PositionSpec) -> Result<PositionId, CoreError> {
        let id = PositionId::new();
        self.store.insert(Position::new(id, spec));

        if let Err(e) = self.monitor.attach(id).await {
            self.store.remove(&id);
            return Err(e);
        }

        info!(position = %id, "position created");
        Ok(id)
    }

    pub fn list_positions(&self) -> Vec<Position> {
        self.store.snapshot()
    }

    pub fn get_position(&self, id: PositionId) -> Option<Position> {
        self.store.get(&id)
    }

    /// Applies an operator edit through the position's serializer slot, then
    /// waits for the resulting re-evaluation to finish.
    pub async fn edit_position(&self, id: PositionId, patch: PositionPatch) -> Result<(), CoreError> {
        if !self.store.contains(&id) {
            return Err(CoreError::PositionGone);
        }
        let controller = self.controller.clone();
        let rx = self
            .serializer
            .enqueue(id, move || async move { controller.on_operator_edit(id, patch).await });
        let _ = rx.await;
        Ok(())
    }

    /// Closes a position: cancels any resting order, detaches from its
    /// market, and removes it from the store.
    pub async fn close_position(&self, id: PositionId) -> Result<(), CoreError> {
        if !self.store.contains(&id) {
            return Err(CoreError::PositionGone);
        }
        let controller = self.controller.clone();
        let rx = self
            .serializer
            .enqueue(id, move || async move { controller.on_operator_close(id).await });
        let _ = rx.await;
        self.serializer.remove(&id);
        Ok(())
    }

    /// Closes every open position, for a graceful shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<PositionId> = self.store.snapshot().into_iter().map(|p| p.id).collect();
        for id in ids {
            let _ = self.close_position(id).await;
        }
    }
}
