//! Concurrent position map. Owns every [`Position`] value; all mutation is
//! expected to happen from inside that position's operation-serializer task
//! (see `crate::serializer`), but the store itself only guarantees that its
//! own reads/writes are consistent — it does not enforce the access
//! discipline.

use crate::ids::PositionId;
use crate::position::model::Position;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct PositionStore {
    inner: RwLock<HashMap<PositionId, Position>>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, position: Position) {
        self.inner.write().insert(position.id, position);
    }

    pub fn get(&self, id: &PositionId) -> Option<Position> {
        self.inner.read().get(id).cloned()
    }

    pub fn remove(&self, id: &PositionId) -> Option<Position> {
        self.inner.write().remove(id)
    }

    pub fn contains(&self, id: &PositionId) -> bool {
        self.inner.read().contains_key(id)
    }

    /// Snapshot of every position currently held, for `listPositions`.
    pub fn snapshot(&self) -> Vec<Position> {
        self.inner.read().values().cloned().collect()
    }

    /// Runs `f` against the stored position and writes back its result.
    /// Returns `None` (without calling `f`) if the position is gone, which
    /// is how a queued operation observes `PositionGone` after a concurrent
    /// close.
    pub fn mutate<R>(&self, id: &PositionId, f: impl FnOnce(&mut Position) -> R) -> Option<R> {
        let mut guard = self.inner.write();
        let position = guard.get_mut(id)?;
        Some(f(position))
    }

    pub fn ids_for_market(&self, market_id: &crate::ids::MarketId) -> Vec<PositionId> {
        self.inner
            .read()
            .values()
            .filter(|p| &p.market_id == market_id)
            .map(|p| p.id)
            .collect()
    }
}
