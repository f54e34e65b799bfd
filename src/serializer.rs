//! Per-position FIFO operation queue (§4.7). Grounded on
//! `PolymarketMarketWsCache::spawn`'s worker-task-plus-mpsc-channel shape,
//! but one actor per position instead of one shared actor: every mutating
//! event (`MarketDataEvent`, `FillEvent`, operator edit/close) for a given
//! position is pushed through its channel and the spawned task drains them
//! one at a time, so "read position, decide, write position" never races
//! with itself. Operations for distinct positions run fully concurrently.
//!
//! The serializer has no notion of `PositionGone`: an enqueued operation is
//! expected to look the position up in the `PositionStore` itself and no-op
//! if it's absent, which keeps the queue dumb and the store the single
//! source of truth (see DESIGN.md).

use crate::ids::PositionId;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

type BoxedOp = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct Queue {
    tx: mpsc::UnboundedSender<BoxedOp>,
}

#[derive(Default)]
pub struct OperationSerializer {
    queues: Mutex<HashMap<PositionId, Queue>>,
}

impl OperationSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `op` for `position_id`, spawning its actor task on first
    /// use. Returns a receiver that resolves once `op` has run.
    pub fn enqueue<F, Fut>(&self, position_id: PositionId, op: F) -> oneshot::Receiver<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let boxed: BoxedOp = Box::new(move || {
            Box::pin(async move {
                op().await;
                let _ = done_tx.send(());
            })
        });

        let tx = {
            let mut queues = self.queues.lock();
            queues
                .entry(position_id)
                .or_insert_with(Self::spawn_actor)
                .tx
                .clone()
        };

        // An unbounded send only fails if the actor task has already exited,
        // which only happens after `remove` drops its sender; the enqueued
        // closure is simply dropped unrun in that case (equivalent to
        // `PositionGone`, since `remove` is only called on position close).
        let _ = tx.send(boxed);
        done_rx
    }

    /// Drops this position's queue. Any operations already sent but not yet
    /// drained still run (the channel outlives the `HashMap` entry); no new
    /// operations can be enqueued afterward without re-creating the actor.
    pub fn remove(&self, position_id: &PositionId) {
        self.queues.lock().remove(position_id);
    }

    fn spawn_actor() -> Queue {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoxedOp>();
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                op().await;
            }
        });
        Queue { tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn operations_for_one_position_run_in_submission_order() {
        let serializer = OperationSerializer::new();
        let position_id = PositionId::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut waiters = Vec::new();
        for i in 0..10 {
            let order = order.clone();
            waiters.push(serializer.enqueue(position_id, move || async move {
                order.lock().push(i);
            }));
        }
        for w in waiters {
            w.await.unwrap();
        }

        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn distinct_positions_do_not_block_each_other() {
        let serializer = Arc::new(OperationSerializer::new());
        let counter = Arc::new(AtomicU32::new(0));

        let mut waiters = Vec::new();
        for _ in 0..8 {
            let position_id = PositionId::new();
            let counter = counter.clone();
            waiters.push(serializer.enqueue(position_id, move || async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let start = std::time::Instant::now();
        for w in waiters {
            w.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        assert!(start.elapsed() < std::time::Duration::from_millis(80));
    }
}
