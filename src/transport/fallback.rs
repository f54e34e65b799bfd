//! Wraps a [`PushTransport`] and a [`PollTransport`]: prefers push,
//! transparently hands off to polling if the push channel doesn't connect
//! within a bounded window (§4.4). The handoff shares a single cancel flag
//! with whichever transport ends up live, so `unsubscribe()` always reaches
//! the right one.

use crate::book::mirror::MakerOrder;
use crate::errors::CoreError;
use crate::ids::MarketId;
use crate::transport::poll::PollTransport;
use crate::transport::push::PushTransport;
use crate::transport::types::{DeltaHandler, Subscription, Transport};
use async_trait::async_trait;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct FallbackTransport {
    push: PushTransport,
    poll: PollTransport,
    connect_window: Duration,
}

impl FallbackTransport {
    pub fn new(push: PushTransport, poll: PollTransport, connect_window: Duration) -> Self {
        Self {
            push,
            poll,
            connect_window,
        }
    }
}

#[async_trait]
impl Transport for FallbackTransport {
    async fn fetch_snapshot(&self, market_id: &MarketId) -> Result<Vec<MakerOrder>, CoreError> {
        self.push.fetch_snapshot(market_id).await
    }

    fn subscribe(&self, market_id: MarketId, handler: DeltaHandler) -> Subscription {
        // `outer_cancel` is what the caller's `Subscription` controls;
        // `push_cancel` is scoped to the push attempt alone, so falling
        // back can stop push without also stopping the poll loop that
        // takes over under `outer_cancel`.
        let outer_cancel = Arc::new(AtomicBool::new(false));
        let push_cancel = Arc::new(AtomicBool::new(false));
        let sub = Subscription::new(outer_cancel.clone());

        let connected = self
            .push
            .subscribe_with_cancel(market_id.clone(), handler.clone(), push_cancel.clone());

        let connect_window = self.connect_window;
        let poll_rest_base_url = self.poll.rest_base_url();
        let poll_odds_unit = self.poll.odds_unit();
        let poll_interval = self.poll.poll_interval();

        tokio::spawn(async move {
            let timed_out = tokio::time::timeout(connect_window, connected).await.is_err();
            if outer_cancel.load(std::sync::atomic::Ordering::SeqCst) {
                push_cancel.store(true, std::sync::atomic::Ordering::SeqCst);
                return;
            }
            if timed_out {
                info!(market = %market_id, "push channel did not connect in time; falling back to polling");
                push_cancel.store(true, std::sync::atomic::Ordering::SeqCst);
                let poll = PollTransport::new(poll_rest_base_url, poll_odds_unit, poll_interval);
                poll.subscribe_with_cancel(market_id, handler, outer_cancel);
            } else {
                // Push connected: keep `outer_cancel` wired to it so the
                // caller's `unsubscribe()` still reaches the live loop.
                tokio::spawn(async move {
                    while !outer_cancel.load(std::sync::atomic::Ordering::SeqCst) {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    push_cancel.store(true, std::sync::atomic::Ordering::SeqCst);
                });
            }
        });

        sub
    }
}
