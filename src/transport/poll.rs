//! REST-only polling transport: the fallback path, and standalone useful for
//! tests and venues with no push channel at all.

use crate::book::mirror::MakerOrder;
use crate::errors::CoreError;
use crate::ids::{MarketId, OrderId};
use crate::transport::types::{diff_snapshot_into_deltas, DeltaHandler, Subscription, Transport, WireMakerOrder};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct PollTransport {
    client: reqwest::Client,
    rest_base_url: String,
    odds_unit: u64,
    poll_interval: Duration,
}

impl PollTransport {
    pub fn new(rest_base_url: impl Into<String>, odds_unit: u64, poll_interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            rest_base_url: rest_base_url.into(),
            odds_unit,
            poll_interval,
        }
    }

    async fn fetch_wire_snapshot(&self, market_id: &MarketId) -> Result<Vec<WireMakerOrder>, CoreError> {
        let url = format!("{}/markets/{}/orders", self.rest_base_url, market_id.as_str());
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CoreError::transport(format!(
                "snapshot fetch failed: status {}",
                resp.status()
            )));
        }
        resp.json::<Vec<WireMakerOrder>>()
            .await
            .map_err(|e| CoreError::transport(e.to_string()))
    }

    pub fn rest_base_url(&self) -> String {
        self.rest_base_url.clone()
    }

    pub fn odds_unit(&self) -> u64 {
        self.odds_unit
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Spawns the poll loop driven by a caller-supplied cancel flag, so a
    /// wrapper (the fallback transport) can share one cancellation token
    /// across a push-then-poll handoff.
    pub(crate) fn subscribe_with_cancel(
        &self,
        market_id: MarketId,
        handler: DeltaHandler,
        cancel: Arc<AtomicBool>,
    ) {
        let client = self.client.clone();
        let rest_base_url = self.rest_base_url.clone();
        let odds_unit = self.odds_unit;
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            let mut known: HashMap<OrderId, MakerOrder> = HashMap::new();
            while !cancel.load(Ordering::SeqCst) {
                ticker.tick().await;
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                let url = format!("{}/markets/{}/orders", rest_base_url, market_id.as_str());
                let wire: Vec<WireMakerOrder> = match client.get(&url).send().await {
                    Ok(resp) => match resp.json().await {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "poll transport: failed to parse snapshot");
                            continue;
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "poll transport: snapshot fetch failed");
                        continue;
                    }
                };

                let fresh: Vec<MakerOrder> = wire
                    .into_iter()
                    .filter_map(|w| w.into_maker_order(odds_unit).ok())
                    .collect();
                let deltas = diff_snapshot_into_deltas(&mut known, fresh);

                handler(market_id.clone(), deltas);
            }
        });
    }
}

#[async_trait]
impl Transport for PollTransport {
    async fn fetch_snapshot(
        &self,
        market_id: &MarketId,
    ) -> Result<Vec<crate::book::mirror::MakerOrder>, CoreError> {
        let wire = self.fetch_wire_snapshot(market_id).await?;
        wire.into_iter()
            .map(|w| w.into_maker_order(self.odds_unit))
            .collect()
    }

    fn subscribe(&self, market_id: MarketId, handler: DeltaHandler) -> Subscription {
        let cancel = Arc::new(AtomicBool::new(false));
        let sub = Subscription::new(cancel.clone());
        self.subscribe_with_cancel(market_id, handler, cancel);
        sub
    }
}
