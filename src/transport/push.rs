//! Push (WebSocket) transport with exponential-backoff reconnect. Grounded
//! on `PolymarketMarketWsCache::run`/`connect_and_stream`: a single
//! reconnect loop with a growing delay, a periodic ping, and a resync
//! (fresh snapshot) on every (re)connect.

use crate::book::mirror::{DeltaStatus, MakerOrder, OrderDelta};
use crate::errors::CoreError;
use crate::ids::{MarketId, OrderId};
use crate::transport::types::{diff_snapshot_into_deltas, DeltaHandler, Subscription, Transport, WireMakerOrder};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsDeltaMsg {
    order: WireMakerOrder,
    status: String,
}

pub struct PushTransport {
    ws_url: String,
    rest_base_url: String,
    odds_unit: u64,
}

impl PushTransport {
    pub fn new(ws_url: impl Into<String>, rest_base_url: impl Into<String>, odds_unit: u64) -> Self {
        Self {
            ws_url: ws_url.into(),
            rest_base_url: rest_base_url.into(),
            odds_unit,
        }
    }

    async fn fetch_snapshot_wire(&self, market_id: &MarketId) -> Result<Vec<MakerOrder>, CoreError> {
        let client = reqwest::Client::new();
        let url = format!("{}/markets/{}/orders", self.rest_base_url, market_id.as_str());
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::transport(e.to_string()))?;
        let wire: Vec<WireMakerOrder> = resp
            .json()
            .await
            .map_err(|e| CoreError::transport(e.to_string()))?;
        wire.into_iter()
            .map(|w| w.into_maker_order(self.odds_unit))
            .collect()
    }

    /// Subscribes and reports first-connect success on `connected`, so a
    /// wrapper can race it against a bounded window before falling back to
    /// polling.
    pub(crate) fn subscribe_with_connect_signal(
        &self,
        market_id: MarketId,
        handler: DeltaHandler,
    ) -> (Subscription, oneshot::Receiver<()>) {
        let cancel = Arc::new(AtomicBool::new(false));
        let sub = Subscription::new(cancel.clone());
        let connected_rx = self.subscribe_with_cancel(market_id, handler, cancel);
        (sub, connected_rx)
    }

    /// Spawns the reconnect loop driven by a caller-supplied cancel flag, so
    /// a wrapper (the fallback transport) can share one cancellation token
    /// across a push-then-poll handoff.
    pub(crate) fn subscribe_with_cancel(
        &self,
        market_id: MarketId,
        handler: DeltaHandler,
        cancel: Arc<AtomicBool>,
    ) -> oneshot::Receiver<()> {
        let (connected_tx, connected_rx) = oneshot::channel();

        let ws_url = self.ws_url.clone();
        let rest_base_url = self.rest_base_url.clone();
        let odds_unit = self.odds_unit;

        tokio::spawn(run_reconnect_loop(
            ws_url,
            rest_base_url,
            odds_unit,
            market_id,
            handler,
            cancel,
            connected_tx,
        ));

        connected_rx
    }
}

#[async_trait]
impl Transport for PushTransport {
    async fn fetch_snapshot(&self, market_id: &MarketId) -> Result<Vec<MakerOrder>, CoreError> {
        self.fetch_snapshot_wire(market_id).await
    }

    fn subscribe(&self, market_id: MarketId, handler: DeltaHandler) -> Subscription {
        let (sub, _connected) = self.subscribe_with_connect_signal(market_id, handler);
        sub
    }
}

async fn run_reconnect_loop(
    ws_url: String,
    rest_base_url: String,
    odds_unit: u64,
    market_id: MarketId,
    handler: DeltaHandler,
    cancel: Arc<AtomicBool>,
    connected_tx: oneshot::Sender<()>,
) {
    let mut reconnect_delay = Duration::from_secs(1);
    let max_reconnect_delay = Duration::from_secs(30);
    let mut connected_tx = Some(connected_tx);
    // Tracks orders seen on the last successful resync so every (re)connect
    // can diff the fresh snapshot against it and synthesize INACTIVE deltas
    // for orders that disappeared while disconnected.
    let mut known: HashMap<OrderId, MakerOrder> = HashMap::new();

    while !cancel.load(Ordering::SeqCst) {
        match connect_and_stream(
            &ws_url,
            &rest_base_url,
            odds_unit,
            &market_id,
            &handler,
            &cancel,
            &mut connected_tx,
            &mut known,
        )
        .await
        {
            Ok(()) => {
                reconnect_delay = Duration::from_secs(1);
            }
            Err(e) => {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                warn!(market = %market_id, error = %e, "push transport disconnected; reconnecting");
                tokio::time::sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(max_reconnect_delay);
            }
        }
    }
}

async fn connect_and_stream(
    ws_url: &str,
    rest_base_url: &str,
    odds_unit: u64,
    market_id: &MarketId,
    handler: &DeltaHandler,
    cancel: &Arc<AtomicBool>,
    connected_tx: &mut Option<oneshot::Sender<()>>,
    known: &mut HashMap<OrderId, MakerOrder>,
) -> Result<(), CoreError> {
    let (ws_stream, _resp) = connect_async(ws_url)
        .await
        .map_err(|e| CoreError::transport(format!("connect_async: {e}")))?;
    let (mut write, mut read) = ws_stream.split();

    let sub_msg = serde_json::json!({
        "type": "subscribe",
        "marketId": market_id.as_str(),
    });
    write
        .send(Message::Text(sub_msg.to_string()))
        .await
        .map_err(|e| CoreError::transport(e.to_string()))?;

    // Resync via a fresh snapshot on every (re)connect.
    let client = reqwest::Client::new();
    let url = format!("{}/markets/{}/orders", rest_base_url, market_id.as_str());
    if let Ok(resp) = client.get(&url).send().await {
        if let Ok(wire) = resp.json::<Vec<WireMakerOrder>>().await {
            let fresh: Vec<MakerOrder> = wire
                .into_iter()
                .filter_map(|w| w.into_maker_order(odds_unit).ok())
                .collect();
            let deltas = diff_snapshot_into_deltas(known, fresh);
            handler(market_id.clone(), deltas);
        }
    }

    if let Some(tx) = connected_tx.take() {
        let _ = tx.send(());
    }

    let mut ping = tokio::time::interval(Duration::from_secs(15));
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        if cancel.load(Ordering::SeqCst) {
            let _ = write.send(Message::Close(None)).await;
            return Ok(());
        }
        tokio::select! {
            _ = ping.tick() => {
                if write.send(Message::Ping(Vec::new())).await.is_err() {
                    return Err(CoreError::transport("ping send failed"));
                }
            }
            ws_msg = read.next() => {
                let Some(ws_msg) = ws_msg else {
                    return Err(CoreError::transport("stream ended"));
                };
                match ws_msg {
                    Ok(Message::Text(text)) => {
                        if let Some(deltas) = parse_delta_batch(&text, odds_unit) {
                            handler(market_id.clone(), deltas);
                        }
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "push transport close frame");
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(e) => return Err(CoreError::transport(e.to_string())),
                }
            }
        }
    }
}

fn parse_delta_batch(text: &str, odds_unit: u64) -> Option<Vec<OrderDelta>> {
    let msgs: Vec<WsDeltaMsg> = serde_json::from_str(text).ok()?;
    let deltas = msgs
        .into_iter()
        .filter_map(|m| {
            let order = m.order.into_maker_order(odds_unit).ok()?;
            let status = match m.status.as_str() {
                "ACTIVE" => DeltaStatus::Active,
                "INACTIVE" => DeltaStatus::Inactive,
                _ => return None,
            };
            Some(OrderDelta { order, status })
        })
        .collect();
    Some(deltas)
}
