//! Live order gateway: HMAC-signed REST calls against the venue. Grounded on
//! `PolymarketClobAdapter::sign_request`/`auth_headers`/`place_order`.

use crate::config::SigningIdentity;
use crate::errors::CoreError;
use crate::gateway::retry::with_retry;
use crate::gateway::types::{CancelOutcome, OrderGateway};
use crate::ids::{MarketId, OrderId};
use crate::odds::assert_ladder_valid;
use crate::position::model::Side;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

pub struct HttpOrderGateway {
    client: reqwest::Client,
    identity: SigningIdentity,
    rest_base_url: String,
    ladder_step: u64,
    odds_unit: u64,
    max_retries: u32,
    retry_base_delay: Duration,
    retry_backoff: u32,
}

impl HttpOrderGateway {
    pub fn new(
        identity: SigningIdentity,
        rest_base_url: impl Into<String>,
        ladder_step: u64,
        odds_unit: u64,
        max_retries: u32,
        retry_base_delay: Duration,
        retry_backoff: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            identity,
            rest_base_url: rest_base_url.into(),
            ladder_step,
            odds_unit,
            max_retries,
            retry_base_delay,
            retry_backoff,
        }
    }

    fn sign_request(&self, method: &str, path: &str, body: &str, timestamp: i64) -> Result<String, CoreError> {
        let message = format!("{timestamp}{method}{path}{body}");
        let secret_bytes = URL_SAFE
            .decode(&self.identity.secret)
            .map_err(|e| CoreError::transport(format!("failed to decode signing secret: {e}")))?;
        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| CoreError::transport(format!("HMAC key error: {e}")))?;
        mac.update(message.as_bytes());
        Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
    }

    fn auth_headers(&self, method: &str, path: &str, body: &str) -> Result<Vec<(String, String)>, CoreError> {
        let timestamp = Utc::now().timestamp();
        let signature = self.sign_request(method, path, body, timestamp)?;
        Ok(vec![
            ("MAKER-ID".to_string(), self.identity.maker_id.to_string()),
            ("MAKER-API-KEY".to_string(), self.identity.api_key.clone()),
            ("MAKER-SIGNATURE".to_string(), signature),
            ("MAKER-TIMESTAMP".to_string(), timestamp.to_string()),
            ("MAKER-PASSPHRASE".to_string(), self.identity.passphrase.clone()),
        ])
    }

    async fn post_once(
        &self,
        market_id: &MarketId,
        side: Side,
        stake_wire: u64,
        odds_wire: u64,
    ) -> Result<OrderId, CoreError> {
        let payload = PostOrderPayload {
            market_id: market_id.as_str().to_string(),
            side: match side {
                Side::A => "A",
                Side::B => "B",
            }
            .to_string(),
            stake_wire,
            odds_wire,
        };
        let body = serde_json::to_string(&payload)
            .map_err(|e| CoreError::transport(format!("failed to serialize order: {e}")))?;
        let path = "/orders";
        let headers = self.auth_headers("POST", path, &body)?;

        let url = format!("{}{}", self.rest_base_url, path);
        let mut request = self.client.post(&url).header("Content-Type", "application/json");
        for (key, value) in headers {
            request = request.header(&key, &value);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| CoreError::transport(e.to_string()))?;
        let status = response.status();
        let resp_text = response
            .text()
            .await
            .map_err(|e| CoreError::transport(e.to_string()))?;

        if status.as_u16() == 429 {
            return Err(CoreError::RateLimited);
        }
        if !status.is_success() {
            return Err(CoreError::OrderRejected { reason: resp_text });
        }

        let resp: PostOrderResponse = serde_json::from_str(&resp_text)
            .map_err(|e| CoreError::transport(format!("failed to parse order response: {e}")))?;
        Ok(OrderId::new(resp.order_id))
    }

    async fn cancel_once(&self, order_id: &OrderId) -> Result<(), CoreError> {
        let path = format!("/orders/{}", order_id.as_str());
        let headers = self.auth_headers("DELETE", &path, "")?;
        let url = format!("{}{}", self.rest_base_url, path);
        let mut request = self.client.delete(&url);
        for (key, value) in headers {
            request = request.header(&key, &value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CoreError::transport(e.to_string()))?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(CoreError::OrderGone {
                order_id: order_id.clone(),
            });
        }
        if status.as_u16() == 429 {
            return Err(CoreError::RateLimited);
        }
        if !status.is_success() {
            return Err(CoreError::transport(format!("cancel failed: status {status}")));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PostOrderPayload {
    #[serde(rename = "marketId")]
    market_id: String,
    side: String,
    #[serde(rename = "stakeWire")]
    stake_wire: u64,
    #[serde(rename = "oddsWire")]
    odds_wire: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostOrderResponse {
    order_id: String,
}

#[async_trait]
impl OrderGateway for HttpOrderGateway {
    async fn post_maker_order(
        &self,
        market_id: &MarketId,
        side: Side,
        stake_wire: u64,
        odds_wire: u64,
    ) -> Result<OrderId, CoreError> {
        assert_ladder_valid(odds_wire, self.ladder_step, self.odds_unit)?;

        with_retry(self.max_retries, self.retry_base_delay, self.retry_backoff, || {
            self.post_once(market_id, side, stake_wire, odds_wire)
        })
        .await
    }

    async fn cancel_orders(&self, order_ids: &[OrderId]) -> CancelOutcome {
        let mut outcome = CancelOutcome::default();
        for order_id in order_ids {
            let result = with_retry(self.max_retries, self.retry_base_delay, self.retry_backoff, || {
                self.cancel_once(order_id)
            })
            .await;
            match result {
                Ok(()) => outcome.cancelled.push(order_id.clone()),
                Err(CoreError::OrderGone { .. }) => {
                    // Already gone at the venue: not cancelled by us, but
                    // not a failure the caller should retry either.
                }
                Err(e) => outcome.failed.push((order_id.clone(), e)),
            }
        }
        outcome
    }
}
