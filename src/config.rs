//! Venue constants and operational tunables.
//!
//! Mirrors the teacher's `Config::from_env` shape: `dotenv` loads a local
//! `.env` if present, then every field is read from the environment with a
//! sane default and a forgiving parse.

use std::time::Duration;

/// Wire-format constants and tunables from §6 of the spec. These are
/// process-wide and loaded once at start-up.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Integer representing 100% implied probability.
    pub odds_unit: u64,
    /// Permitted odds values are multiples of this, in wire units.
    pub ladder_step: u64,
    /// Multiplier converting a nominal stake to its wire representation.
    pub stake_unit: u64,

    /// Fraction of `maxStake` at which a position is considered complete.
    pub complete_fraction: f64,
    /// How long a cancelled order id is still eligible to be credited with
    /// a late fill.
    pub recent_cancel_ttl: Duration,
    /// Minimum spacing between order-affecting actions for one position.
    pub min_order_update_interval: Duration,
    /// How long to wait after a cancel comes back with zero cancelled, to
    /// give the pending fill event a chance to land before sizing a repost
    /// off of `filled_stake`.
    pub zero_cancel_recheck_delay: Duration,
    /// Poll cadence used by the fallback transport.
    pub poll_fallback_interval: Duration,
    /// Maximum automatic retries for a single gateway call.
    pub max_retries: u32,
    /// Base delay before the first retry; doubles (by `retry_backoff`)
    /// on each subsequent attempt.
    pub retry_base_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub retry_backoff: u32,

    /// How long `subscribe` waits for the push channel before falling back
    /// to polling.
    pub push_connect_window: Duration,

    /// Venue push (WebSocket) endpoint.
    pub ws_url: String,
    /// Venue REST base URL, used for snapshot fetches and as the poll
    /// fallback transport and for order posting/cancellation.
    pub rest_base_url: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            odds_unit: 1_000_000,
            ladder_step: 1_000,
            stake_unit: 100,
            complete_fraction: 0.99,
            recent_cancel_ttl: Duration::from_secs(60),
            min_order_update_interval: Duration::from_millis(2_500),
            zero_cancel_recheck_delay: Duration::from_millis(200),
            poll_fallback_interval: Duration::from_secs(10),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_backoff: 2,
            push_connect_window: Duration::from_secs(5),
            ws_url: "wss://exchange.example/ws/market".to_string(),
            rest_base_url: "https://exchange.example/api".to_string(),
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("MAKER_ODDS_UNIT") {
            if let Ok(n) = v.parse() {
                cfg.odds_unit = n;
            }
        }
        if let Ok(v) = std::env::var("MAKER_LADDER_STEP") {
            if let Ok(n) = v.parse() {
                cfg.ladder_step = n;
            }
        }
        if let Ok(v) = std::env::var("MAKER_STAKE_UNIT") {
            if let Ok(n) = v.parse() {
                cfg.stake_unit = n;
            }
        }
        if let Ok(v) = std::env::var("MAKER_COMPLETE_FRACTION") {
            if let Ok(f) = v.parse::<f64>() {
                if f > 0.0 && f <= 1.0 {
                    cfg.complete_fraction = f;
                }
            }
        }
        if let Ok(v) = std::env::var("MAKER_RECENT_CANCEL_TTL_SECS") {
            if let Ok(n) = v.parse() {
                cfg.recent_cancel_ttl = Duration::from_secs(n);
            }
        }
        if let Ok(v) = std::env::var("MAKER_MIN_ORDER_UPDATE_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                cfg.min_order_update_interval = Duration::from_millis(n);
            }
        }
        if let Ok(v) = std::env::var("MAKER_ZERO_CANCEL_RECHECK_DELAY_MS") {
            if let Ok(n) = v.parse() {
                cfg.zero_cancel_recheck_delay = Duration::from_millis(n);
            }
        }
        if let Ok(v) = std::env::var("MAKER_POLL_FALLBACK_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                cfg.poll_fallback_interval = Duration::from_secs(n);
            }
        }
        if let Ok(v) = std::env::var("MAKER_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                cfg.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("MAKER_RETRY_BASE_DELAY_MS") {
            if let Ok(n) = v.parse() {
                cfg.retry_base_delay = Duration::from_millis(n);
            }
        }
        if let Ok(v) = std::env::var("MAKER_RETRY_BACKOFF") {
            if let Ok(n) = v.parse() {
                cfg.retry_backoff = n;
            }
        }
        if let Ok(v) = std::env::var("MAKER_PUSH_CONNECT_WINDOW_SECS") {
            if let Ok(n) = v.parse() {
                cfg.push_connect_window = Duration::from_secs(n);
            }
        }
        if let Ok(v) = std::env::var("MAKER_WS_URL") {
            cfg.ws_url = v;
        }
        if let Ok(v) = std::env::var("MAKER_REST_BASE_URL") {
            cfg.rest_base_url = v;
        }

        cfg
    }
}

/// Signing identity the order gateway uses to authenticate with the venue.
/// Credential *loading* (key files, vaults, etc.) is out of scope; the core
/// just accepts the resulting values.
#[derive(Clone)]
pub struct SigningIdentity {
    pub maker_id: crate::ids::MakerId,
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("maker_id", &self.maker_id)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
