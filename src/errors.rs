//! Core error taxonomy.
//!
//! Every failure the core can produce maps onto one of these variants. The
//! distinction that matters operationally is [`CoreError::is_transient`]:
//! transient errors get retried with backoff by the gateway, non-transient
//! ones fail fast and surface as `orderStatus = Error` on the position.

use crate::ids::{MarketId, OrderId};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Network/disconnect/auth-lapse errors from a transport or gateway call.
    /// Reconnect/backoff already happened internally; this is the residual
    /// failure after those attempts were exhausted.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// A submitted or computed odds value violates the ladder or the
    /// `(0, ODDS_UNIT)` open interval.
    #[error("invalid odds {odds} ({reason})")]
    InvalidOdds { odds: u64, reason: &'static str },

    /// The venue rejected an order for a business reason (not a ladder
    /// violation we could have caught locally).
    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },

    /// A cancel request matched zero live orders at the venue. Not an error
    /// condition by itself; the caller reconciles via the pending fill path.
    #[error("order already gone: {order_id:?}")]
    OrderGone { order_id: OrderId },

    /// The venue is rate-limiting us. Retried like `Transport`; reported
    /// distinctly so callers can log it separately.
    #[error("rate limited")]
    RateLimited,

    /// The position was deleted while an operation for it was queued or
    /// in flight.
    #[error("position gone")]
    PositionGone,

    /// Bad operator input at position creation/edit time. No state mutation
    /// happens when this is returned.
    #[error("invalid configuration: {message}")]
    ConfigInvalid { message: String },

    /// A market we have no mirror/subscription for was referenced.
    #[error("unknown market: {0:?}")]
    UnknownMarket(MarketId),
}

impl CoreError {
    /// Whether retrying the same operation after a backoff delay is
    /// worthwhile. Non-transient errors should fail immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transport { .. } | CoreError::RateLimited)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        CoreError::Transport {
            message: message.into(),
        }
    }

    pub fn invalid_odds(odds: u64, reason: &'static str) -> Self {
        CoreError::InvalidOdds { odds, reason }
    }
}
