//! Position data model: the record the Position Store owns and the
//! Position Controller mutates under the Operation Serializer.

use crate::ids::{MarketId, OrderId, PositionId};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Created,
    Initializing,
    Active,
    RiskPaused,
    Completed,
    Closed,
}

impl PositionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PositionStatus::Completed | PositionStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    None,
    Active,
    Cancelled,
    Error,
}

/// Operator-supplied parameters for a new position, as taken by
/// `createPosition`.
#[derive(Debug, Clone)]
pub struct PositionSpec {
    pub market_id: MarketId,
    pub chosen_side: Side,
    pub max_stake: u64,
    /// Discount applied to the observed taker price before posting.
    pub premium_bps: u32,
    /// Maximum tolerated vig, in the same wire scale as `DerivedMetrics::vig`
    /// (i.e. `odds_unit`-scaled, not basis points).
    pub max_vig: i128,
    pub min_liquidity: u64,
    pub min_for_odds: u64,
    pub min_for_vig: u64,
}

/// A subset of [`PositionSpec`] fields an operator may revise in place via
/// `editPosition`.
#[derive(Debug, Clone, Default)]
pub struct PositionPatch {
    pub max_stake: Option<u64>,
    pub premium_bps: Option<u32>,
    pub max_vig: Option<i128>,
    pub min_liquidity: Option<u64>,
    pub min_for_odds: Option<u64>,
    pub min_for_vig: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Position {
    pub id: PositionId,
    pub market_id: MarketId,
    pub chosen_side: Side,
    pub max_stake: u64,
    pub filled_stake: u64,
    pub premium_bps: u32,
    pub max_vig: i128,
    pub min_liquidity: u64,
    pub min_for_odds: u64,
    pub min_for_vig: u64,

    pub status: PositionStatus,
    pub order_status: OrderStatus,
    pub active_order_id: Option<OrderId>,
    /// The maker odds quoted on the currently (or most recently) active
    /// order. Named `lastQuotedMakerOdds` in the repost-decision algorithm;
    /// the data model's `lastQuotedTakerOdds` refers to the same value.
    pub last_quoted_maker_odds: Option<u64>,
    /// The most recent `bestTakerOdds` observed for this position's market,
    /// cached on every `MarketDataEvent` so a later `FillEvent` or
    /// `OperatorEditEvent` can re-run "ensure order current" without a fresh
    /// metrics snapshot.
    pub last_best_taker_odds: Option<u64>,
    pub risk_breached: bool,
    pub closed_at: Option<DateTime<Utc>>,

    /// Wall-clock timestamp of the last post/cancel, for the
    /// `MIN_ORDER_UPDATE_INTERVAL` rate limit.
    pub last_order_action_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(id: PositionId, spec: PositionSpec) -> Self {
        Self {
            id,
            market_id: spec.market_id,
            chosen_side: spec.chosen_side,
            max_stake: spec.max_stake,
            filled_stake: 0,
            premium_bps: spec.premium_bps,
            max_vig: spec.max_vig,
            min_liquidity: spec.min_liquidity,
            min_for_odds: spec.min_for_odds,
            min_for_vig: spec.min_for_vig,
            status: PositionStatus::Created,
            order_status: OrderStatus::None,
            active_order_id: None,
            last_quoted_maker_odds: None,
            last_best_taker_odds: None,
            risk_breached: false,
            closed_at: None,
            last_order_action_at: None,
        }
    }

    pub fn is_complete(&self, complete_fraction: f64) -> bool {
        self.max_stake > 0
            && self.filled_stake as f64 >= self.max_stake as f64 * complete_fraction
    }

    pub fn apply_patch(&mut self, patch: PositionPatch) {
        if let Some(v) = patch.max_stake {
            self.max_stake = v;
        }
        if let Some(v) = patch.premium_bps {
            self.premium_bps = v;
        }
        if let Some(v) = patch.max_vig {
            self.max_vig = v;
        }
        if let Some(v) = patch.min_liquidity {
            self.min_liquidity = v;
        }
        if let Some(v) = patch.min_for_odds {
            self.min_for_odds = v;
        }
        if let Some(v) = patch.min_for_vig {
            self.min_for_vig = v;
        }
    }
}
