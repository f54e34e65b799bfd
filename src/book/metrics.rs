//! Derived metrics computed from a [`MirrorView`]: best taker odds per side,
//! per-side liquidity, and vig.

use crate::book::mirror::{MakerOrder, MirrorView};
use crate::position::model::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideLiquidity {
    pub a: u64,
    pub b: u64,
}

/// Metrics returned to a single position, computed with that position's own
/// `min_for_odds`/`min_for_vig` qualification thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DerivedMetrics {
    /// Taker odds available on `position.chosen_side`, `None` if no
    /// qualifying opposite-side order exists.
    pub best_taker_odds: Option<u64>,
    /// `bestTakerOdds[A] + bestTakerOdds[B] - ODDS_UNIT`, signed because an
    /// underround market is possible in principle.
    pub vig: Option<i128>,
    pub liquidity: SideLiquidity,
}

/// Best qualifying maker odds in `orders` (remaining stake >= `min_stake`),
/// i.e. the maximum `maker_odds` among qualifying entries. `orders` is
/// assumed pre-sorted odds-descending, so this is a linear scan for the
/// first qualifying entry.
fn best_qualifying_maker_odds(orders: &[MakerOrder], min_stake: u64) -> Option<u64> {
    orders
        .iter()
        .find(|o| o.remaining_maker_stake() >= min_stake)
        .map(|o| o.maker_odds)
}

fn sum_capacity(orders: &[MakerOrder], odds_unit: u64) -> u64 {
    orders
        .iter()
        .map(|o| o.remaining_taker_capacity(odds_unit))
        .fold(0u64, |acc, c| acc.saturating_add(c))
}

/// Computes [`DerivedMetrics`] for a position betting `chosen_side`, from a
/// consistent mirror snapshot.
pub fn metrics_for(
    view: &MirrorView,
    chosen_side: Side,
    min_for_odds: u64,
    min_for_vig: u64,
    odds_unit: u64,
) -> DerivedMetrics {
    // bestTakerOdds[A] is derived from side-B maker orders (crossing a B
    // maker order means taking A), and vice versa.
    let best_a_for_odds = best_qualifying_maker_odds(&view.side_b, min_for_odds).map(|m| odds_unit - m);
    let best_b_for_odds = best_qualifying_maker_odds(&view.side_a, min_for_odds).map(|m| odds_unit - m);

    let best_taker_odds = match chosen_side {
        Side::A => best_a_for_odds,
        Side::B => best_b_for_odds,
    };

    let best_a_for_vig = best_qualifying_maker_odds(&view.side_b, min_for_vig).map(|m| odds_unit - m);
    let best_b_for_vig = best_qualifying_maker_odds(&view.side_a, min_for_vig).map(|m| odds_unit - m);
    let vig = match (best_a_for_vig, best_b_for_vig) {
        (Some(a), Some(b)) => Some(a as i128 + b as i128 - odds_unit as i128),
        _ => None,
    };

    let liquidity = SideLiquidity {
        a: sum_capacity(&view.side_b, odds_unit),
        b: sum_capacity(&view.side_a, odds_unit),
    };

    DerivedMetrics {
        best_taker_odds,
        vig,
        liquidity,
    }
}
