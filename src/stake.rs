//! Stake arithmetic: nominal/wire conversions and the remaining-taker-space
//! formula, computed without truncation loss beyond a single final divide.

use num_bigint::BigUint;
use num_traits::ToPrimitive;

/// Nominal stake (display units) to wire units.
pub fn nominal_to_wire(nominal: f64, stake_unit: u64) -> u64 {
    (nominal * stake_unit as f64).round() as u64
}

/// Wire units back to nominal stake, for display only.
pub fn wire_to_nominal(wire: u64, stake_unit: u64) -> f64 {
    wire as f64 / stake_unit as f64
}

/// Remaining taker capacity for a maker order:
/// `remainingMakerStake * (ODDS_UNIT - makerOdds) / makerOdds`, computed
/// exactly in arbitrary precision with a single final integer divide.
///
/// Returns zero if `maker_odds` is zero (shouldn't happen for a valid maker
/// order, but the mirror must never panic on a malformed delta).
pub fn remaining_taker_capacity(remaining_maker_stake: u64, maker_odds: u64, odds_unit: u64) -> u64 {
    if maker_odds == 0 {
        return 0;
    }
    let numerator =
        BigUint::from(remaining_maker_stake) * BigUint::from(odds_unit.saturating_sub(maker_odds));
    let capacity = &numerator / BigUint::from(maker_odds);
    capacity.to_u64().unwrap_or(u64::MAX)
}
