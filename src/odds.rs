//! Odds arithmetic: wire/implied conversions, ladder quantization, premium.
//!
//! Wire odds are integers in `[0, ODDS_UNIT)`. All arithmetic that feeds an
//! order submission goes through `num_bigint::BigUint` so that a venue with
//! a very large `ODDS_UNIT` can't silently overflow a fixed-width integer;
//! only the display-only `implied_of_wire` touches `f64`.

use crate::errors::CoreError;
use num_bigint::BigUint;
use num_traits::ToPrimitive;

/// Lossy conversion to a `[0, 1)` probability, for display only. Never feed
/// the result back into an order submission.
pub fn implied_of_wire(odds_wire: u64, odds_unit: u64) -> f64 {
    odds_wire as f64 / odds_unit as f64
}

/// Inverse of [`implied_of_wire`]. Also display-only / test-only; rounds to
/// the nearest wire integer.
pub fn wire_of_implied(probability: f64, odds_unit: u64) -> u64 {
    (probability * odds_unit as f64).round() as u64
}

/// Rounds `x` down to the nearest multiple of `ladder_step`. Fails if the
/// result would land on or outside `(0, odds_unit)`.
pub fn quantize_to_ladder(x: u64, ladder_step: u64, odds_unit: u64) -> Result<u64, CoreError> {
    if ladder_step == 0 {
        return Err(CoreError::invalid_odds(x, "ladder step is zero"));
    }
    let quantized = (x / ladder_step) * ladder_step;
    if quantized == 0 || quantized >= odds_unit {
        return Err(CoreError::invalid_odds(
            x,
            "quantized odds fall outside (0, ODDS_UNIT)",
        ));
    }
    Ok(quantized)
}

/// Asserts a wire odds value is already ladder-valid (divisible by
/// `ladder_step` and strictly inside `(0, odds_unit)`), without re-rounding
/// it. Used just before order submission per §4.5.
pub fn assert_ladder_valid(x: u64, ladder_step: u64, odds_unit: u64) -> Result<(), CoreError> {
    if x == 0 || x >= odds_unit {
        return Err(CoreError::invalid_odds(x, "odds outside (0, ODDS_UNIT)"));
    }
    if ladder_step == 0 || x % ladder_step != 0 {
        return Err(CoreError::invalid_odds(x, "odds not on the ladder"));
    }
    Ok(())
}

/// Computes the posted maker odds for a given taker price and discount:
/// `takerOdds * (10_000 - premiumBps) / 10_000`, quantized onto the ladder.
/// Returns `Ok(None)` when the premium-adjusted price quantizes to zero
/// (§9: suppress the post rather than fail).
pub fn apply_premium(
    taker_odds_wire: u64,
    premium_bps: u32,
    ladder_step: u64,
    odds_unit: u64,
) -> Result<Option<u64>, CoreError> {
    if premium_bps > 9_999 {
        return Err(CoreError::ConfigInvalid {
            message: format!("premiumBps {premium_bps} out of range [0, 9999]"),
        });
    }

    let numerator = BigUint::from(taker_odds_wire) * BigUint::from(10_000u32 - premium_bps);
    let raw = (&numerator / BigUint::from(10_000u32))
        .to_u64()
        .unwrap_or(u64::MAX);

    match quantize_to_ladder(raw, ladder_step, odds_unit) {
        Ok(q) => Ok(Some(q)),
        Err(CoreError::InvalidOdds { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
