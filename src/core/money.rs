//! Fixed-point money helpers.
//!
//! All rounding in the crate is half-up (away from zero on ties). Intermediate
//! arithmetic stays unrounded.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round half-up to `dp` decimal places.
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Round half-up to cents.
pub fn round_cents(value: Decimal) -> Decimal {
    round_half_up(value, 2)
}

/// Round down to a multiple of `step` (used for index point numbers).
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}
