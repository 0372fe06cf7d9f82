//! Precision check.
//!
//! An estimate has converged at `D` digits when it rounds to the same value
//! as Pi at `D - 1` decimal places. Both sides are scaled by `10^(D-1)` and
//! rounded to an integer, so ties are judged on the scaled binary value.

use crate::models::RoundingMode;

/// `value * 10^places`, rounded to an integer with `mode`.
pub fn round_scaled(value: f64, places: u32, mode: RoundingMode) -> f64 {
    let scaled = value * 10f64.powi(places as i32);
    match mode {
        RoundingMode::HalfEven => scaled.round_ties_even(),
        RoundingMode::HalfAwayFromZero => scaled.round(),
    }
}

/// Whether `estimate` agrees with Pi to `precision_digits` digits.
pub fn has_converged(estimate: f64, precision_digits: u32, mode: RoundingMode) -> bool {
    let places = precision_digits.saturating_sub(1);
    round_scaled(estimate, places, mode) == round_scaled(std::f64::consts::PI, places, mode)
}
