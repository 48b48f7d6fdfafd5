//! Fixed-precision rounding for persisted amounts.
//!
//! Every currency amount and adjusted quantity is snapped to 1e-10 after each
//! arithmetic step so that artifacts are byte-identical across runs.

/// Absolute precision applied to amounts.
pub const PRECISION: f64 = 1e-10;

const SCALE: f64 = 1e10;

/// Largest magnitude that still has sub-1e-10 resolution in an f64 mantissa.
const MAX_EXACT: f64 = 9.0e15 / SCALE;

/// Round to 10 decimal places.
///
/// Values too large to carry ten decimals are returned unchanged, as are
/// non-finite values.
pub fn round10(value: f64) -> f64 {
    if !value.is_finite() || value.abs() >= MAX_EXACT {
        return value;
    }
    let rounded = (value * SCALE).round() / SCALE;
    // Normalise negative zero so CSV output never prints "-0".
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Snap a price down onto the `tick` grid, never below zero.
///
/// A non-positive tick leaves the price untouched. Prices already on the
/// grid up to 1e-10 ticks stay where they are.
pub fn floor_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    round10(round10(price / tick).floor() * tick).max(0.0)
}

/// Snap a price up onto the `tick` grid, never below zero.
pub fn ceil_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    round10(round10(price / tick).ceil() * tick).max(0.0)
}
