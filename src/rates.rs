//! Annual-rate / step-rate conversion and stochastic transition draws
//!
//! Pure functions, no hidden state. Rates in reference data are annual
//! (per person-year); the pipeline converts them to per-step rates with
//! `from_yearly` before any probability is realized.

use chrono::Duration;
use rand::Rng;
use rand::RngCore;

use crate::population::Mask;

pub const SECONDS_PER_YEAR: f64 = 365.0 * 86400.0;

/// Scale an annual rate to the step length.
pub fn from_yearly(rate: f64, step: Duration) -> f64 {
    rate * (step.num_seconds() as f64 / SECONDS_PER_YEAR)
}

/// Inverse of `from_yearly`.
pub fn to_yearly(rate: f64, step: Duration) -> f64 {
    rate / (step.num_seconds() as f64 / SECONDS_PER_YEAR)
}

/// Competing-risks conversion of a rate to a probability: `1 - exp(-rate)`.
/// Monotone in the rate and bounded in [0, 1); extreme rates saturate to
/// exactly 1.0 in floating point.
pub fn to_probability(rate: f64) -> f64 {
    let p = 1.0 - (-rate).exp();
    debug_assert!((0.0..=1.0).contains(&p), "probability out of range: {p}");
    p
}

/// Realize per-row transitions for per-step rates.
///
/// Consumes exactly one uniform variate per row, in ascending row order,
/// whether or not the row's rate is zero. Two runs with the same seed and
/// the same draw sequence therefore produce identical masks.
pub fn draw_mask(rates_per_step: &[f64], rng: &mut dyn RngCore) -> Mask {
    let bits = rates_per_step
        .iter()
        .map(|&rate| rng.random_range(0.0..1.0) < to_probability(rate))
        .collect();
    Mask::from_vec(bits)
}
