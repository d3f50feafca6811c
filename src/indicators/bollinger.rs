// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA(period); upper/lower = middle ± k standard deviations.
// Bandwidth = (upper - lower) / middle * 100. %B locates the price within the
// envelope: (price - lower) / (upper - lower), with a clamped denominator so
// a flat window cannot divide by zero.

use serde::{Deserialize, Serialize};

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    /// Normalised envelope width in percent of the middle band.
    pub bandwidth: f64,
    /// Price position within the envelope: 0 at the lower band, 1 at the upper.
    pub percent_b: f64,
}

/// Calculate Bollinger Bands over the last `period` closes.
///
/// Returns `None` when:
/// - `period` is zero or fewer than `period` closes are available.
/// - The middle band is zero (degenerate input).
/// - Any component is non-finite.
pub fn calculate_bollinger(
    closes: &[f64],
    period: usize,
    num_std: f64,
    price: f64,
) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    if middle == 0.0 || !middle.is_finite() {
        return None;
    }

    let variance = window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    let upper = middle + num_std * std_dev;
    let lower = middle - num_std * std_dev;
    let bandwidth = (upper - lower) / middle * 100.0;

    let span = upper - lower;
    let percent_b = if span.abs() < 1e-9 {
        0.5 // flat envelope — price is by definition at the middle
    } else {
        (price - lower) / span
    };

    if bandwidth.is_finite() && percent_b.is_finite() {
        Some(BollingerBands {
            upper,
            middle,
            lower,
            bandwidth,
            percent_b,
        })
    } else {
        None
    }
}

/// Whether `price` sits within `threshold_pct` of the lower band (at or
/// below `lower * (1 + threshold)`). Used to detect pullbacks to value.
pub fn is_near_lower_band(price: f64, lower: f64, threshold_pct: f64) -> bool {
    price <= lower * (1.0 + threshold_pct)
}

/// Mirror of [`is_near_lower_band`] for rallies into the upper band.
pub fn is_near_upper_band(price: f64, upper: f64, threshold_pct: f64) -> bool {
    price >= upper * (1.0 - threshold_pct)
}
