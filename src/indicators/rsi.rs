// =============================================================================
// Relative Strength Index (RSI)
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Two smoothing variants are provided:
//   * `calculate_rsi` — Wilder's smoothing (the classic indicator),
//   * `rolling_mean_rsi` — plain rolling-mean of gains/losses, which is what
//     the Stochastic RSI normalisation consumes.
//
// Thresholds: RSI > 70 => OVERBOUGHT, RSI < 30 => OVERSOLD.

use serde::{Deserialize, Serialize};

/// Zone label for an RSI reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsiZone {
    Oversold,
    Neutral,
    Overbought,
}

/// Bucket an RSI value: < 30 oversold, > 70 overbought.
pub fn rsi_zone(value: f64) -> RsiZone {
    if value < 30.0 {
        RsiZone::Oversold
    } else if value > 70.0 {
        RsiZone::Overbought
    } else {
        RsiZone::Neutral
    }
}

/// Compute the full RSI series using Wilder's smoothing.
///
/// The returned vector has one RSI value for each close starting at index
/// `period` (the first `period` closes seed the averages).
///
/// # Edge cases
/// - `period == 0` => empty vec
/// - `closes.len() < period + 1` => empty vec (need at least `period` deltas)
/// - Average loss of zero clamps RSI to 100; a fully flat market yields 50.
/// - Non-finite results truncate the series.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // Seed averages with the SMA of the first `period` deltas.
    let (sum_gain, sum_loss) = deltas[..period]
        .iter()
        .fold((0.0_f64, 0.0_f64), |(g, l), &d| {
            if d > 0.0 {
                (g + d, l)
            } else {
                (g, l + d.abs())
            }
        });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let Some(first_rsi) = rsi_from_averages(avg_gain, avg_loss) else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    result.push(first_rsi);

    for &delta in &deltas[period..] {
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { delta.abs() } else { 0.0 };

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        match rsi_from_averages(avg_gain, avg_loss) {
            Some(rsi) => result.push(rsi),
            None => break,
        }
    }

    result
}

/// Most recent Wilder RSI value, or `None` when not ready.
pub fn latest_rsi(closes: &[f64], period: usize) -> Option<f64> {
    calculate_rsi(closes, period).last().copied()
}

/// RSI series smoothed with a plain rolling mean of gains and losses.
///
/// Output is aligned to the input: `result[i]` corresponds to `closes[i]`,
/// with `None` where the window is incomplete. The Stochastic RSI kernel
/// normalises this series rather than the Wilder one.
pub fn rolling_mean_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return result;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    for i in (period - 1)..deltas.len() {
        let window = &deltas[i + 1 - period..=i];
        let gain: f64 = window.iter().filter(|&&d| d > 0.0).sum::<f64>() / period as f64;
        let loss: f64 = window
            .iter()
            .filter(|&&d| d < 0.0)
            .map(|d| d.abs())
            .sum::<f64>()
            / period as f64;
        result[i + 1] = rsi_from_averages(gain, loss);
    }

    result
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0 // No movement at all.
    } else if avg_loss == 0.0 {
        100.0 // All gains, no losses.
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}
