// =============================================================================
// Stochastic RSI — oscillator used as the entry trigger
// =============================================================================
//
// Combines Stochastic normalisation with RSI for faster intraday signals:
//   1. RSI(rsi_period) using a rolling mean of gains/losses
//   2. StochRSI = (RSI - min(RSI, stoch_period)) / (max - min) * 100
//      (a flat RSI window yields 50 — no information either way)
//   3. %K = SMA(StochRSI, k_period)
//   4. %D = SMA(%K, d_period)
//
// %K < 20 plus a cross up is the bullish trigger; %K > 80 plus a cross down
// the bearish one. Crosses are detected against the previous K/D pair.

use serde::{Deserialize, Serialize};

use crate::indicators::rsi::rolling_mean_rsi;

/// Zone of the %K line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StochRsiZone {
    Oversold,
    Neutral,
    Overbought,
}

/// Stochastic RSI reading for the most recent close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StochRsi {
    /// Fast line.
    pub k: f64,
    /// Slow (signal) line.
    pub d: f64,
    /// Underlying RSI value.
    pub rsi: f64,
    pub zone: StochRsiZone,
    /// K < 20.
    pub is_oversold: bool,
    /// K > 80.
    pub is_overbought: bool,
    /// K crossed above D between the previous and current bar.
    pub k_cross_up: bool,
    /// K crossed below D between the previous and current bar.
    pub k_cross_down: bool,
}

/// Compute the Stochastic RSI for the latest close.
///
/// Requires at least `rsi_period + stoch_period + k_period + d_period`
/// closes; returns `None` otherwise (or when any period is zero).
pub fn calculate_stoch_rsi(
    closes: &[f64],
    rsi_period: usize,
    stoch_period: usize,
    k_period: usize,
    d_period: usize,
) -> Option<StochRsi> {
    let (k_line, d_line, rsi) =
        stoch_rsi_series(closes, rsi_period, stoch_period, k_period, d_period)?;

    let n = closes.len();
    let k = k_line[n - 1]?;
    let d = d_line[n - 1]?;
    let rsi_current = rsi[n - 1]?;

    // Previous pair for crossover detection; fall back to the current pair
    // when history is too short (no cross by definition).
    let k_prev = k_line[n - 2].unwrap_or(k);
    let d_prev = d_line[n - 2].unwrap_or(d);

    let zone = if k < 20.0 {
        StochRsiZone::Oversold
    } else if k > 80.0 {
        StochRsiZone::Overbought
    } else {
        StochRsiZone::Neutral
    };

    Some(StochRsi {
        k,
        d,
        rsi: rsi_current,
        zone,
        is_oversold: k < 20.0,
        is_overbought: k > 80.0,
        k_cross_up: k_prev <= d_prev && k > d,
        k_cross_down: k_prev >= d_prev && k < d,
    })
}

/// Full %K / %D / RSI series aligned to the input closes (charting and
/// backtest consumers). `None` entries mark incomplete windows.
#[allow(clippy::type_complexity)]
pub fn stoch_rsi_series(
    closes: &[f64],
    rsi_period: usize,
    stoch_period: usize,
    k_period: usize,
    d_period: usize,
) -> Option<(Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>)> {
    if rsi_period == 0 || stoch_period == 0 || k_period == 0 || d_period == 0 {
        return None;
    }
    let min_required = rsi_period + stoch_period + k_period + d_period;
    if closes.len() < min_required {
        return None;
    }

    let rsi = rolling_mean_rsi(closes, rsi_period);

    // Stochastic normalisation of the RSI over `stoch_period`.
    let mut stoch = vec![None; closes.len()];
    for i in 0..closes.len() {
        if i + 1 < stoch_period {
            continue;
        }
        let window = &rsi[i + 1 - stoch_period..=i];
        if window.iter().any(Option::is_none) {
            continue;
        }
        let lo = window.iter().flatten().fold(f64::MAX, |a, &b| a.min(b));
        let hi = window.iter().flatten().fold(f64::MIN, |a, &b| a.max(b));
        let span = hi - lo;
        let value = if span.abs() < 1e-9 {
            50.0
        } else {
            (rsi[i].unwrap_or(lo) - lo) / span * 100.0
        };
        stoch[i] = value.is_finite().then_some(value);
    }

    let k_line = rolling_mean(&stoch, k_period);
    let d_line = rolling_mean(&k_line, d_period);
    Some((k_line, d_line, rsi))
}

/// Rolling mean over an `Option` series; a window containing any `None`
/// stays `None`.
fn rolling_mean(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; series.len()];
    if window == 0 {
        return out;
    }
    for i in 0..series.len() {
        if i + 1 < window {
            continue;
        }
        let slice = &series[i + 1 - window..=i];
        if slice.iter().any(Option::is_none) {
            continue;
        }
        let mean = slice.iter().flatten().sum::<f64>() / window as f64;
        out[i] = mean.is_finite().then_some(mean);
    }
    out
}
