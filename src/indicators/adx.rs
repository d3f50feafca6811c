// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
// ADX quantifies trend **strength** regardless of direction.
//
// Calculation pipeline:
//   1. Compute +DM (positive directional movement) and -DM per bar — only the
//      greater of the up/down move counts, and only when positive.
//   2. Compute True Range (TR) per bar.
//   3. Apply Wilder's smoothing (period) to +DM, -DM, and TR.
//   4. Derive +DI = smoothed(+DM) / smoothed(TR) * 100
//            -DI = smoothed(-DM) / smoothed(TR) * 100
//   5. DX  = |+DI - -DI| / (+DI + -DI) * 100
//   6. ADX = Wilder's smoothed average of DX over `period` bars.
//
// Interpretation: ADX > 25 => trending market; below => ranging / choppy.
// The signal engine never rejects on a low ADX — it applies a confidence
// penalty instead.

use serde::{Deserialize, Serialize};

use crate::market_data::Candle;
use crate::indicators::atr::true_range;

/// ADX threshold above which the market counts as trending.
pub const TREND_THRESHOLD: f64 = 25.0;

/// Directional-movement result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdxResult {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

impl AdxResult {
    /// ADX above 25 denotes a trending market.
    pub fn is_trending(&self) -> bool {
        self.adx > TREND_THRESHOLD
    }
}

/// Compute the most recent ADX (plus both DI lines) from OHLCV candles.
///
/// Returns `None` when:
/// - `period` is zero.
/// - There are fewer than `2 * period + 1` candles (`period` bars for the
///   initial Wilder smoothing **and** another `period` DX values to seed the
///   ADX average, plus the first candle that has no predecessor).
/// - Any intermediate calculation produces a non-finite result.
pub fn calculate_adx(candles: &[Candle], period: usize) -> Option<AdxResult> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return None;
    }

    let period_f = period as f64;
    let bar_count = candles.len() - 1;

    // ── Step 1 & 2: raw +DM, -DM, TR per bar transition ──────────────────
    let mut plus_dm = Vec::with_capacity(bar_count);
    let mut minus_dm = Vec::with_capacity(bar_count);
    let mut tr_vals = Vec::with_capacity(bar_count);

    for w in candles.windows(2) {
        let (prev, curr) = (&w[0], &w[1]);

        let up_move = curr.high - prev.high;
        let down_move = prev.low - curr.low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
        tr_vals.push(true_range(curr, prev));
    }

    // ── Step 3: Wilder's smoothing seeded with the first `period` sums ───
    let mut smooth_plus_dm: f64 = plus_dm[..period].iter().sum();
    let mut smooth_minus_dm: f64 = minus_dm[..period].iter().sum();
    let mut smooth_tr: f64 = tr_vals[..period].iter().sum();

    let mut dx_values: Vec<f64> = Vec::with_capacity(bar_count - period + 1);
    let (mut plus_di, mut minus_di);

    match compute_di_dx(smooth_plus_dm, smooth_minus_dm, smooth_tr) {
        Some((p, m, dx)) => {
            plus_di = p;
            minus_di = m;
            dx_values.push(dx);
        }
        None => return None,
    }

    for i in period..bar_count {
        smooth_plus_dm = smooth_plus_dm - smooth_plus_dm / period_f + plus_dm[i];
        smooth_minus_dm = smooth_minus_dm - smooth_minus_dm / period_f + minus_dm[i];
        smooth_tr = smooth_tr - smooth_tr / period_f + tr_vals[i];

        match compute_di_dx(smooth_plus_dm, smooth_minus_dm, smooth_tr) {
            Some((p, m, dx)) => {
                plus_di = p;
                minus_di = m;
                dx_values.push(dx);
            }
            None => return None,
        }
    }

    // ── Step 6: ADX = Wilder-smoothed DX ─────────────────────────────────
    if dx_values.len() < period {
        return None;
    }

    let mut adx = dx_values[..period].iter().sum::<f64>() / period_f;
    if !adx.is_finite() {
        return None;
    }
    for &dx in &dx_values[period..] {
        adx = (adx * (period_f - 1.0) + dx) / period_f;
        if !adx.is_finite() {
            return None;
        }
    }

    Some(AdxResult {
        adx,
        plus_di,
        minus_di,
    })
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Derive (+DI, -DI, DX) from smoothed +DM, -DM, and TR.
///
/// Returns `None` when smoothed TR is zero or the result is non-finite. A DI
/// sum of zero (no directional movement at all) maps to DX = 0.
fn compute_di_dx(smooth_plus_dm: f64, smooth_minus_dm: f64, smooth_tr: f64) -> Option<(f64, f64, f64)> {
    if smooth_tr == 0.0 {
        return None;
    }

    let plus_di = (smooth_plus_dm / smooth_tr) * 100.0;
    let minus_di = (smooth_minus_dm / smooth_tr) * 100.0;

    let di_sum = plus_di + minus_di;
    let dx = if di_sum == 0.0 {
        0.0
    } else {
        ((plus_di - minus_di).abs() / di_sum) * 100.0
    };

    dx.is_finite().then_some((plus_di, minus_di, dx))
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(i * 15);
        Candle::new(ts, open, high, low, close, 1.0).unwrap()
    }

    #[test]
    fn adx_period_zero() {
        let candles: Vec<Candle> = (0..50).map(|i| candle(i, 1.0, 2.0, 0.5, 1.5)).collect();
        assert!(calculate_adx(&candles, 0).is_none());
    }

    #[test]
    fn adx_insufficient_data() {
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, 1.0, 2.0, 0.5, 1.5)).collect();
        assert!(calculate_adx(&candles, 14).is_none());
    }

    #[test]
    fn adx_strong_uptrend() {
        // Consecutive higher highs and higher lows — a strong trend.
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(i, base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();

        let result = calculate_adx(&candles, 14).unwrap();
        assert!(
            result.adx > 25.0,
            "expected ADX > 25 for strong trend, got {}",
            result.adx
        );
        assert!(result.is_trending());
        assert!(result.plus_di > result.minus_di);
    }

    #[test]
    fn adx_strong_downtrend_di_ordering() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 300.0 - i as f64 * 2.0;
                candle(i, base, base + 0.5, base - 1.5, base - 1.0)
            })
            .collect();

        let result = calculate_adx(&candles, 14).unwrap();
        assert!(result.adx > 25.0);
        assert!(result.minus_di > result.plus_di);
    }

    #[test]
    fn adx_flat_market() {
        // Identical candles — no directional movement, ADX converges to 0.
        let candles: Vec<Candle> = (0..60).map(|i| candle(i, 100.0, 101.0, 99.0, 100.0)).collect();
        let result = calculate_adx(&candles, 14).unwrap();
        assert!(result.adx < 1.0, "expected ADX near 0, got {}", result.adx);
        assert!(!result.is_trending());
    }

    #[test]
    fn adx_result_range() {
        let candles: Vec<Candle> = (0..100)
            .map(|i| {
                let base = 50.0 + (i as f64 * 0.3).sin() * 10.0;
                candle(i, base - 0.5, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        if let Some(result) = calculate_adx(&candles, 14) {
            assert!((0.0..=100.0).contains(&result.adx));
            assert!(result.plus_di >= 0.0 && result.minus_di >= 0.0);
        }
    }

    #[test]
    fn adx_minimum_candles_exact() {
        // Exactly 2*period + 1 candles should produce a result.
        let period = 5;
        let min = 2 * period + 1;
        let candles: Vec<Candle> = (0..min as i64)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(i, base, base + 1.0, base - 0.5, base + 0.5)
            })
            .collect();
        assert!(calculate_adx(&candles, period).is_some());
        assert!(calculate_adx(&candles[..min - 1], period).is_none());
    }
}
