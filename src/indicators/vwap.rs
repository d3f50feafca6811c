// =============================================================================
// VWAP — Volume-Weighted Average Price with UTC daily reset
// =============================================================================
//
//   VWAP = Σ(typical_price * volume) / Σ(volume)
//
// scoped to the current UTC trading day. The cumulative state resets at the
// first candle whose UTC date differs from the previous candle's UTC date.
// The state is a plain per-symbol struct — the reset is a pure function of
// (previous date, cumulative state, incoming candle), with no globals.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::market_data::Candle;

/// Streaming VWAP accumulator for one symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VwapState {
    cumulative_pv: f64,
    cumulative_volume: f64,
    current_date: Option<NaiveDate>,
}

impl VwapState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one candle into the accumulator.
    ///
    /// Returns `true` when the candle opened a new UTC day and the
    /// cumulative state was reset before accumulating.
    pub fn apply(&mut self, candle: &Candle) -> bool {
        let date = candle.utc_date();
        let reset = match self.current_date {
            Some(prev) => prev != date,
            None => false,
        };
        if reset {
            self.cumulative_pv = 0.0;
            self.cumulative_volume = 0.0;
        }
        self.current_date = Some(date);
        self.cumulative_pv += candle.typical_price() * candle.volume;
        self.cumulative_volume += candle.volume;
        reset
    }

    /// Current VWAP, or `None` before any volume has accumulated today.
    pub fn value(&self) -> Option<f64> {
        if self.cumulative_volume <= 0.0 {
            return None;
        }
        let vwap = self.cumulative_pv / self.cumulative_volume;
        vwap.is_finite().then_some(vwap)
    }

    /// Volume accumulated since the last daily reset.
    pub fn cumulative_volume(&self) -> f64 {
        self.cumulative_volume
    }

    /// Drop all accumulated state (stop/start cycles).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Recompute the session VWAP over a candle slice, honouring every UTC-date
/// transition inside the slice. Agrees with the streaming [`VwapState`] to
/// within 1e-9 for equal inputs.
pub fn session_vwap(candles: &[Candle]) -> Option<f64> {
    vwap_series(candles).last().copied().flatten()
}

/// Per-candle VWAP series with daily resets, aligned to the input slice.
pub fn vwap_series(candles: &[Candle]) -> Vec<Option<f64>> {
    let mut state = VwapState::new();
    candles
        .iter()
        .map(|c| {
            state.apply(c);
            state.value()
        })
        .collect()
}

/// Signed distance of `price` from `vwap`, in percent of the VWAP.
pub fn distance_pct(price: f64, vwap: f64) -> f64 {
    if vwap == 0.0 {
        return 0.0;
    }
    (price - vwap) / vwap * 100.0
}
