// =============================================================================
// Swing point detection — structural highs/lows for entries, stops, and TPs
// =============================================================================
//
// A swing high at index i is a candle whose high strictly exceeds every high
// in the `lookback` candles on each side; a swing low mirrors with lows.
// Strength is the lookback itself — there is no finer-grained score.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market_data::Candle;

/// A detected swing extreme.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwingPoint {
    /// High (swing high) or low (swing low) at the extreme.
    pub price: f64,
    /// Index of the extreme in the candle slice.
    pub index: usize,
    /// Number of candles on each side that the extreme dominates.
    pub strength: usize,
}

/// Detector for swing highs and lows in price action.
#[derive(Debug, Clone)]
pub struct SwingDetector {
    lookback: usize,
}

impl SwingDetector {
    /// `lookback` candles on each side must be dominated for a swing to
    /// count. A lookback of zero is meaningless and clamps to one.
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(1),
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// The most recent swing high, or `None` when fewer than
    /// `2 * lookback + 1` candles are available or no extreme qualifies.
    pub fn find_recent_swing_high(&self, candles: &[Candle]) -> Option<SwingPoint> {
        self.find_recent(candles, Extreme::High)
    }

    /// The most recent swing low.
    pub fn find_recent_swing_low(&self, candles: &[Candle]) -> Option<SwingPoint> {
        self.find_recent(candles, Extreme::Low)
    }

    fn find_recent(&self, candles: &[Candle], extreme: Extreme) -> Option<SwingPoint> {
        let l = self.lookback;
        if candles.len() < 2 * l + 1 {
            debug!(
                needed = 2 * l + 1,
                got = candles.len(),
                "insufficient candles for swing detection"
            );
            return None;
        }

        // A swing cannot be confirmed until `lookback` candles exist after it,
        // so the search runs backwards from len - lookback - 1.
        for i in (l..candles.len() - l).rev() {
            if self.is_swing(candles, i, extreme) {
                let price = match extreme {
                    Extreme::High => candles[i].high,
                    Extreme::Low => candles[i].low,
                };
                return Some(SwingPoint {
                    price,
                    index: i,
                    strength: l,
                });
            }
        }
        None
    }

    /// All swing lows (supports) and swing highs (resistances) in the slice,
    /// each list capped at `num_levels` entries nearest the extremes:
    /// supports sorted ascending, resistances descending.
    pub fn support_resistance_levels(
        &self,
        candles: &[Candle],
        num_levels: usize,
    ) -> (Vec<f64>, Vec<f64>) {
        let l = self.lookback;
        if candles.len() < 2 * l + 1 {
            return (Vec::new(), Vec::new());
        }

        let mut supports = Vec::new();
        let mut resistances = Vec::new();
        for i in l..candles.len() - l {
            if self.is_swing(candles, i, Extreme::High) {
                resistances.push(candles[i].high);
            }
            if self.is_swing(candles, i, Extreme::Low) {
                supports.push(candles[i].low);
            }
        }

        supports.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        resistances.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        supports.truncate(num_levels);
        resistances.truncate(num_levels);
        (supports, resistances)
    }

    fn is_swing(&self, candles: &[Candle], index: usize, extreme: Extreme) -> bool {
        let l = self.lookback;
        if index < l || index + l >= candles.len() {
            return false;
        }
        match extreme {
            Extreme::High => {
                let h = candles[index].high;
                candles[index - l..index].iter().all(|c| c.high < h)
                    && candles[index + 1..=index + l].iter().all(|c| c.high < h)
            }
            Extreme::Low => {
                let low = candles[index].low;
                candles[index - l..index].iter().all(|c| c.low > low)
                    && candles[index + 1..=index + l].iter().all(|c| c.low > low)
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Extreme {
    High,
    Low,
}

/// Nearest level strictly above `price`, if any.
pub fn nearest_level_above(price: f64, levels: &[f64]) -> Option<f64> {
    levels
        .iter()
        .copied()
        .filter(|&l| l > price)
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

/// Nearest level strictly below `price`, if any.
pub fn nearest_level_below(price: f64, levels: &[f64]) -> Option<f64> {
    levels
        .iter()
        .copied()
        .filter(|&l| l < price)
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}
