// =============================================================================
// Smart entry — limit-order pricing for a freshly fired signal
// =============================================================================
//
// Entries are always limit orders, never market. For a BUY the calculator
// prefers the lesser of the signal candle's midpoint (minus a small offset)
// and VWAP when VWAP sits below the current price; SELL mirrors with the
// greater. A breakout entry anchored to a recent swing point takes
// precedence when it lands within a tight band of the fast EMA. A fresh
// top-of-book quote, when available, caps a BUY at the ask and floors a
// SELL at the bid so the limit cannot cross the spread.

use crate::indicators::SwingDetector;
use crate::market_data::{BookTicker, Candle};
use crate::types::SignalSide;

/// Priced entry for a limit order.
#[derive(Debug, Clone, Copy)]
pub struct EntryResult {
    pub entry_price: f64,
    /// Entry anchored to a recent swing point near the fast EMA.
    pub swing_anchored: bool,
}

pub struct SmartEntryCalculator {
    offset_pct: f64,
    max_ema_distance_pct: f64,
    detector: SwingDetector,
}

impl SmartEntryCalculator {
    pub fn new(offset_pct: f64, max_ema_distance_pct: f64, swing_lookback: usize) -> Self {
        Self {
            offset_pct,
            max_ema_distance_pct,
            detector: SwingDetector::new(swing_lookback),
        }
    }

    /// Price the entry for a BUY or SELL signal. Returns `None` for neutral
    /// signals, an empty window, or a degenerate (non-positive) price.
    pub fn calculate(
        &self,
        side: SignalSide,
        candles: &[Candle],
        ema_fast: Option<f64>,
        vwap: Option<f64>,
        book: Option<&BookTicker>,
    ) -> Option<EntryResult> {
        let current = candles.last()?;

        let (mut entry, mut swing_anchored) = match side {
            SignalSide::Buy => {
                let mut entry = current.midpoint() * (1.0 - self.offset_pct);
                if let Some(v) = vwap {
                    // VWAP below price is the better (lower) fill.
                    if v < current.close {
                        entry = entry.min(v);
                    }
                }
                (entry, false)
            }
            SignalSide::Sell => {
                let mut entry = current.midpoint() * (1.0 + self.offset_pct);
                if let Some(v) = vwap {
                    if v > current.close {
                        entry = entry.max(v);
                    }
                }
                (entry, false)
            }
            SignalSide::Neutral => return None,
        };

        // Swing-anchored breakout entry, if one sits close enough to the
        // fast EMA to be actionable.
        if let Some(ema) = ema_fast {
            if ema > 0.0 {
                let candidate = match side {
                    SignalSide::Buy => self
                        .detector
                        .find_recent_swing_high(candles)
                        .map(|s| s.price * (1.0 + self.offset_pct)),
                    SignalSide::Sell => self
                        .detector
                        .find_recent_swing_low(candles)
                        .map(|s| s.price * (1.0 - self.offset_pct)),
                    SignalSide::Neutral => None,
                };
                if let Some(candidate) = candidate {
                    if ((candidate - ema) / ema).abs() <= self.max_ema_distance_pct {
                        entry = candidate;
                        swing_anchored = true;
                    }
                }
            }
        }

        // Keep the limit on the passive side of a fresh book.
        if let Some(book) = book {
            match side {
                SignalSide::Buy if book.ask > 0.0 => entry = entry.min(book.ask),
                SignalSide::Sell if book.bid > 0.0 => entry = entry.max(book.bid),
                _ => {}
            }
        }

        (entry.is_finite() && entry > 0.0).then_some(EntryResult {
            entry_price: entry,
            swing_anchored,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candle(i: usize, open: f64, high: f64, low: f64, close: f64) -> Candle {
        let ts =
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(15 * i as i64);
        Candle::new(ts, open, high, low, close, 100.0).unwrap()
    }

    fn flat_candles(n: usize, price: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| candle(i, price, price + 1.0, price - 1.0, price))
            .collect()
    }

    fn calculator() -> SmartEntryCalculator {
        SmartEntryCalculator::new(0.001, 0.005, 5)
    }

    #[test]
    fn buy_uses_midpoint_minus_offset() {
        let candles = flat_candles(20, 100.0);
        let result = calculator()
            .calculate(SignalSide::Buy, &candles, None, None, None)
            .unwrap();
        // midpoint = 100, offset 0.1%
        assert!((result.entry_price - 99.9).abs() < 1e-9);
        assert!(!result.swing_anchored);
    }

    #[test]
    fn buy_prefers_vwap_when_below_price() {
        let candles = flat_candles(20, 100.0);
        let result = calculator()
            .calculate(SignalSide::Buy, &candles, None, Some(99.0), None)
            .unwrap();
        assert!((result.entry_price - 99.0).abs() < 1e-9);
    }

    #[test]
    fn buy_ignores_vwap_above_price() {
        let candles = flat_candles(20, 100.0);
        let result = calculator()
            .calculate(SignalSide::Buy, &candles, None, Some(101.0), None)
            .unwrap();
        assert!((result.entry_price - 99.9).abs() < 1e-9);
    }

    #[test]
    fn sell_mirrors_with_greater_price() {
        let candles = flat_candles(20, 100.0);
        let result = calculator()
            .calculate(SignalSide::Sell, &candles, None, Some(101.0), None)
            .unwrap();
        assert!((result.entry_price - 101.0).abs() < 1e-9);

        let result = calculator()
            .calculate(SignalSide::Sell, &candles, None, Some(99.0), None)
            .unwrap();
        assert!((result.entry_price - 100.1).abs() < 1e-9);
    }

    #[test]
    fn swing_anchored_entry_near_fast_ema() {
        // A confirmed swing high at 103.0 (index 10) dominating the flat
        // 101.0 highs around it.
        let mut candles = flat_candles(21, 100.0);
        candles[10] = candle(10, 100.0, 103.0, 99.0, 100.0);
        let ema_fast = 103.0; // swing entry 103.103 sits within 0.5% of it
        let result = calculator()
            .calculate(SignalSide::Buy, &candles, Some(ema_fast), None, None)
            .unwrap();
        assert!(result.swing_anchored);
        assert!((result.entry_price - 103.0 * 1.001).abs() < 1e-9);
    }

    #[test]
    fn distant_swing_is_not_anchored() {
        let mut candles = flat_candles(21, 100.0);
        candles[10] = candle(10, 100.0, 110.0, 99.0, 100.0);
        let result = calculator()
            .calculate(SignalSide::Buy, &candles, Some(100.0), None, None)
            .unwrap();
        assert!(!result.swing_anchored);
        assert!((result.entry_price - 99.9).abs() < 1e-9);
    }

    #[test]
    fn book_caps_buy_at_ask() {
        let candles = flat_candles(20, 100.0);
        let book = BookTicker {
            symbol: "BTCUSDT".to_string(),
            bid: 99.0,
            ask: 99.5,
            bid_qty: 1.0,
            ask_qty: 1.0,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        let result = calculator()
            .calculate(SignalSide::Buy, &candles, None, None, Some(&book))
            .unwrap();
        assert!((result.entry_price - 99.5).abs() < 1e-9);
    }

    #[test]
    fn neutral_side_yields_none() {
        let candles = flat_candles(20, 100.0);
        assert!(calculator()
            .calculate(SignalSide::Neutral, &candles, None, None, None)
            .is_none());
    }

    #[test]
    fn empty_window_yields_none() {
        assert!(calculator()
            .calculate(SignalSide::Buy, &[], None, None, None)
            .is_none());
    }
}
