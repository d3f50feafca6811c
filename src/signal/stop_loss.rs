// =============================================================================
// Stop-loss placement — structural vs volatility, most conservative wins
// =============================================================================
//
// For a BUY the candidates are:
//   * structural — below the most recent swing low minus a 0.1% buffer, or
//     below the slow EMA minus the same buffer (whichever is lower),
//   * volatility — entry minus ATR times a per-timeframe multiplier.
// The lowest candidate wins (mirrored for SELL: the highest). A stop closer
// than the minimum distance is inflated out to it; with no candidates at all
// the minimum distance itself is the fallback.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::SwingDetector;
use crate::market_data::Candle;
use crate::types::{SignalSide, Timeframe};

/// Which rule produced the stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopType {
    Swing,
    Ema,
    Atr,
    Fallback,
}

impl std::fmt::Display for StopType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Swing => write!(f, "swing"),
            Self::Ema => write!(f, "ema"),
            Self::Atr => write!(f, "atr"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StopLossResult {
    pub stop_loss: f64,
    pub stop_type: StopType,
    /// |entry - stop| as a fraction of entry.
    pub distance_pct: f64,
}

pub struct StopLossCalculator {
    stop_buffer_pct: f64,
    min_distance_pct: f64,
    detector: SwingDetector,
}

impl StopLossCalculator {
    pub fn new(stop_buffer_pct: f64, min_distance_pct: f64, swing_lookback: usize) -> Self {
        Self {
            stop_buffer_pct,
            min_distance_pct,
            detector: SwingDetector::new(swing_lookback),
        }
    }

    /// Place the stop for a BUY or SELL entry. Returns `None` only for a
    /// neutral side or a non-positive entry.
    pub fn calculate(
        &self,
        entry: f64,
        side: SignalSide,
        candles: &[Candle],
        ema_slow: Option<f64>,
        atr: Option<f64>,
        timeframe: Timeframe,
    ) -> Option<StopLossResult> {
        if entry <= 0.0 || !entry.is_finite() {
            return None;
        }
        let atr_multiplier = timeframe.default_sl_atr_multiplier();

        let mut candidates: Vec<(StopType, f64)> = Vec::new();
        match side {
            SignalSide::Buy => {
                if let Some(swing) = self.detector.find_recent_swing_low(candles) {
                    let stop = swing.price * (1.0 - self.stop_buffer_pct);
                    if stop < entry {
                        candidates.push((StopType::Swing, stop));
                    }
                }
                if let Some(ema) = ema_slow {
                    let stop = ema * (1.0 - self.stop_buffer_pct);
                    if stop > 0.0 && stop < entry {
                        candidates.push((StopType::Ema, stop));
                    }
                }
                if let Some(atr) = atr {
                    if atr > 0.0 {
                        let stop = entry - atr * atr_multiplier;
                        if stop > 0.0 {
                            candidates.push((StopType::Atr, stop));
                        }
                    }
                }

                // Most conservative = lowest stop for a long.
                let (stop_type, mut stop) = candidates
                    .into_iter()
                    .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .unwrap_or((StopType::Fallback, entry * (1.0 - self.min_distance_pct)));

                // Enforce the minimum distance by inflating a tight stop.
                let min_stop = entry * (1.0 - self.min_distance_pct);
                if stop > min_stop {
                    debug!(stop, min_stop, "stop tighter than minimum distance - inflating");
                    stop = min_stop;
                }

                if stop <= 0.0 || stop >= entry {
                    return None;
                }
                Some(StopLossResult {
                    stop_loss: stop,
                    stop_type,
                    distance_pct: (entry - stop) / entry,
                })
            }
            SignalSide::Sell => {
                if let Some(swing) = self.detector.find_recent_swing_high(candles) {
                    let stop = swing.price * (1.0 + self.stop_buffer_pct);
                    if stop > entry {
                        candidates.push((StopType::Swing, stop));
                    }
                }
                if let Some(ema) = ema_slow {
                    let stop = ema * (1.0 + self.stop_buffer_pct);
                    if stop > entry {
                        candidates.push((StopType::Ema, stop));
                    }
                }
                if let Some(atr) = atr {
                    if atr > 0.0 {
                        candidates.push((StopType::Atr, entry + atr * atr_multiplier));
                    }
                }

                // Most conservative = highest stop for a short.
                let (stop_type, mut stop) = candidates
                    .into_iter()
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .unwrap_or((StopType::Fallback, entry * (1.0 + self.min_distance_pct)));

                let min_stop = entry * (1.0 + self.min_distance_pct);
                if stop < min_stop {
                    debug!(stop, min_stop, "stop tighter than minimum distance - inflating");
                    stop = min_stop;
                }

                if stop <= entry {
                    return None;
                }
                Some(StopLossResult {
                    stop_loss: stop,
                    stop_type,
                    distance_pct: (stop - entry) / entry,
                })
            }
            SignalSide::Neutral => None,
        }
    }
}
