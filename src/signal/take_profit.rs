// =============================================================================
// Take-profit ladder — three targets anchored to market structure
// =============================================================================
//
// Preferred: the two nearest swing-derived S/R levels past the entry become
// TP1 and TP2, with TP3 extended 1.5% beyond TP2. When fewer than two usable
// levels exist (or they fail the minimum R:R), the ladder falls back to ATR
// multiples (1x / 2x / 3x) and finally to risk multiples (1.5R / 2.5R /
// 3.5R), which satisfy the minimum ratio by construction.
//
// Default partial weights are 0.6 / 0.3 / 0.1; ATR ladders use 0.5 / 0.3 /
// 0.2. A ladder whose TP1 rewards less than `min_risk_reward` times the risk
// is invalid.

use tracing::debug;

use crate::indicators::SwingDetector;
use crate::market_data::Candle;
use crate::signal::{TpLadder, TpMethod};
use crate::types::SignalSide;

/// Number of S/R levels extracted from the swing detector.
const SR_LEVELS: usize = 5;

/// Risk multiples for the last-resort ladder.
const RISK_MULTIPLES: [f64; 3] = [1.5, 2.5, 3.5];

#[derive(Debug, Clone, Copy)]
pub struct TpResult {
    pub ladder: TpLadder,
    /// Reward to TP1 over risk to the stop.
    pub risk_reward_ratio: f64,
}

pub struct TpCalculator {
    min_risk_reward: f64,
    tp3_extension_pct: f64,
    tp_weights: [f64; 3],
    atr_tp_weights: [f64; 3],
    detector: SwingDetector,
}

impl TpCalculator {
    pub fn new(
        min_risk_reward: f64,
        tp3_extension_pct: f64,
        tp_weights: [f64; 3],
        atr_tp_weights: [f64; 3],
        swing_lookback: usize,
    ) -> Self {
        Self {
            min_risk_reward,
            tp3_extension_pct,
            tp_weights,
            atr_tp_weights,
            detector: SwingDetector::new(swing_lookback),
        }
    }

    /// Build the ladder for an entry/stop pair. Returns `None` when the stop
    /// is on the wrong side of the entry or no ladder can satisfy the
    /// minimum risk-reward ratio (zero risk included).
    pub fn calculate(
        &self,
        entry: f64,
        stop_loss: f64,
        side: SignalSide,
        candles: &[Candle],
        atr: Option<f64>,
    ) -> Option<TpResult> {
        let risk = match side {
            SignalSide::Buy => entry - stop_loss,
            SignalSide::Sell => stop_loss - entry,
            SignalSide::Neutral => return None,
        };
        if risk <= 0.0 || !risk.is_finite() {
            return None;
        }

        // ── 1. Market-structure ladder ───────────────────────────────────
        if let Some(result) = self.structure_ladder(entry, risk, side, candles) {
            return Some(result);
        }

        // ── 2. ATR-multiple fallback ─────────────────────────────────────
        if let Some(atr) = atr {
            if atr > 0.0 {
                let ladder = directional_ladder(
                    entry,
                    side,
                    [atr, 2.0 * atr, 3.0 * atr],
                    self.atr_tp_weights,
                    TpMethod::AtrMultiple,
                );
                let rr = atr / risk;
                if rr >= self.min_risk_reward {
                    return Some(TpResult {
                        ladder,
                        risk_reward_ratio: rr,
                    });
                }
                debug!(rr, "ATR ladder below minimum R:R - trying risk multiples");
            }
        }

        // ── 3. Risk-multiple fallback (R:R = 1.5 by construction) ────────
        let ladder = directional_ladder(
            entry,
            side,
            [
                RISK_MULTIPLES[0] * risk,
                RISK_MULTIPLES[1] * risk,
                RISK_MULTIPLES[2] * risk,
            ],
            self.tp_weights,
            TpMethod::RiskMultiple,
        );
        Some(TpResult {
            ladder,
            risk_reward_ratio: RISK_MULTIPLES[0],
        })
    }

    /// Try to anchor TP1/TP2 to the two nearest S/R levels past the entry.
    fn structure_ladder(
        &self,
        entry: f64,
        risk: f64,
        side: SignalSide,
        candles: &[Candle],
    ) -> Option<TpResult> {
        let (supports, resistances) = self.detector.support_resistance_levels(candles, SR_LEVELS);

        // Levels past the entry, nearest first, deduplicated.
        let mut levels: Vec<f64> = match side {
            SignalSide::Buy => resistances.into_iter().filter(|&r| r > entry).collect(),
            SignalSide::Sell => supports.into_iter().filter(|&s| s < entry).collect(),
            SignalSide::Neutral => return None,
        };
        match side {
            SignalSide::Buy => {
                levels.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            }
            _ => levels.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal)),
        }
        levels.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

        if levels.len() < 2 {
            return None;
        }

        let (tp1, tp2) = (levels[0], levels[1]);
        let tp3 = match side {
            SignalSide::Buy => tp2 * (1.0 + self.tp3_extension_pct),
            _ => tp2 * (1.0 - self.tp3_extension_pct),
        };

        let reward = (tp1 - entry).abs();
        let rr = reward / risk;
        if rr < self.min_risk_reward {
            debug!(rr, tp1, "structure ladder below minimum R:R - falling back");
            return None;
        }

        Some(TpResult {
            ladder: TpLadder {
                tp1,
                tp2,
                tp3,
                weights: self.tp_weights,
                method: TpMethod::SupportResistance,
            },
            risk_reward_ratio: rr,
        })
    }
}

/// Ladder from three absolute distances off the entry, directional.
fn directional_ladder(
    entry: f64,
    side: SignalSide,
    distances: [f64; 3],
    weights: [f64; 3],
    method: TpMethod,
) -> TpLadder {
    let sign = if side == SignalSide::Buy { 1.0 } else { -1.0 };
    TpLadder {
        tp1: entry + sign * distances[0],
        tp2: entry + sign * distances[1],
        tp3: entry + sign * distances[2],
        weights,
        method,
    }
}
