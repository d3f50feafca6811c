// =============================================================================
// Confidence scoring — weighted indicator agreement
// =============================================================================
//
// The score is a weighted sum of three agreement components, on a 0-100
// scale, normalised to [0, 1]:
//
//   EMA alignment   (40) — fast over slow agrees with the direction
//   Volume severity (30) — spike intensity band
//   RSI extremity   (30) — how far RSI sits toward the favourable extreme
//
// A non-trending ADX applies a flat 20% penalty afterwards (choppy market).

use crate::indicators::SpikeIntensity;
use crate::types::{ConfidenceLevel, SignalSide};

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceResult {
    /// Normalised score in [0, 1].
    pub score: f64,
    pub level: ConfidenceLevel,
    pub adx_penalty_applied: bool,
}

/// Fractional penalty applied when ADX reports a choppy market.
pub const ADX_PENALTY: f64 = 0.20;

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceCalculator;

impl ConfidenceCalculator {
    pub fn calculate(
        &self,
        side: SignalSide,
        ema_fast: Option<f64>,
        ema_slow: Option<f64>,
        volume_intensity: SpikeIntensity,
        rsi: Option<f64>,
        adx_trending: bool,
    ) -> ConfidenceResult {
        let ema_points = match (ema_fast, ema_slow) {
            (Some(fast), Some(slow)) => {
                let aligned = match side {
                    SignalSide::Buy => fast > slow,
                    SignalSide::Sell => fast < slow,
                    SignalSide::Neutral => false,
                };
                if aligned {
                    40.0
                } else if (fast - slow).abs() < 1e-9 {
                    20.0
                } else {
                    10.0
                }
            }
            // No EMA evidence either way.
            _ => 20.0,
        };

        let volume_points = match volume_intensity {
            SpikeIntensity::Extreme => 30.0,
            SpikeIntensity::Strong => 25.0,
            SpikeIntensity::Moderate => 15.0,
            SpikeIntensity::None => 5.0,
        };

        let rsi_points = match rsi {
            Some(value) => rsi_extremity_points(side, value),
            None => 15.0,
        };

        let mut score = (ema_points + volume_points + rsi_points) / 100.0;
        let adx_penalty_applied = !adx_trending;
        if adx_penalty_applied {
            score *= 1.0 - ADX_PENALTY;
        }
        let score = score.clamp(0.0, 1.0);

        ConfidenceResult {
            score,
            level: ConfidenceLevel::from_score(score),
            adx_penalty_applied,
        }
    }
}

/// RSI extremity points (0-30): a BUY wants RSI deep in oversold territory,
/// a SELL deep in overbought.
fn rsi_extremity_points(side: SignalSide, rsi: f64) -> f64 {
    let toward_extreme = match side {
        SignalSide::Buy => 100.0 - rsi, // low RSI favours a BUY
        SignalSide::Sell => rsi,
        SignalSide::Neutral => 50.0,
    };
    // toward_extreme in [0, 100]: >= 70 means RSI within 30 of the edge.
    if toward_extreme >= 70.0 {
        30.0
    } else if toward_extreme >= 60.0 {
        24.0
    } else if toward_extreme >= 45.0 {
        15.0
    } else if toward_extreme >= 30.0 {
        8.0
    } else {
        2.0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> ConfidenceCalculator {
        ConfidenceCalculator
    }

    #[test]
    fn fully_aligned_buy_scores_high() {
        // Aligned EMAs (40) + strong volume (25) + RSI 18 (30) = 95.
        let result = calc().calculate(
            SignalSide::Buy,
            Some(101.0),
            Some(100.0),
            SpikeIntensity::Strong,
            Some(18.0),
            true,
        );
        assert!((result.score - 0.95).abs() < 1e-9);
        assert_eq!(result.level, ConfidenceLevel::High);
        assert!(!result.adx_penalty_applied);
    }

    #[test]
    fn fully_aligned_sell_scores_high() {
        let result = calc().calculate(
            SignalSide::Sell,
            Some(99.0),
            Some(100.0),
            SpikeIntensity::Extreme,
            Some(85.0),
            true,
        );
        assert!((result.score - 1.0).abs() < 1e-9);
        assert_eq!(result.level, ConfidenceLevel::High);
    }

    #[test]
    fn mixed_evidence_is_mediocre() {
        // No EMA evidence (20) + no spike (5) + neutral RSI 50 (15) = 40.
        let result = calc().calculate(
            SignalSide::Buy,
            None,
            None,
            SpikeIntensity::None,
            Some(50.0),
            true,
        );
        assert!((result.score - 0.40).abs() < 1e-9);
        assert_eq!(result.level, ConfidenceLevel::Low);
    }

    #[test]
    fn opposed_indicators_score_poorly() {
        // Bearish EMAs against a BUY (10) + no spike (5) + RSI 85 (2) = 17.
        let result = calc().calculate(
            SignalSide::Buy,
            Some(99.0),
            Some(100.0),
            SpikeIntensity::None,
            Some(85.0),
            true,
        );
        assert!(result.score < 0.40);
        assert_eq!(result.level, ConfidenceLevel::Low);
    }

    #[test]
    fn adx_penalty_cuts_twenty_percent() {
        let trending = calc().calculate(
            SignalSide::Buy,
            Some(101.0),
            Some(100.0),
            SpikeIntensity::Strong,
            Some(18.0),
            true,
        );
        let choppy = calc().calculate(
            SignalSide::Buy,
            Some(101.0),
            Some(100.0),
            SpikeIntensity::Strong,
            Some(18.0),
            false,
        );
        assert!(choppy.adx_penalty_applied);
        assert!((choppy.score - trending.score * 0.8).abs() < 1e-9);
    }

    #[test]
    fn aligned_strong_mid_rsi_reaches_high_band() {
        // 40 + 25 + RSI 38 for BUY (toward_extreme 62 => 24) = 89.
        let result = calc().calculate(
            SignalSide::Buy,
            Some(101.0),
            Some(100.0),
            SpikeIntensity::Strong,
            Some(38.0),
            true,
        );
        assert!(result.score >= 0.80, "got {}", result.score);
        assert_eq!(result.level, ConfidenceLevel::High);
    }

    #[test]
    fn score_always_in_unit_interval() {
        for side in [SignalSide::Buy, SignalSide::Sell] {
            for rsi in [0.0, 25.0, 50.0, 75.0, 100.0] {
                for intensity in [
                    SpikeIntensity::None,
                    SpikeIntensity::Moderate,
                    SpikeIntensity::Strong,
                    SpikeIntensity::Extreme,
                ] {
                    let r = calc().calculate(side, Some(101.0), Some(99.0), intensity, Some(rsi), false);
                    assert!((0.0..=1.0).contains(&r.score));
                }
            }
        }
    }
}
