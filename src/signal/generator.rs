// =============================================================================
// Signal Engine — trend-pullback rule evaluator
// =============================================================================
//
// Evaluated on each closed candle of the analysis timeframe. Five conditions
// per side:
//
//   1. Trend        — close above VWAP (BUY) / below VWAP (SELL)
//   2. Setup        — pullback to the lower Bollinger band or VWAP (BUY);
//                     rally to the upper band or VWAP (SELL)
//   3. Trigger      — StochRSI K crossing D in the right zone; an extreme
//                     RSI (<25 / >75) is the legacy fallback trigger in
//                     strict mode
//   4. Candle       — green (BUY) / red (SELL)
//   5. Volume       — spike above the effective threshold
//
// Strict mode requires 4 of 5 satisfied conditions and makes the trend
// condition mandatory; normal mode requires 3. A volume ratio at or above
// the climax threshold downgrades any candidate to NEUTRAL — blow-off tops
// and capitulation bottoms are not entries.
//
// ADX posture: a low ADX never rejects a signal here; the enricher applies a
// confidence penalty instead.

use tracing::debug;

use crate::engine::config::{EngineConfig, IndicatorParams};
use crate::market_data::Candle;
use crate::signal::{IndicatorSnapshot, RawSignal};
use crate::types::SignalSide;

pub struct SignalEngine {
    strict_mode: bool,
    min_candles: usize,
    min_conditions: usize,
    volume_threshold: f64,
    climax_threshold: f64,
    bb_pullback_threshold: f64,
    vwap_pullback_max_distance: f64,
    indicators: IndicatorParams,
}

impl SignalEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            strict_mode: config.strict_mode,
            min_candles: config.strategy.min_candles_for_signal,
            min_conditions: if config.strict_mode { 4 } else { 3 },
            volume_threshold: config.effective_volume_threshold(),
            climax_threshold: config.strategy.volume_climax_threshold,
            bb_pullback_threshold: config.strategy.bb_pullback_threshold_pct,
            vwap_pullback_max_distance: config.strategy.vwap_pullback_max_distance_pct,
            indicators: config.indicators.clone(),
        }
    }

    /// Evaluate the latest closed bar of `candles` (oldest-first).
    ///
    /// Returns `None` when there is not enough history to evaluate at all;
    /// otherwise always a [`RawSignal`], NEUTRAL included.
    pub fn evaluate(&self, candles: &[Candle], vwap_value: Option<f64>) -> Option<RawSignal> {
        if candles.len() < self.min_candles {
            debug!(
                have = candles.len(),
                need = self.min_candles,
                "insufficient candles for signal evaluation"
            );
            return None;
        }
        let current = candles.last()?;

        let snapshot =
            IndicatorSnapshot::compute(candles, vwap_value, &self.indicators, self.volume_threshold)?;

        Some(self.evaluate_snapshot(snapshot, current))
    }

    /// Run the condition sets against an already-computed snapshot.
    ///
    /// Split out from [`evaluate`](Self::evaluate) so backtest drivers can
    /// replay recorded indicator states without recomputing kernels.
    pub fn evaluate_snapshot(&self, snapshot: IndicatorSnapshot, current: &Candle) -> RawSignal {
        let candidate = self
            .check_buy_conditions(&snapshot, current)
            .or_else(|| self.check_sell_conditions(&snapshot, current));

        match candidate {
            Some((side, conditions_met, mut reasons)) => {
                // Volume-climax safety: never chase a blow-off bar.
                if let Some(ratio) = snapshot.volume_ratio() {
                    if ratio >= self.climax_threshold {
                        reasons.push(format!(
                            "Volume Climax: {ratio:.1}x >= {:.1}x MA{} - downgraded to NEUTRAL",
                            self.climax_threshold, self.indicators.volume_ma_period
                        ));
                        return self.neutral(current, snapshot, reasons);
                    }
                }

                RawSignal {
                    side,
                    confidence: conditions_met as f64 / 5.0,
                    reference_price: current.close,
                    timestamp: current.timestamp,
                    snapshot,
                    reasons,
                }
            }
            None => self.neutral(
                current,
                snapshot,
                vec!["No clear signal - waiting for better conditions".to_string()],
            ),
        }
    }

    fn neutral(
        &self,
        current: &Candle,
        snapshot: IndicatorSnapshot,
        reasons: Vec<String>,
    ) -> RawSignal {
        RawSignal {
            side: SignalSide::Neutral,
            confidence: 0.0,
            reference_price: current.close,
            timestamp: current.timestamp,
            snapshot,
            reasons,
        }
    }

    // -------------------------------------------------------------------------
    // Condition sets
    // -------------------------------------------------------------------------

    pub(crate) fn check_buy_conditions(
        &self,
        snapshot: &IndicatorSnapshot,
        current: &Candle,
    ) -> Option<(SignalSide, usize, Vec<String>)> {
        let vwap = snapshot.vwap?;
        let bb = snapshot.bollinger.as_ref()?;
        let stoch = snapshot.stoch.as_ref()?;
        let price = snapshot.price;

        let mut reasons = Vec::new();
        let mut conditions_met = 0;

        // 1. Trend: price above VWAP.
        if price > vwap {
            conditions_met += 1;
            reasons.push("Trend: Price > VWAP (Bullish)".to_string());
        } else if self.strict_mode {
            return None; // strict mode requires trend alignment
        }

        // 2. Setup: pullback into the value area.
        let near_lower =
            crate::indicators::bollinger::is_near_lower_band(price, bb.lower, self.bb_pullback_threshold);
        let near_vwap = price > vwap
            && crate::indicators::vwap::distance_pct(price, vwap) < self.vwap_pullback_max_distance;
        if near_lower || near_vwap {
            conditions_met += 1;
            reasons.push("Setup: Pullback to Value Area (Lower BB/VWAP)".to_string());
        }

        // 3. Trigger: StochRSI cross up before K runs hot.
        if stoch.k_cross_up && stoch.k < 80.0 {
            conditions_met += 1;
            reasons.push(format!("Trigger: StochRSI Cross Up (K={:.1})", stoch.k));
        } else if self.strict_mode && snapshot.rsi.is_some_and(|r| r < 25.0) {
            // Legacy fallback trigger: deeply oversold RSI without a cross.
            conditions_met += 1;
            reasons.push(format!(
                "Trigger: RSI Extreme Oversold ({:.1})",
                snapshot.rsi.unwrap_or_default()
            ));
        } else if stoch.is_oversold {
            // Not a trigger yet — noted as a developing setup.
            reasons.push(format!("Setup: StochRSI Oversold (K={:.1})", stoch.k));
        }

        // 4. Candle confirmation.
        if current.is_bullish() {
            conditions_met += 1;
            reasons.push("Candle: Green (Bullish)".to_string());
        }

        // 5. Volume confirmation.
        if let Some(vol) = &snapshot.volume {
            if vol.is_spike {
                conditions_met += 1;
                reasons.push(format!("Volume: Spike {}", vol.intensity));
            }
        }

        if conditions_met >= self.min_conditions {
            Some((SignalSide::Buy, conditions_met, reasons))
        } else {
            None
        }
    }

    pub(crate) fn check_sell_conditions(
        &self,
        snapshot: &IndicatorSnapshot,
        current: &Candle,
    ) -> Option<(SignalSide, usize, Vec<String>)> {
        let vwap = snapshot.vwap?;
        let bb = snapshot.bollinger.as_ref()?;
        let stoch = snapshot.stoch.as_ref()?;
        let price = snapshot.price;

        let mut reasons = Vec::new();
        let mut conditions_met = 0;

        // 1. Trend: price below VWAP.
        if price < vwap {
            conditions_met += 1;
            reasons.push("Trend: Price < VWAP (Bearish)".to_string());
        } else if self.strict_mode {
            return None;
        }

        // 2. Setup: rally into the value area.
        let near_upper =
            crate::indicators::bollinger::is_near_upper_band(price, bb.upper, self.bb_pullback_threshold);
        let near_vwap = price < vwap
            && crate::indicators::vwap::distance_pct(price, vwap).abs()
                < self.vwap_pullback_max_distance;
        if near_upper || near_vwap {
            conditions_met += 1;
            reasons.push("Setup: Rally to Value Area (Upper BB/VWAP)".to_string());
        }

        // 3. Trigger: StochRSI cross down before K collapses.
        if stoch.k_cross_down && stoch.k > 20.0 {
            conditions_met += 1;
            reasons.push(format!("Trigger: StochRSI Cross Down (K={:.1})", stoch.k));
        } else if self.strict_mode && snapshot.rsi.is_some_and(|r| r > 75.0) {
            conditions_met += 1;
            reasons.push(format!(
                "Trigger: RSI Extreme Overbought ({:.1})",
                snapshot.rsi.unwrap_or_default()
            ));
        } else if stoch.is_overbought {
            reasons.push(format!("Setup: StochRSI Overbought (K={:.1})", stoch.k));
        }

        // 4. Candle confirmation.
        if current.is_bearish() {
            conditions_met += 1;
            reasons.push("Candle: Red (Bearish)".to_string());
        }

        // 5. Volume confirmation.
        if let Some(vol) = &snapshot.volume {
            if vol.is_spike {
                conditions_met += 1;
                reasons.push(format!("Volume: Spike {}", vol.intensity));
            }
        }

        if conditions_met >= self.min_conditions {
            Some((SignalSide::Sell, conditions_met, reasons))
        } else {
            None
        }
    }
}
