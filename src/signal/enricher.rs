// =============================================================================
// Signal Enricher — entry, stop, targets, size, and confidence in one pass
// =============================================================================
//
// Takes a non-neutral raw signal and produces the full risk plan:
//
//   1. Smart limit entry (midpoint/VWAP blend, swing-anchored when possible)
//   2. Stop-loss (structural vs volatility, most conservative wins)
//   3. Take-profit ladder (S/R preferred, ATR / risk-multiple fallbacks)
//   4. Position size = account * risk_pct / risk-per-unit, truncated to 8 dp
//   5. Weighted confidence with the ADX choppy-market penalty
//
// Every invariant (`SL < entry < TP1 < TP2 < TP3` for a BUY, the minimum
// R:R, the risk bound on the sized position) is validated before the signal
// leaves; any failure downgrades to NEUTRAL with a diagnostic reason and
// touches no paper state.

use tracing::{debug, warn};

use crate::engine::config::EngineConfig;
use crate::market_data::{BookTicker, Candle};
use crate::signal::confidence::{ConfidenceCalculator, ADX_PENALTY};
use crate::signal::entry::SmartEntryCalculator;
use crate::signal::stop_loss::StopLossCalculator;
use crate::signal::take_profit::TpCalculator;
use crate::signal::{EnrichedSignal, RawSignal};
use crate::types::{SignalSide, Timeframe};

/// Outcome of an enrichment attempt.
#[derive(Debug)]
pub enum EnrichOutcome {
    Enriched(EnrichedSignal),
    /// The signal could not be enriched and is downgraded to NEUTRAL.
    Rejected {
        reason: String,
        /// True when an entry/SL/TP ordering invariant was violated (counted
        /// on the health snapshot as a matcher-invariant error).
        invariant_violation: bool,
    },
}

pub struct SignalEnricher {
    entry: SmartEntryCalculator,
    stops: StopLossCalculator,
    tps: TpCalculator,
    confidence: ConfidenceCalculator,
    risk_pct: f64,
    min_risk_reward: f64,
    timeframe: Timeframe,
    book_max_age: chrono::Duration,
}

impl SignalEnricher {
    pub fn new(config: &EngineConfig) -> Self {
        let s = &config.strategy;
        Self {
            entry: SmartEntryCalculator::new(
                s.entry_offset_pct,
                s.max_ema_distance_pct,
                s.swing_lookback,
            ),
            stops: StopLossCalculator::new(
                s.stop_buffer_pct,
                s.min_stop_distance_pct,
                s.swing_lookback,
            ),
            tps: TpCalculator::new(
                s.min_risk_reward,
                s.tp3_extension_pct,
                s.tp_weights,
                s.atr_tp_weights,
                s.swing_lookback,
            ),
            confidence: ConfidenceCalculator,
            risk_pct: config.risk_pct,
            min_risk_reward: s.min_risk_reward,
            timeframe: config.analysis_timeframe,
            book_max_age: chrono::Duration::seconds(config.book_ticker_max_age_secs),
        }
    }

    /// Enrich a raw BUY/SELL signal against the evaluation window.
    ///
    /// `account_balance` is the wallet used for risk sizing; `book` is the
    /// optional top-of-book quote (ignored when stale).
    pub fn enrich(
        &self,
        raw: &RawSignal,
        candles: &[Candle],
        account_balance: f64,
        book: Option<&BookTicker>,
    ) -> EnrichOutcome {
        if !raw.side.is_actionable() {
            return EnrichOutcome::Rejected {
                reason: "neutral signal has no risk plan".to_string(),
                invariant_violation: false,
            };
        }

        let snapshot = &raw.snapshot;
        let fresh_book = book.filter(|b| b.fresh(self.book_max_age, raw.timestamp));
        if book.is_some() && fresh_book.is_none() {
            debug!("top-of-book quote stale - entry degrades to candle/VWAP pricing");
        }

        // ── 1. Smart entry ───────────────────────────────────────────────
        let Some(entry) =
            self.entry
                .calculate(raw.side, candles, snapshot.ema_fast, snapshot.vwap, fresh_book)
        else {
            return EnrichOutcome::Rejected {
                reason: "no viable limit entry".to_string(),
                invariant_violation: false,
            };
        };

        // ── 2. Stop-loss ─────────────────────────────────────────────────
        let Some(stop) = self.stops.calculate(
            entry.entry_price,
            raw.side,
            candles,
            snapshot.ema_slow,
            snapshot.atr,
            self.timeframe,
        ) else {
            return EnrichOutcome::Rejected {
                reason: "no viable stop-loss placement".to_string(),
                invariant_violation: false,
            };
        };

        // ── 3. Take-profit ladder ────────────────────────────────────────
        let Some(tp) = self.tps.calculate(
            entry.entry_price,
            stop.stop_loss,
            raw.side,
            candles,
            snapshot.atr,
        ) else {
            return EnrichOutcome::Rejected {
                reason: format!(
                    "no take-profit ladder satisfies minimum R:R {:.1}",
                    self.min_risk_reward
                ),
                invariant_violation: false,
            };
        };

        // ── Invariant validation ─────────────────────────────────────────
        if let Err(reason) =
            validate_risk_plan(raw.side, entry.entry_price, stop.stop_loss, &tp.ladder)
        {
            warn!(side = %raw.side, %reason, "enriched signal violates risk-plan ordering");
            return EnrichOutcome::Rejected {
                reason,
                invariant_violation: true,
            };
        }

        // ── 4. Position size ─────────────────────────────────────────────
        let risk_per_unit = (entry.entry_price - stop.stop_loss).abs();
        let position_size = if risk_per_unit < 1e-9 || account_balance <= 0.0 {
            0.0
        } else {
            truncate_to_8dp(account_balance * self.risk_pct / risk_per_unit)
        };

        // ── 5. Confidence ────────────────────────────────────────────────
        let confidence = self.confidence.calculate(
            raw.side,
            snapshot.ema_fast,
            snapshot.ema_slow,
            snapshot.volume.map(|v| v.intensity).unwrap_or_default(),
            snapshot.rsi,
            snapshot.adx_trending(),
        );

        let mut reasons = raw.reasons.clone();
        reasons.push(format!(
            "Smart Entry: ${:.2} (Limit Order{})",
            entry.entry_price,
            if entry.swing_anchored { ", swing-anchored" } else { "" }
        ));
        reasons.push(format!(
            "Stop Loss: ${:.2} ({})",
            stop.stop_loss, stop.stop_type
        ));
        reasons.push(format!(
            "TP Targets: 3 levels (R:R {:.2})",
            tp.risk_reward_ratio
        ));
        if confidence.adx_penalty_applied {
            reasons.push(format!(
                "ADX penalty applied: -{:.0}% (choppy market)",
                ADX_PENALTY * 100.0
            ));
        }
        reasons.push(format!("Confidence: {:.0}%", confidence.score * 100.0));

        EnrichOutcome::Enriched(EnrichedSignal {
            side: raw.side,
            confidence: confidence.score,
            confidence_level: confidence.level,
            reference_price: raw.reference_price,
            timestamp: raw.timestamp,
            snapshot: raw.snapshot.clone(),
            reasons,
            entry_price: entry.entry_price,
            stop_loss: stop.stop_loss,
            tp: tp.ladder,
            risk_reward_ratio: tp.risk_reward_ratio,
            position_size,
            is_limit_order: true,
            swing_anchored: entry.swing_anchored,
        })
    }
}

/// Check the directional ordering invariant of a full risk plan.
fn validate_risk_plan(
    side: SignalSide,
    entry: f64,
    stop: f64,
    tp: &crate::signal::TpLadder,
) -> Result<(), String> {
    let ok = match side {
        SignalSide::Buy => stop < entry && entry < tp.tp1 && tp.tp1 < tp.tp2 && tp.tp2 < tp.tp3,
        SignalSide::Sell => stop > entry && entry > tp.tp1 && tp.tp1 > tp.tp2 && tp.tp2 > tp.tp3,
        SignalSide::Neutral => false,
    };
    if ok {
        Ok(())
    } else {
        Err(format!(
            "risk plan out of order: side={side} stop={stop:.4} entry={entry:.4} \
             tp1={:.4} tp2={:.4} tp3={:.4}",
            tp.tp1, tp.tp2, tp.tp3
        ))
    }
}

/// Truncate (never round) a quantity to 8 decimal places, matching exchange
/// lot behaviour.
pub fn truncate_to_8dp(value: f64) -> f64 {
    (value * 1e8).floor() / 1e8
}
