// =============================================================================
// Signals Module
// =============================================================================
//
// The signal pipeline for the engine:
//   snapshot   — typed indicator snapshot computed per evaluation bar
//   generator  — trend-pullback rule evaluator producing raw signals
//   entry      — smart limit-entry pricing
//   stop_loss  — structural / volatility stop selection
//   take_profit— multi-target TP ladder
//   confidence — indicator-agreement scoring
//   enricher   — fuses the above into an enriched, risk-sized signal

pub mod confidence;
pub mod enricher;
pub mod entry;
pub mod generator;
pub mod snapshot;
pub mod stop_loss;
pub mod take_profit;

pub use enricher::{EnrichOutcome, SignalEnricher};
pub use generator::SignalEngine;
pub use snapshot::IndicatorSnapshot;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConfidenceLevel, SignalSide};

/// A directional signal straight out of the rule evaluator, before
/// enrichment. `Neutral` signals carry no risk fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub side: SignalSide,
    /// Fraction of satisfied conditions, in [0, 1].
    pub confidence: f64,
    /// Close of the evaluation bar.
    pub reference_price: f64,
    pub timestamp: DateTime<Utc>,
    pub snapshot: IndicatorSnapshot,
    /// Ordered human-readable conditions and penalties.
    pub reasons: Vec<String>,
}

/// How the take-profit ladder was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TpMethod {
    SupportResistance,
    AtrMultiple,
    RiskMultiple,
}

impl std::fmt::Display for TpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SupportResistance => write!(f, "support_resistance"),
            Self::AtrMultiple => write!(f, "atr_multiple"),
            Self::RiskMultiple => write!(f, "risk_multiple"),
        }
    }
}

/// Three-target take-profit ladder with partial size weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TpLadder {
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    /// Fraction of the position closed at each level; sums to 1.
    pub weights: [f64; 3],
    pub method: TpMethod,
}

impl TpLadder {
    /// `(price, weight)` pairs, nearest target first.
    pub fn levels(&self) -> [(f64, f64); 3] {
        [
            (self.tp1, self.weights[0]),
            (self.tp2, self.weights[1]),
            (self.tp3, self.weights[2]),
        ]
    }
}

/// A non-neutral signal carrying the full risk plan.
///
/// Invariant: for BUY, `stop_loss < entry_price < tp1 < tp2 < tp3`; mirrored
/// for SELL. Enforced by the enricher before the signal leaves the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedSignal {
    pub side: SignalSide,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub reference_price: f64,
    pub timestamp: DateTime<Utc>,
    pub snapshot: IndicatorSnapshot,
    pub reasons: Vec<String>,

    pub entry_price: f64,
    pub stop_loss: f64,
    pub tp: TpLadder,
    /// Reward to TP1 over risk to the stop.
    pub risk_reward_ratio: f64,
    /// Quantity truncated to 8 decimals.
    pub position_size: f64,
    /// Smart entries are always limit orders, never market.
    pub is_limit_order: bool,
    /// Entry anchored to a recent swing point near the fast EMA.
    pub swing_anchored: bool,
}

/// The result of one engine evaluation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluatedSignal {
    Neutral(RawSignal),
    Actionable(EnrichedSignal),
}

impl EvaluatedSignal {
    pub fn side(&self) -> SignalSide {
        match self {
            Self::Neutral(raw) => raw.side,
            Self::Actionable(sig) => sig.side,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Neutral(raw) => raw.timestamp,
            Self::Actionable(sig) => sig.timestamp,
        }
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            Self::Neutral(raw) => &raw.reasons,
            Self::Actionable(sig) => &sig.reasons,
        }
    }
}
