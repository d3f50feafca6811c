// =============================================================================
// Shared types used across the Vela signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of a trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalSide {
    Buy,
    Sell,
    Neutral,
}

impl SignalSide {
    /// True for `Buy` and `Sell`, false for `Neutral`.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::Neutral)
    }
}

impl std::fmt::Display for SignalSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Side of a paper position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    /// +1.0 for long, -1.0 for short. Used in PnL arithmetic.
    pub fn direction(&self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    /// Map a directional signal onto a position side.
    ///
    /// Returns `None` for `Neutral` — neutral signals never open positions.
    pub fn from_signal(side: SignalSide) -> Option<Self> {
        match side {
            SignalSide::Buy => Some(Self::Long),
            SignalSide::Sell => Some(Self::Short),
            SignalSide::Neutral => None,
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Why a paper position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Liquidation,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "TAKE_PROFIT"),
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::Liquidation => write!(f, "LIQUIDATION"),
            Self::Manual => write!(f, "MANUAL"),
        }
    }
}

/// Confidence bucket attached to an enriched signal.
///
/// Boundaries: LOW < 0.65 <= MEDIUM < 0.80 <= HIGH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Bucket a normalised confidence score in `[0, 1]`.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.80 {
            Self::High
        } else if score >= 0.65 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Candle timeframes understood by the engine and the history port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// Period length in minutes.
    pub fn minutes(&self) -> u32 {
        match self {
            Self::M1 => 1,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H4 => 240,
            Self::D1 => 1440,
        }
    }

    /// Exchange-style interval string ("1m", "15m", "1h", ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Default ATR multiplier for volatility-based stop placement.
    ///
    /// Shorter timeframes need wider ATR stops to survive noise.
    pub fn default_sl_atr_multiplier(&self) -> f64 {
        match self {
            Self::H4 => 2.0,
            Self::D1 => 1.5,
            Self::H1 => 2.5,
            _ => 3.0,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_side_actionable() {
        assert!(SignalSide::Buy.is_actionable());
        assert!(SignalSide::Sell.is_actionable());
        assert!(!SignalSide::Neutral.is_actionable());
    }

    #[test]
    fn trade_side_from_signal() {
        assert_eq!(TradeSide::from_signal(SignalSide::Buy), Some(TradeSide::Long));
        assert_eq!(TradeSide::from_signal(SignalSide::Sell), Some(TradeSide::Short));
        assert_eq!(TradeSide::from_signal(SignalSide::Neutral), None);
    }

    #[test]
    fn confidence_level_boundaries() {
        assert_eq!(ConfidenceLevel::from_score(0.0), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.649), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.65), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.799), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.80), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(1.0), ConfidenceLevel::High);
    }

    #[test]
    fn timeframe_minutes() {
        assert_eq!(Timeframe::M1.minutes(), 1);
        assert_eq!(Timeframe::M15.minutes(), 15);
        assert_eq!(Timeframe::H1.minutes(), 60);
        assert_eq!(Timeframe::D1.minutes(), 1440);
    }

    #[test]
    fn timeframe_serde_roundtrip() {
        let json = serde_json::to_string(&Timeframe::M15).unwrap();
        assert_eq!(json, "\"15m\"");
        let tf: Timeframe = serde_json::from_str("\"1h\"").unwrap();
        assert_eq!(tf, Timeframe::H1);
    }

    #[test]
    fn sl_atr_multiplier_defaults() {
        assert!((Timeframe::M15.default_sl_atr_multiplier() - 3.0).abs() < 1e-12);
        assert!((Timeframe::H1.default_sl_atr_multiplier() - 2.5).abs() < 1e-12);
        assert!((Timeframe::H4.default_sl_atr_multiplier() - 2.0).abs() < 1e-12);
        assert!((Timeframe::D1.default_sl_atr_multiplier() - 1.5).abs() < 1e-12);
    }
}
