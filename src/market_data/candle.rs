// =============================================================================
// Candle — immutable OHLCV value object
// =============================================================================
//
// Construction validates the OHLC invariants; a candle that made it into a
// buffer is guaranteed well-formed. All prices are 64-bit floats, timestamps
// are UTC (the VWAP daily reset keys off the UTC calendar date).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A single OHLCV candle.
///
/// Invariants (enforced by [`Candle::new`]):
/// - `high >= max(open, close, low)`
/// - `low <= min(open, close, high)`
/// - all prices strictly positive and finite
/// - `volume >= 0` and finite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Build a validated candle. Rejects OHLC invariant violations with
    /// [`EngineError::InvalidCandle`] before the value can enter any buffer.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, EngineError> {
        let invalid = |reason: &str| EngineError::InvalidCandle {
            timestamp,
            reason: reason.to_string(),
        };

        for (name, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(&format!("{name} must be a positive finite price, got {value}")));
            }
        }
        if !volume.is_finite() || volume < 0.0 {
            return Err(invalid(&format!("volume must be non-negative, got {volume}")));
        }
        if high < open.max(close).max(low) {
            return Err(invalid(&format!(
                "high {high} below max(open, close, low) = {}",
                open.max(close).max(low)
            )));
        }
        if low > open.min(close).min(high) {
            return Err(invalid(&format!(
                "low {low} above min(open, close, high) = {}",
                open.min(close).min(high)
            )));
        }

        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    /// Typical price `(high + low + close) / 3` — the VWAP input.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Bar midpoint `(high + low) / 2` — the smart-entry anchor.
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// Green candle: close above open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Red candle: close below open.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// UTC calendar date of the candle open. Drives the VWAP daily reset.
    pub fn utc_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}
