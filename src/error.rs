// =============================================================================
// Engine error kinds
// =============================================================================
//
// Only `Config` fails construction. Everything else is handled at the
// orchestrator boundary: invalid candles are rejected before entering any
// buffer, external failures degrade warm-up, and matcher / state-corruption
// errors increment health counters without ever terminating the ingestion
// loop. Insufficient data for an indicator is not an error at all — kernels
// return `Option::None` and callers treat not-ready as non-signal.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// OHLC invariant violated at candle construction.
    #[error("invalid candle at {timestamp}: {reason}")]
    InvalidCandle {
        timestamp: DateTime<Utc>,
        reason: String,
    },

    /// Out-of-range threshold or malformed engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// History or top-of-book port failure. Ingestion continues degraded.
    #[error("external dependency unavailable: {0}")]
    ExternalUnavailable(String),

    /// A signal or position violated entry/SL/TP ordering.
    #[error("matcher invariant violated: {0}")]
    MatcherInvariant(String),

    /// Unexpected internal inconsistency (e.g. runaway aggregation slot).
    #[error("internal state corruption: {0}")]
    StateCorruption(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason() {
        let err = EngineError::Config("risk_pct out of range".to_string());
        assert!(err.to_string().contains("risk_pct out of range"));

        let err = EngineError::MatcherInvariant("SL above entry for BUY".to_string());
        assert!(err.to_string().contains("SL above entry"));
    }
}
