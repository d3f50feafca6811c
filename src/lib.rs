// =============================================================================
// Vela — real-time market-data processing engine for crypto trading signals
// =============================================================================
//
// The engine ingests a 1-minute candle stream, aggregates it into higher
// timeframes, computes a suite of technical indicators over sliding windows,
// and emits enriched directional signals (entry / stop-loss / take-profit /
// position size / confidence). A paper-trading matcher consumes signals,
// opens isolated-margin positions, and marks them to market on every tick.
//
// Layering (leaf-first):
//   market_data  — candle value type, ring buffers, 1m -> 15m/1h aggregation
//   indicators   — pure kernels (EMA, RSI, ATR, ADX, VWAP, Bollinger, ...)
//   signal       — trend-pullback evaluator + enrichment pipeline
//   paper        — paper-trading matcher and order repository port
//   engine       — orchestrator, warm-up, config, subscriber fan-out
// =============================================================================

pub mod engine;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod paper;
pub mod signal;
pub mod types;

pub use engine::config::EngineConfig;
pub use engine::orchestrator::MarketEngine;
pub use engine::warmup::WarmupResult;
pub use error::EngineError;
pub use market_data::{Candle, HistoryProvider, TopOfBook};
pub use signal::{EnrichedSignal, EvaluatedSignal, RawSignal};
pub use types::{ConfidenceLevel, ExitReason, SignalSide, Timeframe, TradeSide};
