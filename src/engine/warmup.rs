// =============================================================================
// Warm-up loader — cold-start backfill without signal emission
// =============================================================================
//
// Loads historical candles from the history port and replays them into the
// aggregation buffers and the VWAP state, enforcing the UTC-date reset at
// every day boundary inside the stream. The signal engine and the paper
// matcher are never touched: warm-up only prepares indicator state.
//
// A failed or empty fetch degrades to `success = false` — the engine goes
// live anyway and fills its buffers from the live stream instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::config::{EngineConfig, IndicatorParams};
use crate::engine::orchestrator::EngineState;
use crate::indicators::{adx, stoch_rsi};
use crate::market_data::HistoryProvider;
use crate::types::Timeframe;

/// Outcome of a warm-up pass, including the indicator readback used to
/// sanity-check the freshly seeded state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupResult {
    pub success: bool,
    pub candles_processed: usize,
    pub vwap_value: f64,
    pub stoch_rsi_k: f64,
    pub stoch_rsi_d: f64,
    pub adx_value: f64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WarmupResult {
    fn failed(error: impl Into<String>, processed: usize, duration_ms: u64) -> Self {
        Self {
            success: false,
            candles_processed: processed,
            vwap_value: 0.0,
            stoch_rsi_k: 0.0,
            stoch_rsi_d: 0.0,
            adx_value: 0.0,
            duration_ms,
            error: Some(error.into()),
        }
    }
}

pub struct WarmupLoader {
    symbol: String,
    interval: Timeframe,
    limit: usize,
    indicators: IndicatorParams,
}

impl WarmupLoader {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            symbol: config.symbol.clone(),
            interval: config.analysis_timeframe,
            limit: config.warmup_limit,
            indicators: config.indicators.clone(),
        }
    }

    /// Fetch and replay history into `state`. Checks `cancel` between
    /// candles; a cancelled run reports `success = false`.
    pub(crate) async fn run(
        &self,
        history: &dyn HistoryProvider,
        state: &Arc<RwLock<EngineState>>,
        cancel: &AtomicBool,
    ) -> WarmupResult {
        let started = std::time::Instant::now();
        info!(
            symbol = %self.symbol,
            interval = %self.interval,
            limit = self.limit,
            "warm-up starting"
        );

        let candles = match history
            .fetch_klines(&self.symbol, self.interval, self.limit)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!(error = %e, "history port failed - warm-up degraded");
                return WarmupResult::failed(
                    format!("history unavailable: {e}"),
                    0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        if candles.is_empty() {
            warn!("history returned no candles - warm-up degraded");
            return WarmupResult::failed(
                "history returned no candles",
                0,
                started.elapsed().as_millis() as u64,
            );
        }

        let mut processed = 0usize;
        {
            let mut guard = state.write();
            for candle in candles {
                if cancel.load(Ordering::SeqCst) {
                    warn!(processed, "warm-up cancelled");
                    return WarmupResult::failed(
                        "cancelled",
                        processed,
                        started.elapsed().as_millis() as u64,
                    );
                }
                guard.apply_historical(candle, self.interval);
                processed += 1;
            }
        }

        // Indicator readback from the seeded analysis buffer.
        let guard = state.read();
        let analysis = guard.aggregator.buffer(guard.analysis_timeframe);
        let closes = analysis.closes(analysis.len());
        let window = analysis.last(analysis.len());

        let vwap_value = guard.vwap.value().unwrap_or(0.0);
        let (stoch_rsi_k, stoch_rsi_d) = stoch_rsi::calculate_stoch_rsi(
            &closes,
            self.indicators.stoch_rsi_period,
            self.indicators.stoch_period,
            self.indicators.stoch_k_period,
            self.indicators.stoch_d_period,
        )
        .map(|s| (s.k, s.d))
        .unwrap_or((0.0, 0.0));
        let adx_value = adx::calculate_adx(&window, self.indicators.adx_period)
            .map(|a| a.adx)
            .unwrap_or(0.0);

        let result = WarmupResult {
            success: true,
            candles_processed: processed,
            vwap_value,
            stoch_rsi_k,
            stoch_rsi_d,
            adx_value,
            duration_ms: started.elapsed().as_millis() as u64,
            error: None,
        };
        info!(
            candles = result.candles_processed,
            vwap = result.vwap_value,
            adx = result.adx_value,
            duration_ms = result.duration_ms,
            "warm-up complete - engine going live"
        );
        result
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::Candle;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    struct FixedHistory {
        candles: Vec<Candle>,
    }

    #[async_trait]
    impl HistoryProvider for FixedHistory {
        async fn fetch_klines(
            &self,
            _symbol: &str,
            _interval: Timeframe,
            limit: usize,
        ) -> Result<Vec<Candle>> {
            Ok(self.candles.iter().take(limit).cloned().collect())
        }
    }

    struct BrokenHistory;

    #[async_trait]
    impl HistoryProvider for BrokenHistory {
        async fn fetch_klines(
            &self,
            _symbol: &str,
            _interval: Timeframe,
            _limit: usize,
        ) -> Result<Vec<Candle>> {
            anyhow::bail!("connection refused")
        }
    }

    fn rising_15m_candles(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let ts = start + Duration::minutes(15 * i as i64);
                let base = 100.0 + i as f64 * 0.05;
                Candle::new(ts, base, base + 0.6, base - 0.4, base + 0.3, 10.0).unwrap()
            })
            .collect()
    }

    fn fresh_state() -> Arc<RwLock<EngineState>> {
        Arc::new(RwLock::new(EngineState::new(&EngineConfig::default())))
    }

    #[tokio::test]
    async fn warmup_seeds_buffers_and_reads_back_indicators() {
        let config = EngineConfig::default();
        let loader = WarmupLoader::new(&config);
        let history = FixedHistory {
            candles: rising_15m_candles(1000),
        };
        let state = fresh_state();
        let cancel = AtomicBool::new(false);

        let result = loader.run(&history, &state, &cancel).await;
        assert!(result.success);
        assert_eq!(result.candles_processed, 1000);
        assert!(result.vwap_value > 0.0);
        assert!(result.adx_value > 0.0);
        assert!(result.error.is_none());

        let guard = state.read();
        // The 15m ring holds the tail of the seeded history.
        assert_eq!(guard.aggregator.buffer(Timeframe::M15).len(), 200);
        // No signal was ever evaluated during warm-up.
        assert!(guard.latest_signal.is_none());
    }

    #[tokio::test]
    async fn warmup_enforces_daily_vwap_reset() {
        let config = EngineConfig::default();
        let loader = WarmupLoader::new(&config);
        // 96 candles per UTC day at 15m; two days plus one candle.
        let history = FixedHistory {
            candles: rising_15m_candles(96 * 2 + 1),
        };
        let state = fresh_state();
        let cancel = AtomicBool::new(false);

        let result = loader.run(&history, &state, &cancel).await;
        assert!(result.success);
        // The last candle opened a fresh UTC day: cumulative volume is its own.
        let guard = state.read();
        assert!((guard.vwap.cumulative_volume() - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn broken_history_degrades() {
        let config = EngineConfig::default();
        let loader = WarmupLoader::new(&config);
        let state = fresh_state();
        let cancel = AtomicBool::new(false);

        let result = loader.run(&BrokenHistory, &state, &cancel).await;
        assert!(!result.success);
        assert_eq!(result.candles_processed, 0);
        assert!(result.error.unwrap().contains("history unavailable"));
    }

    #[tokio::test]
    async fn empty_history_degrades() {
        let config = EngineConfig::default();
        let loader = WarmupLoader::new(&config);
        let history = FixedHistory { candles: vec![] };
        let state = fresh_state();
        let cancel = AtomicBool::new(false);

        let result = loader.run(&history, &state, &cancel).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn cancellation_aborts_midway() {
        let config = EngineConfig::default();
        let loader = WarmupLoader::new(&config);
        let history = FixedHistory {
            candles: rising_15m_candles(100),
        };
        let state = fresh_state();
        let cancel = AtomicBool::new(true); // pre-cancelled

        let result = loader.run(&history, &state, &cancel).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cancelled"));
    }
}
