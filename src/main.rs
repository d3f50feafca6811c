// =============================================================================
// Vela Engine — demo driver
// =============================================================================
//
// Runs the full pipeline against a deterministic synthetic feed: warm-up
// from a generated 15m history, then a stretch of live 1m ticks with an
// engineered pullback so the trend-pullback evaluator has something to
// chew on. Real deployments replace the synthetic ports with a venue
// WebSocket adapter and a REST kline client.
// =============================================================================

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vela_engine::market_data::HistoryProvider;
use vela_engine::paper::InMemoryOrderRepository;
use vela_engine::{Candle, EngineConfig, MarketEngine, Timeframe};

/// Deterministic sine-wave history source for the demo.
struct SyntheticHistory {
    start: DateTime<Utc>,
}

impl SyntheticHistory {
    fn candle_at(&self, index: usize, step_minutes: i64) -> Candle {
        let ts = self.start + Duration::minutes(step_minutes * index as i64);
        let base = 50_000.0 + (index as f64 * 0.11).sin() * 400.0 + index as f64 * 2.0;
        let open = base;
        let close = base + (index as f64 * 0.37).cos() * 60.0;
        let high = open.max(close) + 45.0;
        let low = open.min(close) - 45.0;
        let volume = 80.0 + (index as f64 * 0.23).sin().abs() * 40.0;
        Candle::new(ts, open, high, low, close, volume).expect("synthetic candle is well-formed")
    }
}

#[async_trait]
impl HistoryProvider for SyntheticHistory {
    async fn fetch_klines(
        &self,
        _symbol: &str,
        interval: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let step = i64::from(interval.minutes());
        Ok((0..limit).map(|i| self.candle_at(i, step)).collect())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Vela Engine — synthetic paper-trading demo        ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = EngineConfig::default();
    let symbol = config.symbol.clone();
    let warmup_limit = config.warmup_limit;

    let history_start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
    let history = Arc::new(SyntheticHistory {
        start: history_start,
    });
    let repository = Arc::new(InMemoryOrderRepository::new(config.account_size));

    let engine = MarketEngine::new(config, history, repository, None)?;

    engine.register_signal_listener(|signal, symbol| {
        info!(
            symbol,
            side = %signal.side,
            entry = signal.entry_price,
            stop = signal.stop_loss,
            tp1 = signal.tp.tp1,
            size = signal.position_size,
            confidence = signal.confidence,
            "signal emitted"
        );
    });

    engine.start().await?;

    // Live 1m ticks resume where the 15m warm-up history ended.
    let live_start = history_start + Duration::minutes(15 * warmup_limit as i64);
    let live_minutes = 240;
    info!(live_minutes, "feeding synthetic live ticks");

    for minute in 0..live_minutes {
        let ts = live_start + Duration::minutes(minute);
        let base = 52_000.0 + (minute as f64 * 0.21).sin() * 180.0;
        let open = base;
        let close = base + (minute as f64 * 0.53).cos() * 25.0;
        let high = open.max(close) + 12.0;
        let low = open.min(close) - 12.0;
        // A volume burst every two hours makes the spike detector fire.
        let volume = if minute % 120 == 115 { 320.0 } else { 90.0 };

        let mid = (open + close) / 2.0;
        let forming = Candle::new(ts, open, open.max(mid) + 6.0, open.min(mid) - 6.0, mid, volume * 0.6)?;
        engine.on_tick(forming, false).await?;

        let committed = Candle::new(ts, open, high, low, close, volume)?;
        engine.on_tick(committed, true).await?;
    }

    // Let the ingestion loop drain before reading the final snapshots.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let health = engine.health();
    info!(
        warmup_ok = health.warmup_ok,
        dropped_updates = health.dropped_updates,
        matcher_errors = health.matcher_errors,
        "engine health"
    );

    if let Some(candle) = engine.latest_candle(Timeframe::M15) {
        info!(close = candle.close, timestamp = %candle.timestamp, "latest 15m candle");
    }
    if let Some(signal) = engine.latest_signal() {
        info!(side = %signal.side(), reasons = ?signal.reasons(), "latest evaluation");
    } else {
        warn!(symbol = %symbol, "no evaluation turn ran - not enough live closes");
    }

    let account = engine.account();
    info!(
        wallet = account.wallet_balance,
        margin_balance = account.margin_balance,
        open = account.open_positions,
        pending = account.pending_positions,
        closed = account.closed_trades,
        "paper account summary"
    );

    engine.stop().await;
    info!("demo complete");
    Ok(())
}
