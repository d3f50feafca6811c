// =============================================================================
// MarketEngine — orchestrator for the whole signal pipeline
// =============================================================================
//
// Owns the aggregation buffers, VWAP state, signal engine, enricher, and
// paper matcher, and wires them behind a single ingestion task:
//
//   on_tick -> bounded ingress queue -> ingestion loop
//     -> aggregator (forming / closed, 15m / 1h closure)
//     -> on analysis close: VWAP update, evaluation, enrichment
//     -> matcher (order entry on signal, matching on every tick)
//     -> fan-out hubs (signal events, candle-close events)
//
// All mutation happens on the ingestion task. Accessors take the state lock
// in read mode and hand out owned snapshots, so any thread can read without
// stalling ingestion. `start()` runs warm-up before consuming ticks (ticks
// arriving meanwhile queue up in the ingress); `stop()` drains within a
// bounded grace window. Restarting re-runs warm-up from scratch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::config::EngineConfig;
use crate::engine::fanout::{FanoutHub, Subscription};
use crate::engine::warmup::{WarmupLoader, WarmupResult};
use crate::error::EngineError;
use crate::indicators::VwapState;
use crate::market_data::aggregator::CloseCallback;
use crate::market_data::{Aggregator, Candle, HistoryProvider, TopOfBook};
use crate::paper::{AccountSummary, MarkTick, PaperMatcher, PaperPosition, OrderRepository};
use crate::signal::{
    EnrichOutcome, EnrichedSignal, EvaluatedSignal, IndicatorSnapshot, SignalEnricher, SignalEngine,
};
use crate::types::Timeframe;

/// Evaluation window handed to the signal engine on each analysis close.
const EVAL_WINDOW: usize = 100;

/// A routed non-neutral signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub symbol: String,
    pub signal: EnrichedSignal,
}

/// A committed higher-timeframe (or 1m) candle close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleCloseEvent {
    pub timeframe: Timeframe,
    pub candle: Candle,
}

/// Health snapshot surfaced to the UI and operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineHealth {
    pub is_running: bool,
    pub warmup_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_tick_time: Option<DateTime<Utc>>,
    /// Updates dropped across all subscriber queues.
    pub dropped_updates: u64,
    /// Matcher failures plus enricher invariant rejections.
    pub matcher_errors: u64,
    /// SL/TP same-bar ambiguities resolved toward the stop.
    pub sl_tiebreaks: u64,
    /// Liquidation-over-TP precedence decisions.
    pub close_precedence_invoked: u64,
    /// Aggregation slots cleared after overflowing.
    pub state_corruptions: u64,
}

// ---------------------------------------------------------------------------
// Engine state (ingestion-thread owned, read-locked by accessors)
// ---------------------------------------------------------------------------

pub(crate) struct EngineState {
    pub(crate) aggregator: Aggregator,
    pub(crate) vwap: VwapState,
    pub(crate) analysis_timeframe: Timeframe,
    pub(crate) latest_snapshot: Option<IndicatorSnapshot>,
    pub(crate) latest_signal: Option<EvaluatedSignal>,
    pub(crate) last_tick_time: Option<DateTime<Utc>>,
    pub(crate) warmup_ok: bool,
}

impl EngineState {
    pub(crate) fn new(config: &EngineConfig) -> Self {
        Self {
            aggregator: Aggregator::new(config.buffer_capacity_1m, config.buffer_capacity_htf),
            vwap: VwapState::new(),
            analysis_timeframe: config.analysis_timeframe,
            latest_snapshot: None,
            latest_signal: None,
            last_tick_time: None,
            warmup_ok: false,
        }
    }

    /// Replay one historical candle (warm-up path: no signals, no matcher).
    pub(crate) fn apply_historical(&mut self, candle: Candle, interval: Timeframe) {
        if interval == Timeframe::M1 {
            let outcome = self.aggregator.on_candle(candle, true);
            let bar = match self.analysis_timeframe {
                Timeframe::H1 => outcome.closed_1h,
                _ => outcome.closed_15m,
            };
            if let Some(bar) = bar {
                self.vwap.apply(&bar);
            }
        } else {
            if interval == self.analysis_timeframe {
                self.vwap.apply(&candle);
            }
            self.aggregator.seed_closed(interval, candle);
        }
    }
}

// ---------------------------------------------------------------------------
// Ingress events
// ---------------------------------------------------------------------------

enum TickEvent {
    Tick { candle: Candle, is_closed: bool },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Core: everything the ingestion task needs
// ---------------------------------------------------------------------------

type SignalListener = Box<dyn Fn(&EnrichedSignal, &str) + Send + Sync>;
type UpdateListener = Box<dyn Fn() + Send + Sync>;

pub(crate) struct EngineCore {
    config: EngineConfig,
    pub(crate) state: Arc<RwLock<EngineState>>,
    matcher: Arc<PaperMatcher>,
    top_of_book: Option<Arc<dyn TopOfBook>>,
    signal_engine: SignalEngine,
    enricher: SignalEnricher,
    signal_hub: FanoutHub<SignalEvent>,
    candle_hub: FanoutHub<CandleCloseEvent>,
    signal_listeners: RwLock<Vec<SignalListener>>,
    update_listeners: RwLock<Vec<UpdateListener>>,
    invariant_rejections: AtomicU64,
    last_warmup: RwLock<Option<WarmupResult>>,
}

impl EngineCore {
    /// Process one tick synchronously on the ingestion task.
    fn process_tick(&self, candle: Candle, is_closed: bool) {
        let symbol = self.config.symbol.as_str();
        let tick = MarkTick::from_candle(&candle);

        let mut close_events: Vec<CandleCloseEvent> = Vec::new();
        let mut routed_signal: Option<EnrichedSignal> = None;

        {
            let mut state = self.state.write();
            state.last_tick_time = Some(candle.timestamp);

            let outcome = state.aggregator.on_candle(candle.clone(), is_closed);

            if is_closed {
                close_events.push(CandleCloseEvent {
                    timeframe: Timeframe::M1,
                    candle: candle.clone(),
                });
            }
            if let Some(bar) = outcome.closed_15m.clone() {
                close_events.push(CandleCloseEvent {
                    timeframe: Timeframe::M15,
                    candle: bar,
                });
            }
            if let Some(bar) = outcome.closed_1h.clone() {
                close_events.push(CandleCloseEvent {
                    timeframe: Timeframe::H1,
                    candle: bar,
                });
            }

            let analysis_bar = match state.analysis_timeframe {
                Timeframe::H1 => outcome.closed_1h,
                _ => outcome.closed_15m,
            };

            if let Some(bar) = analysis_bar {
                state.vwap.apply(&bar);
                routed_signal = self.evaluate_turn(&mut state);
            }
        }

        // Order entry for this bar's signal, then matching for the tick.
        // Both run outside the state lock; the repository is only ever
        // touched from this task.
        if let Some(signal) = &routed_signal {
            self.matcher.on_signal(signal, symbol, signal.timestamp);
        }
        self.matcher.on_tick(symbol, tick);

        for event in close_events {
            self.candle_hub.publish(event);
        }
        if let Some(signal) = routed_signal {
            self.signal_hub.publish(SignalEvent {
                symbol: symbol.to_string(),
                signal: signal.clone(),
            });
            for listener in self.signal_listeners.read().iter() {
                listener(&signal, symbol);
            }
            for listener in self.update_listeners.read().iter() {
                listener();
            }
        }
    }

    /// One signal-evaluation turn on a freshly closed analysis bar.
    fn evaluate_turn(&self, state: &mut EngineState) -> Option<EnrichedSignal> {
        let window = state
            .aggregator
            .buffer(state.analysis_timeframe)
            .last(EVAL_WINDOW);
        let vwap_value = state.vwap.value();

        let raw = self.signal_engine.evaluate(&window, vwap_value)?;
        state.latest_snapshot = Some(raw.snapshot.clone());

        if !raw.side.is_actionable() {
            debug!(reasons = ?raw.reasons, "evaluation turn neutral");
            state.latest_signal = Some(EvaluatedSignal::Neutral(raw));
            return None;
        }

        let account_balance = self
            .matcher
            .repository()
            .account_balance()
            .unwrap_or(self.config.account_size);
        let book = self
            .top_of_book
            .as_ref()
            .and_then(|port| port.best_bid_ask(&self.config.symbol));

        match self.enricher.enrich(&raw, &window, account_balance, book.as_ref()) {
            EnrichOutcome::Enriched(signal) => {
                info!(
                    side = %signal.side,
                    entry = signal.entry_price,
                    stop = signal.stop_loss,
                    confidence = signal.confidence,
                    size = signal.position_size,
                    "signal enriched"
                );
                state.latest_signal = Some(EvaluatedSignal::Actionable(signal.clone()));
                Some(signal)
            }
            EnrichOutcome::Rejected {
                reason,
                invariant_violation,
            } => {
                if invariant_violation {
                    self.invariant_rejections.fetch_add(1, Ordering::Relaxed);
                }
                warn!(%reason, "signal downgraded to NEUTRAL during enrichment");
                let mut neutral = raw;
                neutral.side = crate::types::SignalSide::Neutral;
                neutral.reasons.push(reason);
                state.latest_signal = Some(EvaluatedSignal::Neutral(neutral));
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MarketEngine
// ---------------------------------------------------------------------------

pub struct MarketEngine {
    config: EngineConfig,
    core: Arc<EngineCore>,
    history: Arc<dyn HistoryProvider>,
    ingress: RwLock<Option<mpsc::Sender<TickEvent>>>,
    running: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    loop_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MarketEngine {
    /// Wire the engine explicitly from its ports. `ConfigError` is the only
    /// construction failure.
    pub fn new(
        config: EngineConfig,
        history: Arc<dyn HistoryProvider>,
        repository: Arc<dyn OrderRepository>,
        top_of_book: Option<Arc<dyn TopOfBook>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let matcher = Arc::new(PaperMatcher::new(
            repository,
            config.leverage,
            config.maintenance_margin_rate,
        ));
        let core = Arc::new(EngineCore {
            state: Arc::new(RwLock::new(EngineState::new(&config))),
            matcher,
            top_of_book,
            signal_engine: SignalEngine::new(&config),
            enricher: SignalEnricher::new(&config),
            signal_hub: FanoutHub::new(config.signal_channel_capacity),
            candle_hub: FanoutHub::new(config.candle_channel_capacity),
            signal_listeners: RwLock::new(Vec::new()),
            update_listeners: RwLock::new(Vec::new()),
            invariant_rejections: AtomicU64::new(0),
            last_warmup: RwLock::new(None),
            config: config.clone(),
        });

        Ok(Self {
            config,
            core,
            history,
            ingress: RwLock::new(None),
            running: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            loop_handle: tokio::sync::Mutex::new(None),
        })
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Begin consuming ticks. Non-blocking and idempotent: warm-up and the
    /// ingestion loop run on a spawned task; ticks arriving during warm-up
    /// queue in the bounded ingress.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("start() ignored - engine already running");
            return Ok(());
        }
        self.cancel.store(false, Ordering::SeqCst);

        // A restart begins from clean state and re-runs warm-up.
        *self.core.state.write() = EngineState::new(&self.config);
        *self.core.last_warmup.write() = None;
        self.core.signal_hub.reopen();
        self.core.candle_hub.reopen();

        let (tx, mut rx) = mpsc::channel(self.config.ingress_capacity);
        *self.ingress.write() = Some(tx);

        let core = self.core.clone();
        let history = self.history.clone();
        let loader = WarmupLoader::new(&self.config);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            let result = loader.run(history.as_ref(), &core.state, &cancel).await;
            core.state.write().warmup_ok = result.success;
            *core.last_warmup.write() = Some(result);

            info!("ingestion loop live");
            // Ticks queued before the shutdown marker still drain; the
            // bounded grace window in stop() caps how long that may take.
            while let Some(event) = rx.recv().await {
                match event {
                    TickEvent::Tick { candle, is_closed } => core.process_tick(candle, is_closed),
                    TickEvent::Shutdown => break,
                }
            }

            // Drain: forming state is discarded, subscribers see closure.
            core.state.write().aggregator.flush();
            core.signal_hub.close();
            core.candle_hub.close();
            info!("ingestion loop stopped");
        });
        *self.loop_handle.lock().await = Some(handle);

        info!(symbol = %self.config.symbol, "engine started");
        Ok(())
    }

    /// Drain and halt. Idempotent; an in-flight warm-up aborts with
    /// `success = false`. The ingestion task gets a bounded grace window
    /// before being aborted outright.
    pub async fn stop(&self) {
        let tx = self.ingress.write().take();
        let Some(tx) = tx else {
            debug!("stop() ignored - engine not running");
            return;
        };
        self.cancel.store(true, Ordering::SeqCst);
        let _ = tx.send(TickEvent::Shutdown).await;
        drop(tx);

        if let Some(mut handle) = self.loop_handle.lock().await.take() {
            let grace = std::time::Duration::from_secs(self.config.shutdown_grace_secs);
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!(grace_secs = self.config.shutdown_grace_secs, "drain grace expired - aborting ingestion task");
                handle.abort();
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("engine stopped");
    }

    /// Sole ingress: one 1m candle update. `is_closed = false` refreshes the
    /// forming bar, `is_closed = true` commits it. Applies back-pressure by
    /// awaiting space in the bounded ingress; ticks sent while the engine is
    /// stopped are ignored.
    pub async fn on_tick(&self, candle: Candle, is_closed: bool) -> Result<()> {
        let tx = self.ingress.read().as_ref().cloned();
        match tx {
            Some(tx) => tx
                .send(TickEvent::Tick { candle, is_closed })
                .await
                .map_err(|_| anyhow!("ingestion loop closed")),
            None => {
                debug!("tick ignored - engine not running");
                Ok(())
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Bounded async channel of enriched signals (drop-oldest on lag).
    pub fn subscribe_signals(&self) -> Subscription<SignalEvent> {
        self.core.signal_hub.subscribe()
    }

    /// Bounded async channel of committed candle closes.
    pub fn subscribe_candles(&self) -> Subscription<CandleCloseEvent> {
        self.core.candle_hub.subscribe()
    }

    /// Synchronous signal listener, invoked on the ingestion task.
    pub fn register_signal_listener(
        &self,
        listener: impl Fn(&EnrichedSignal, &str) + Send + Sync + 'static,
    ) {
        self.core.signal_listeners.write().push(Box::new(listener));
    }

    /// Synchronous listener invoked after each non-NEUTRAL engine turn.
    pub fn register_update_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.core.update_listeners.write().push(Box::new(listener));
    }

    /// Synchronous callback on every committed 15m bar.
    pub fn on_15m_close(&self, callback: CloseCallback) {
        self.core.state.write().aggregator.on_15m_close(callback);
    }

    /// Synchronous callback on every committed 1h bar.
    pub fn on_1h_close(&self, callback: CloseCallback) {
        self.core.state.write().aggregator.on_1h_close(callback);
    }

    // -------------------------------------------------------------------------
    // Snapshot accessors (safe from any thread)
    // -------------------------------------------------------------------------

    /// Latest committed candle for a timeframe.
    pub fn latest_candle(&self, timeframe: Timeframe) -> Option<Candle> {
        self.core
            .state
            .read()
            .aggregator
            .buffer(timeframe)
            .latest()
            .cloned()
    }

    /// The most recent `n` committed candles for a timeframe, oldest-first.
    pub fn recent_candles(&self, timeframe: Timeframe, n: usize) -> Vec<Candle> {
        self.core.state.read().aggregator.buffer(timeframe).last(n)
    }

    /// Ephemeral forming bar for live charts (1m, 15m, or 1h).
    pub fn forming_candle(&self, timeframe: Timeframe) -> Option<Candle> {
        let state = self.core.state.read();
        match timeframe {
            Timeframe::M1 => state.aggregator.forming_1m().cloned(),
            Timeframe::M15 => state.aggregator.forming_15m(),
            Timeframe::H1 => state.aggregator.forming_1h(),
            _ => None,
        }
    }

    /// Latest indicator snapshot from the most recent evaluation turn.
    pub fn latest_indicators(&self) -> Option<IndicatorSnapshot> {
        self.core.state.read().latest_snapshot.clone()
    }

    /// The engine retains only the most recent signal.
    pub fn latest_signal(&self) -> Option<EvaluatedSignal> {
        self.core.state.read().latest_signal.clone()
    }

    /// Session VWAP for the current UTC day.
    pub fn vwap(&self) -> Option<f64> {
        self.core.state.read().vwap.value()
    }

    /// Result of the most recent warm-up pass.
    pub fn last_warmup(&self) -> Option<WarmupResult> {
        self.core.last_warmup.read().clone()
    }

    /// Health and back-pressure counters.
    pub fn health(&self) -> EngineHealth {
        let state = self.core.state.read();
        let counters = self.core.matcher.counters().snapshot();
        EngineHealth {
            is_running: self.is_running(),
            warmup_ok: state.warmup_ok,
            last_tick_time: state.last_tick_time,
            dropped_updates: self.core.signal_hub.dropped_total()
                + self.core.candle_hub.dropped_total(),
            matcher_errors: counters.matcher_errors
                + self.core.invariant_rejections.load(Ordering::Relaxed),
            sl_tiebreaks: counters.sl_tiebreaks,
            close_precedence_invoked: counters.close_precedence_invoked,
            state_corruptions: state.aggregator.state_corruptions(),
        }
    }

    /// Paper account summary derived from the repository.
    pub fn account(&self) -> AccountSummary {
        let repository = self.core.matcher.repository();
        let wallet = repository.account_balance().unwrap_or_else(|e| {
            error!(error = %e, "wallet read failed - reporting configured account size");
            self.config.account_size
        });
        let pending = repository.get_pending().unwrap_or_default();
        let open = repository.get_active().unwrap_or_default();
        let closed = repository.get_closed(usize::MAX).unwrap_or_default();
        AccountSummary::derive(wallet, &pending, &open, &closed)
    }

    pub fn pending_positions(&self) -> Vec<PaperPosition> {
        self.core.matcher.repository().get_pending().unwrap_or_default()
    }

    pub fn open_positions(&self) -> Vec<PaperPosition> {
        self.core.matcher.repository().get_active().unwrap_or_default()
    }

    pub fn closed_positions(&self, limit: usize) -> Vec<PaperPosition> {
        self.core.matcher.repository().get_closed(limit).unwrap_or_default()
    }

    /// Manually close a position at `price`. Idempotent.
    pub fn close_position(&self, id: &str, price: f64) {
        let now = self
            .core
            .state
            .read()
            .last_tick_time
            .unwrap_or_else(Utc::now);
        self.core.matcher.close_manual(id, price, now);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::InMemoryOrderRepository;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use std::time::Duration as StdDuration;

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

    fn minute_candle(minute: i64, open: f64, close: f64) -> Candle {
        // Live 1m stream begins after the warm-up history above.
        let ts = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap() + Duration::minutes(minute);
        let high = open.max(close) + 0.5;
        let low = open.min(close) - 0.5;
        Candle::new(ts, open, high, low, close, 1.0).unwrap()
    }

    fn engine_with_history(candles: Vec<Candle>) -> MarketEngine {
        MarketEngine::new(
            EngineConfig::default(),
            Arc::new(FixedHistory { candles }),
            Arc::new(InMemoryOrderRepository::new(10_000.0)),
            None,
        )
        .unwrap()
    }

    async fn wait_until_live(engine: &MarketEngine) {
        for _ in 0..100 {
            if engine.last_warmup().is_some() {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        panic!("warm-up never completed");
    }

    #[test]
    fn invalid_config_fails_construction() {
        let mut config = EngineConfig::default();
        config.risk_pct = 0.5;
        let result = MarketEngine::new(
            config,
            Arc::new(FixedHistory { candles: vec![] }),
            Arc::new(InMemoryOrderRepository::new(10_000.0)),
            None,
        );
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[tokio::test]
    async fn start_is_idempotent_and_runs_warmup() {
        let engine = engine_with_history(rising_15m_candles(200));
        engine.start().await.unwrap();
        engine.start().await.unwrap(); // no-op
        wait_until_live(&engine).await;

        let warmup = engine.last_warmup().unwrap();
        assert!(warmup.success);
        assert_eq!(warmup.candles_processed, 200);
        assert!(engine.health().warmup_ok);
        assert!(engine.is_running());
        assert!(engine.latest_signal().is_none());

        engine.stop().await;
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn ticks_aggregate_and_publish_close_events() {
        let engine = engine_with_history(rising_15m_candles(100));
        let mut candle_events = engine.subscribe_candles();
        engine.start().await.unwrap();
        wait_until_live(&engine).await;

        // Forming tick then commit, for 15 minutes.
        for m in 0..15 {
            let open = 100.0 + m as f64;
            engine
                .on_tick(minute_candle(m, open, open + 0.4), false)
                .await
                .unwrap();
            engine
                .on_tick(minute_candle(m, open, open + 1.0), true)
                .await
                .unwrap();
        }
        engine.stop().await;

        let mut m1_closes = 0;
        let mut m15_closes = 0;
        while let Some(event) = candle_events.recv().await {
            match event.timeframe {
                Timeframe::M1 => m1_closes += 1,
                Timeframe::M15 => m15_closes += 1,
                _ => {}
            }
        }
        assert_eq!(m1_closes, 15);
        assert_eq!(m15_closes, 1);

        let latest = engine.latest_candle(Timeframe::M15).unwrap();
        assert_eq!(latest.open, 100.0);
        assert_eq!(latest.close, 115.0);
    }

    #[tokio::test]
    async fn forming_candle_visible_before_commit() {
        let engine = engine_with_history(rising_15m_candles(100));
        engine.start().await.unwrap();
        wait_until_live(&engine).await;

        engine
            .on_tick(minute_candle(0, 100.0, 100.2), false)
            .await
            .unwrap();
        // Give the ingestion task a moment to process.
        for _ in 0..100 {
            if engine.forming_candle(Timeframe::M1).is_some() {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }

        assert!(engine.forming_candle(Timeframe::M1).is_some());
        assert!(engine.forming_candle(Timeframe::M15).is_some());
        // Nothing committed yet.
        assert!(engine.latest_candle(Timeframe::M1).is_none());
        engine.stop().await;
    }

    #[tokio::test]
    async fn restart_rebuilds_state_and_reruns_warmup() {
        let engine = engine_with_history(rising_15m_candles(150));
        engine.start().await.unwrap();
        wait_until_live(&engine).await;

        engine.on_tick(minute_candle(0, 100.0, 100.5), true).await.unwrap();
        engine.stop().await;

        let first = engine.last_warmup().unwrap();
        engine.start().await.unwrap();
        wait_until_live(&engine).await;
        engine.stop().await;

        let second = engine.last_warmup().unwrap();
        assert!(second.success);
        // Same history, same indicator readback.
        assert_eq!(first.candles_processed, second.candles_processed);
        assert!((first.vwap_value - second.vwap_value).abs() < 1e-9);
        assert!((first.adx_value - second.adx_value).abs() < 1e-9);
        // The live 1m candle from the first run is gone.
        assert!(engine.latest_candle(Timeframe::M1).is_none());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_ticks_after_stop_are_ignored() {
        let engine = engine_with_history(rising_15m_candles(100));
        engine.start().await.unwrap();
        wait_until_live(&engine).await;
        engine.stop().await;
        engine.stop().await;

        // Ignored without error.
        engine.on_tick(minute_candle(0, 100.0, 100.5), true).await.unwrap();
        assert!(engine.latest_candle(Timeframe::M1).is_none());
    }

    #[tokio::test]
    async fn health_reports_counters() {
        let engine = engine_with_history(rising_15m_candles(100));
        engine.start().await.unwrap();
        wait_until_live(&engine).await;
        engine.on_tick(minute_candle(0, 100.0, 100.5), true).await.unwrap();
        engine.stop().await;

        let health = engine.health();
        assert!(health.warmup_ok);
        assert!(health.last_tick_time.is_some());
        assert_eq!(health.matcher_errors, 0);
        assert_eq!(health.sl_tiebreaks, 0);
        assert_eq!(health.state_corruptions, 0);
    }

    #[tokio::test]
    async fn account_snapshot_reflects_repository() {
        let engine = engine_with_history(rising_15m_candles(100));
        let account = engine.account();
        assert!((account.wallet_balance - 10_000.0).abs() < 1e-9);
        assert_eq!(account.open_positions, 0);
        assert_eq!(account.pending_positions, 0);
    }
}
