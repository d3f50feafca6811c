// =============================================================================
// Engine configuration
// =============================================================================
//
// Every tunable lives here. All fields carry serde defaults so that a
// partial JSON document deserialises cleanly; `validate()` is the single
// gate and the only construction-time failure of the whole engine
// (`EngineError::Config`). Loading from files, flags, or the environment is
// the caller's concern.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::Timeframe;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_analysis_timeframe() -> Timeframe {
    Timeframe::M15
}

fn default_account_size() -> f64 {
    10_000.0
}

fn default_risk_pct() -> f64 {
    0.01
}

fn default_leverage() -> f64 {
    1.0
}

fn default_maintenance_margin_rate() -> f64 {
    0.004
}

fn default_warmup_limit() -> usize {
    1000
}

fn default_buffer_capacity_1m() -> usize {
    2000
}

fn default_buffer_capacity_htf() -> usize {
    200
}

fn default_ingress_capacity() -> usize {
    1024
}

fn default_signal_channel_capacity() -> usize {
    64
}

fn default_candle_channel_capacity() -> usize {
    256
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

fn default_book_ticker_max_age_secs() -> i64 {
    5
}

fn default_rsi_period() -> usize {
    6
}

fn default_stoch_rsi_period() -> usize {
    14
}

fn default_stoch_period() -> usize {
    14
}

fn default_stoch_k_period() -> usize {
    3
}

fn default_stoch_d_period() -> usize {
    3
}

fn default_bollinger_period() -> usize {
    20
}

fn default_bollinger_std() -> f64 {
    2.0
}

fn default_atr_period() -> usize {
    14
}

fn default_adx_period() -> usize {
    14
}

fn default_ema_fast_period() -> usize {
    7
}

fn default_ema_slow_period() -> usize {
    25
}

fn default_volume_ma_period() -> usize {
    20
}

fn default_volume_spike_threshold() -> f64 {
    2.0
}

fn default_strict_volume_spike_threshold() -> f64 {
    2.5
}

fn default_volume_climax_threshold() -> f64 {
    4.0
}

fn default_swing_lookback() -> usize {
    5
}

fn default_entry_offset_pct() -> f64 {
    0.001
}

fn default_max_ema_distance_pct() -> f64 {
    0.005
}

fn default_stop_buffer_pct() -> f64 {
    0.001
}

fn default_min_stop_distance_pct() -> f64 {
    0.015
}

fn default_min_risk_reward() -> f64 {
    1.5
}

fn default_tp3_extension_pct() -> f64 {
    0.015
}

fn default_tp_weights() -> [f64; 3] {
    [0.6, 0.3, 0.1]
}

fn default_atr_tp_weights() -> [f64; 3] {
    [0.5, 0.3, 0.2]
}

fn default_bb_pullback_threshold_pct() -> f64 {
    0.015
}

fn default_vwap_pullback_max_distance_pct() -> f64 {
    1.0
}

fn default_min_candles_for_signal() -> usize {
    50
}

// =============================================================================
// IndicatorParams
// =============================================================================

/// Look-back periods for the indicator kernels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorParams {
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    #[serde(default = "default_stoch_rsi_period")]
    pub stoch_rsi_period: usize,
    #[serde(default = "default_stoch_period")]
    pub stoch_period: usize,
    #[serde(default = "default_stoch_k_period")]
    pub stoch_k_period: usize,
    #[serde(default = "default_stoch_d_period")]
    pub stoch_d_period: usize,

    #[serde(default = "default_bollinger_period")]
    pub bollinger_period: usize,
    #[serde(default = "default_bollinger_std")]
    pub bollinger_std: f64,

    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_adx_period")]
    pub adx_period: usize,

    #[serde(default = "default_ema_fast_period")]
    pub ema_fast_period: usize,
    #[serde(default = "default_ema_slow_period")]
    pub ema_slow_period: usize,

    #[serde(default = "default_volume_ma_period")]
    pub volume_ma_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: default_rsi_period(),
            stoch_rsi_period: default_stoch_rsi_period(),
            stoch_period: default_stoch_period(),
            stoch_k_period: default_stoch_k_period(),
            stoch_d_period: default_stoch_d_period(),
            bollinger_period: default_bollinger_period(),
            bollinger_std: default_bollinger_std(),
            atr_period: default_atr_period(),
            adx_period: default_adx_period(),
            ema_fast_period: default_ema_fast_period(),
            ema_slow_period: default_ema_slow_period(),
            volume_ma_period: default_volume_ma_period(),
        }
    }
}

// =============================================================================
// StrategyParams
// =============================================================================

/// Tunable parameters for the trend-pullback strategy and enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Volume ratio at which a spike counts, normal mode.
    #[serde(default = "default_volume_spike_threshold")]
    pub volume_spike_threshold: f64,

    /// Stricter spike threshold used in strict mode.
    #[serde(default = "default_strict_volume_spike_threshold")]
    pub strict_volume_spike_threshold: f64,

    /// Volume ratio at which a candidate signal is downgraded to NEUTRAL.
    #[serde(default = "default_volume_climax_threshold")]
    pub volume_climax_threshold: f64,

    #[serde(default = "default_swing_lookback")]
    pub swing_lookback: usize,

    /// Offset applied to the candle midpoint / swing price for limit entries.
    #[serde(default = "default_entry_offset_pct")]
    pub entry_offset_pct: f64,

    /// A swing-anchored entry must sit within this band of the fast EMA.
    #[serde(default = "default_max_ema_distance_pct")]
    pub max_ema_distance_pct: f64,

    /// Buffer past a swing/EMA level for structural stops.
    #[serde(default = "default_stop_buffer_pct")]
    pub stop_buffer_pct: f64,

    /// Minimum stop distance as a fraction of entry.
    #[serde(default = "default_min_stop_distance_pct")]
    pub min_stop_distance_pct: f64,

    /// Minimum reward-to-risk ratio for TP1.
    #[serde(default = "default_min_risk_reward")]
    pub min_risk_reward: f64,

    /// TP3 extension past TP2.
    #[serde(default = "default_tp3_extension_pct")]
    pub tp3_extension_pct: f64,

    /// Partial close weights for S/R and risk-multiple ladders.
    #[serde(default = "default_tp_weights")]
    pub tp_weights: [f64; 3],

    /// Partial close weights for ATR-multiple ladders.
    #[serde(default = "default_atr_tp_weights")]
    pub atr_tp_weights: [f64; 3],

    /// "Near the band" threshold for the pullback setup.
    #[serde(default = "default_bb_pullback_threshold_pct")]
    pub bb_pullback_threshold_pct: f64,

    /// Maximum percent distance from VWAP for the pullback setup.
    #[serde(default = "default_vwap_pullback_max_distance_pct")]
    pub vwap_pullback_max_distance_pct: f64,

    /// Minimum history before the rule evaluator runs (EMA50-class).
    #[serde(default = "default_min_candles_for_signal")]
    pub min_candles_for_signal: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            volume_spike_threshold: default_volume_spike_threshold(),
            strict_volume_spike_threshold: default_strict_volume_spike_threshold(),
            volume_climax_threshold: default_volume_climax_threshold(),
            swing_lookback: default_swing_lookback(),
            entry_offset_pct: default_entry_offset_pct(),
            max_ema_distance_pct: default_max_ema_distance_pct(),
            stop_buffer_pct: default_stop_buffer_pct(),
            min_stop_distance_pct: default_min_stop_distance_pct(),
            min_risk_reward: default_min_risk_reward(),
            tp3_extension_pct: default_tp3_extension_pct(),
            tp_weights: default_tp_weights(),
            atr_tp_weights: default_atr_tp_weights(),
            bb_pullback_threshold_pct: default_bb_pullback_threshold_pct(),
            vwap_pullback_max_distance_pct: default_vwap_pullback_max_distance_pct(),
            min_candles_for_signal: default_min_candles_for_signal(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Timeframe the signal engine evaluates on (15m or 1h).
    #[serde(default = "default_analysis_timeframe")]
    pub analysis_timeframe: Timeframe,

    /// Strict mode: 4 of 5 conditions, mandatory trend, stricter volume.
    #[serde(default = "default_true")]
    pub strict_mode: bool,

    /// Enable ADX/ATR filters in evaluation.
    #[serde(default = "default_true")]
    pub use_filters: bool,

    /// Account size used for risk sizing when the repository has no wallet.
    #[serde(default = "default_account_size")]
    pub account_size: f64,

    /// Fraction of the account risked per trade, in (0, 0.05].
    #[serde(default = "default_risk_pct")]
    pub risk_pct: f64,

    #[serde(default = "default_leverage")]
    pub leverage: f64,

    #[serde(default = "default_maintenance_margin_rate")]
    pub maintenance_margin_rate: f64,

    /// Historical candles fetched during warm-up.
    #[serde(default = "default_warmup_limit")]
    pub warmup_limit: usize,

    #[serde(default = "default_buffer_capacity_1m")]
    pub buffer_capacity_1m: usize,

    #[serde(default = "default_buffer_capacity_htf")]
    pub buffer_capacity_htf: usize,

    /// Bounded ingress queue between `on_tick` and the ingestion loop.
    #[serde(default = "default_ingress_capacity")]
    pub ingress_capacity: usize,

    /// Per-subscriber backlog for signal events.
    #[serde(default = "default_signal_channel_capacity")]
    pub signal_channel_capacity: usize,

    /// Per-subscriber backlog for candle-close events.
    #[serde(default = "default_candle_channel_capacity")]
    pub candle_channel_capacity: usize,

    /// Grace window for the ingestion task to drain on `stop()`.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Maximum age of a top-of-book quote before the enricher ignores it.
    #[serde(default = "default_book_ticker_max_age_secs")]
    pub book_ticker_max_age_secs: i64,

    #[serde(default)]
    pub indicators: IndicatorParams,

    #[serde(default)]
    pub strategy: StrategyParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            analysis_timeframe: default_analysis_timeframe(),
            strict_mode: true,
            use_filters: true,
            account_size: default_account_size(),
            risk_pct: default_risk_pct(),
            leverage: default_leverage(),
            maintenance_margin_rate: default_maintenance_margin_rate(),
            warmup_limit: default_warmup_limit(),
            buffer_capacity_1m: default_buffer_capacity_1m(),
            buffer_capacity_htf: default_buffer_capacity_htf(),
            ingress_capacity: default_ingress_capacity(),
            signal_channel_capacity: default_signal_channel_capacity(),
            candle_channel_capacity: default_candle_channel_capacity(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            book_ticker_max_age_secs: default_book_ticker_max_age_secs(),
            indicators: IndicatorParams::default(),
            strategy: StrategyParams::default(),
        }
    }
}

impl EngineConfig {
    /// The spike threshold in effect for the configured mode.
    pub fn effective_volume_threshold(&self) -> f64 {
        if self.strict_mode {
            self.strategy.strict_volume_spike_threshold
        } else {
            self.strategy.volume_spike_threshold
        }
    }

    /// Reject out-of-range settings. The orchestrator calls this once at
    /// construction; nothing else in the engine can fail to build.
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: String| Err(EngineError::Config(msg));

        if self.symbol.trim().is_empty() {
            return fail("symbol must not be empty".into());
        }
        if !matches!(self.analysis_timeframe, Timeframe::M15 | Timeframe::H1) {
            return fail(format!(
                "analysis timeframe must be 15m or 1h, got {}",
                self.analysis_timeframe
            ));
        }
        if self.risk_pct <= 0.0 || self.risk_pct > 0.05 {
            return fail(format!(
                "risk_pct must lie in (0, 0.05], got {}",
                self.risk_pct
            ));
        }
        if self.account_size <= 0.0 || !self.account_size.is_finite() {
            return fail(format!("account_size must be positive, got {}", self.account_size));
        }
        if self.leverage < 1.0 || !self.leverage.is_finite() {
            return fail(format!("leverage must be >= 1, got {}", self.leverage));
        }
        if !(0.0..0.05).contains(&self.maintenance_margin_rate) {
            return fail(format!(
                "maintenance_margin_rate must lie in [0, 0.05), got {}",
                self.maintenance_margin_rate
            ));
        }
        if self.warmup_limit == 0 {
            return fail("warmup_limit must be positive".into());
        }
        if self.buffer_capacity_1m == 0 || self.buffer_capacity_htf == 0 {
            return fail("buffer capacities must be positive".into());
        }
        if self.ingress_capacity == 0
            || self.signal_channel_capacity == 0
            || self.candle_channel_capacity == 0
        {
            return fail("channel capacities must be positive".into());
        }
        if self.shutdown_grace_secs == 0 {
            return fail("shutdown grace must be positive".into());
        }

        let s = &self.strategy;
        if s.volume_climax_threshold < s.volume_spike_threshold
            || s.volume_climax_threshold < s.strict_volume_spike_threshold
        {
            return fail(format!(
                "volume climax threshold {} must not undercut the spike thresholds",
                s.volume_climax_threshold
            ));
        }
        if s.min_risk_reward < 1.0 {
            return fail(format!(
                "min_risk_reward must be >= 1.0, got {}",
                s.min_risk_reward
            ));
        }
        if s.swing_lookback == 0 {
            return fail("swing_lookback must be positive".into());
        }
        if !(0.0..=0.05).contains(&s.tp3_extension_pct) {
            return fail(format!(
                "tp3_extension_pct must lie in [0, 0.05], got {}",
                s.tp3_extension_pct
            ));
        }
        for weights in [&s.tp_weights, &s.atr_tp_weights] {
            let sum: f64 = weights.iter().sum();
            if (sum - 1.0).abs() > 1e-9 || weights.iter().any(|&w| w <= 0.0) {
                return fail(format!("TP weights must be positive and sum to 1, got {weights:?}"));
            }
        }
        if s.min_stop_distance_pct <= 0.0 || s.min_stop_distance_pct >= 0.2 {
            return fail(format!(
                "min_stop_distance_pct must lie in (0, 0.2), got {}",
                s.min_stop_distance_pct
            ));
        }

        let i = &self.indicators;
        for (name, period) in [
            ("rsi_period", i.rsi_period),
            ("stoch_rsi_period", i.stoch_rsi_period),
            ("stoch_period", i.stoch_period),
            ("stoch_k_period", i.stoch_k_period),
            ("stoch_d_period", i.stoch_d_period),
            ("bollinger_period", i.bollinger_period),
            ("atr_period", i.atr_period),
            ("adx_period", i.adx_period),
            ("ema_fast_period", i.ema_fast_period),
            ("ema_slow_period", i.ema_slow_period),
            ("volume_ma_period", i.volume_ma_period),
        ] {
            if period == 0 {
                return fail(format!("{name} must be positive"));
            }
        }
        if i.ema_fast_period >= i.ema_slow_period {
            return fail(format!(
                "ema_fast_period {} must be shorter than ema_slow_period {}",
                i.ema_fast_period, i.ema_slow_period
            ));
        }

        Ok(())
    }
}
