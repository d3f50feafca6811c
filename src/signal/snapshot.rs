// =============================================================================
// IndicatorSnapshot — typed indicator values for one evaluation bar
// =============================================================================
//
// Every indicator consumer gets a typed field; there is no generic map. A
// `None` field means the kernel was not ready on this bar, and downstream
// rules treat it as non-signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::config::IndicatorParams;
use crate::indicators::{
    adx, atr, bollinger, ema, rsi, stoch_rsi, volume, vwap, AdxResult, BollingerBands, RsiZone,
    StochRsi, VolumeSpike,
};
use crate::market_data::Candle;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    /// Close of the evaluation bar.
    pub price: f64,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap: Option<f64>,
    /// Signed distance of price from VWAP, percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vwap_distance_pct: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bollinger: Option<BollingerBands>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stoch: Option<StochRsi>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi_zone: Option<RsiZone>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub atr: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub adx: Option<AdxResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_fast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema_slow: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeSpike>,
}

impl IndicatorSnapshot {
    /// Compute the full snapshot over the evaluation window.
    ///
    /// `vwap_value` comes from the engine's streaming per-symbol state (it is
    /// day-scoped, not window-scoped). `volume_threshold` is the effective
    /// spike threshold (strict or normal).
    pub fn compute(
        candles: &[Candle],
        vwap_value: Option<f64>,
        params: &IndicatorParams,
        volume_threshold: f64,
    ) -> Option<Self> {
        let last = candles.last()?;
        let price = last.close;

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let rsi_value = rsi::latest_rsi(&closes, params.rsi_period);

        Some(Self {
            price,
            timestamp: last.timestamp,
            vwap: vwap_value,
            vwap_distance_pct: vwap_value.map(|v| vwap::distance_pct(price, v)),
            bollinger: bollinger::calculate_bollinger(
                &closes,
                params.bollinger_period,
                params.bollinger_std,
                price,
            ),
            stoch: stoch_rsi::calculate_stoch_rsi(
                &closes,
                params.stoch_rsi_period,
                params.stoch_period,
                params.stoch_k_period,
                params.stoch_d_period,
            ),
            rsi: rsi_value,
            rsi_zone: rsi_value.map(rsi::rsi_zone),
            atr: atr::calculate_atr(candles, params.atr_period),
            adx: adx::calculate_adx(candles, params.adx_period),
            ema_fast: ema::latest_ema(&closes, params.ema_fast_period),
            ema_slow: ema::latest_ema(&closes, params.ema_slow_period),
            volume: volume::detect_spike(&volumes, params.volume_ma_period, volume_threshold),
        })
    }

    /// Whether ADX reports a trending market. Defaults to `true` when ADX is
    /// not ready — absence of evidence never penalises a signal.
    pub fn adx_trending(&self) -> bool {
        self.adx.map_or(true, |a| a.is_trending())
    }

    /// Current volume ratio over its MA, when ready.
    pub fn volume_ratio(&self) -> Option<f64> {
        self.volume.map(|v| v.ratio)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                    + Duration::minutes(15 * i as i64);
                let base = 100.0 + (i as f64 * 0.4).sin() * 3.0;
                Candle::new(ts, base, base + 1.0, base - 1.0, base + 0.3, 100.0).unwrap()
            })
            .collect()
    }

    #[test]
    fn empty_slice_yields_none() {
        let params = IndicatorParams::default();
        assert!(IndicatorSnapshot::compute(&[], None, &params, 2.0).is_none());
    }

    #[test]
    fn full_window_populates_all_kernels() {
        let params = IndicatorParams::default();
        let snap = IndicatorSnapshot::compute(&candles(100), Some(100.0), &params, 2.0).unwrap();
        assert!(snap.rsi.is_some());
        assert!(snap.atr.is_some());
        assert!(snap.adx.is_some());
        assert!(snap.bollinger.is_some());
        assert!(snap.stoch.is_some());
        assert!(snap.ema_fast.is_some());
        assert!(snap.ema_slow.is_some());
        assert!(snap.volume.is_some());
        assert!(snap.vwap_distance_pct.is_some());
    }

    #[test]
    fn short_window_leaves_not_ready_fields() {
        let params = IndicatorParams::default();
        let snap = IndicatorSnapshot::compute(&candles(5), None, &params, 2.0).unwrap();
        assert!(snap.adx.is_none());
        assert!(snap.stoch.is_none());
        assert!(snap.ema_slow.is_none());
        assert!(snap.vwap.is_none());
        // Price is always present.
        assert!(snap.price > 0.0);
    }

    #[test]
    fn adx_trending_defaults_true_when_not_ready() {
        let params = IndicatorParams::default();
        let snap = IndicatorSnapshot::compute(&candles(5), None, &params, 2.0).unwrap();
        assert!(snap.adx_trending());
    }
}
