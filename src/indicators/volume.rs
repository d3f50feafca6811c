// =============================================================================
// Volume analysis — rolling MA and spike detection
// =============================================================================
//
// A volume spike is the current volume at or above `threshold` times the
// moving average of the *previous* `ma_period` volumes (the current bar is
// excluded from its own baseline).
//
// Intensity bands: moderate >= 1.5x, strong >= 2.0x, extreme >= 3.0x.

use serde::{Deserialize, Serialize};

/// Spike intensity bucket derived from the volume ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpikeIntensity {
    #[default]
    None,
    Moderate,
    Strong,
    Extreme,
}

impl SpikeIntensity {
    /// Bucket a volume ratio.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 3.0 {
            Self::Extreme
        } else if ratio >= 2.0 {
            Self::Strong
        } else if ratio >= 1.5 {
            Self::Moderate
        } else {
            Self::None
        }
    }
}

impl std::fmt::Display for SpikeIntensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Moderate => write!(f, "moderate"),
            Self::Strong => write!(f, "strong"),
            Self::Extreme => write!(f, "extreme"),
        }
    }
}

/// Volume spike detection result for the latest bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VolumeSpike {
    /// current volume / MA of the previous `ma_period` volumes.
    pub ratio: f64,
    pub intensity: SpikeIntensity,
    /// `ratio >= threshold`.
    pub is_spike: bool,
    pub current_volume: f64,
    pub average_volume: f64,
}

/// Moving average of the `period` volumes preceding the latest one.
///
/// Requires `period + 1` values (baseline plus the current bar); returns
/// `None` otherwise or when the average is non-positive.
pub fn volume_ma(volumes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || volumes.len() < period + 1 {
        return None;
    }
    let baseline = &volumes[volumes.len() - 1 - period..volumes.len() - 1];
    let ma = baseline.iter().sum::<f64>() / period as f64;
    (ma.is_finite() && ma > 0.0).then_some(ma)
}

/// Detect whether the latest volume spikes above its moving average.
pub fn detect_spike(volumes: &[f64], ma_period: usize, threshold: f64) -> Option<VolumeSpike> {
    let average = volume_ma(volumes, ma_period)?;
    let current = *volumes.last()?;
    if current < 0.0 || !current.is_finite() {
        return None;
    }

    let ratio = current / average;
    Some(VolumeSpike {
        ratio,
        intensity: SpikeIntensity::from_ratio(ratio),
        is_spike: ratio >= threshold,
        current_volume: current,
        average_volume: average,
    })
}
