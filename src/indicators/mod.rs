// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicator kernels used by the
// signal engine. Insufficient data is always a typed "not-ready" value
// (`Option::None` or an empty series), never a panic or an error, so callers
// are forced to treat not-ready as non-signal.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod rsi;
pub mod stoch_rsi;
pub mod swing;
pub mod volume;
pub mod vwap;

pub use adx::AdxResult;
pub use bollinger::BollingerBands;
pub use rsi::RsiZone;
pub use stoch_rsi::{StochRsi, StochRsiZone};
pub use swing::{SwingDetector, SwingPoint};
pub use volume::{SpikeIntensity, VolumeSpike};
pub use vwap::VwapState;
