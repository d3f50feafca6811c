// =============================================================================
// Engine Module
// =============================================================================
//
//   config       — validated, serde-defaulted engine settings
//   fanout       — bounded drop-oldest subscriber hub
//   warmup       — historical backfill without signal emission
//   orchestrator — wires everything behind a single ingestion task

pub mod config;
pub mod fanout;
pub mod orchestrator;
pub mod warmup;

pub use config::EngineConfig;
pub use fanout::{FanoutHub, Subscription};
pub use orchestrator::{CandleCloseEvent, EngineHealth, MarketEngine, SignalEvent};
pub use warmup::WarmupResult;
