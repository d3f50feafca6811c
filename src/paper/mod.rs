// =============================================================================
// Paper Trading Module
// =============================================================================
//
// Simulated isolated-margin execution:
//   position   — PENDING / OPEN / CLOSED state machine with a TP ladder
//   repository — persistence port + in-memory reference implementation
//   matcher    — routes ticks into fills, partial TPs, stops, liquidations
//   account    — derived margin/balance summary and journal statistics

pub mod account;
pub mod matcher;
pub mod position;
pub mod repository;

pub use account::AccountSummary;
pub use matcher::{MarkTick, MatcherCounters, PaperMatcher};
pub use position::{PaperPosition, PositionState, TpLevel};
pub use repository::{InMemoryOrderRepository, OrderRepository};
