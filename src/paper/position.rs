// =============================================================================
// PaperPosition — simulated isolated-margin position
// =============================================================================
//
// Life-cycle: PENDING (limit resting) -> OPEN (limit filled, margin
// reserved) -> CLOSED (TP ladder exhausted, stop, liquidation, or manual).
// CLOSED is terminal. Partial take-profits reduce the open quantity without
// leaving the OPEN state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::signal::EnrichedSignal;
use crate::types::{ExitReason, TradeSide};

/// Position state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Pending,
    Open,
    Closed,
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// One rung of the take-profit ladder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TpLevel {
    pub price: f64,
    /// Fraction of the initial quantity closed at this level.
    pub weight: f64,
    #[serde(default)]
    pub filled: bool,
}

/// A single tracked paper position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperPosition {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub symbol: String,
    pub side: TradeSide,
    /// Remaining open quantity (reduced on partial TP fills).
    pub quantity: f64,
    /// Quantity at creation; partial-fill weights apply to this.
    pub initial_quantity: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: Vec<TpLevel>,
    /// Margin still reserved for the open remainder.
    pub margin: f64,
    pub leverage: f64,
    /// `None` at 1x leverage — liquidation is unreachable.
    #[serde(default)]
    pub liquidation_price: Option<f64>,
    pub state: PositionState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub open_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
    /// Realised PnL accumulated over partial fills and the final close.
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub exit_reason: Option<ExitReason>,
    /// Latest mark price seen by the matcher.
    #[serde(default)]
    pub mark_price: f64,
}

impl PaperPosition {
    /// Build a PENDING position from an enriched signal.
    ///
    /// Rejects signals whose risk plan is out of order or whose size is not
    /// positive — the matcher never persists an unopenable position.
    pub fn from_signal(
        signal: &EnrichedSignal,
        symbol: &str,
        leverage: f64,
        maintenance_margin_rate: f64,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let side = TradeSide::from_signal(signal.side).ok_or_else(|| {
            EngineError::MatcherInvariant("neutral signal cannot open a position".to_string())
        })?;

        if signal.position_size <= 0.0 {
            return Err(EngineError::MatcherInvariant(
                "position size must be positive".to_string(),
            ));
        }
        let ordered = match side {
            TradeSide::Long => signal.stop_loss < signal.entry_price,
            TradeSide::Short => signal.stop_loss > signal.entry_price,
        };
        if !ordered {
            return Err(EngineError::MatcherInvariant(format!(
                "stop {} on wrong side of entry {} for {side}",
                signal.stop_loss, signal.entry_price
            )));
        }

        let margin = signal.entry_price * signal.position_size / leverage.max(1.0);
        let take_profit = signal
            .tp
            .levels()
            .iter()
            .map(|&(price, weight)| TpLevel {
                price,
                weight,
                filled: false,
            })
            .collect();

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            quantity: signal.position_size,
            initial_quantity: signal.position_size,
            entry_price: signal.entry_price,
            stop_loss: signal.stop_loss,
            take_profit,
            margin,
            leverage: leverage.max(1.0),
            liquidation_price: liquidation_price(
                signal.entry_price,
                side,
                leverage,
                maintenance_margin_rate,
            ),
            state: PositionState::Pending,
            created_at: now,
            open_time: None,
            close_time: None,
            realized_pnl: 0.0,
            exit_reason: None,
            mark_price: signal.entry_price,
        })
    }

    /// Unrealised PnL of the remaining quantity at `mark`.
    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        if self.state != PositionState::Open {
            return 0.0;
        }
        self.side.direction() * (mark - self.entry_price) * self.quantity
    }

    /// The next unfilled rung of the TP ladder.
    pub fn next_tp(&self) -> Option<(usize, TpLevel)> {
        self.take_profit
            .iter()
            .enumerate()
            .find(|(_, level)| !level.filled)
            .map(|(i, level)| (i, *level))
    }

    pub fn is_terminal(&self) -> bool {
        self.state == PositionState::Closed
    }
}

/// Simplified isolated-margin liquidation price.
///
///   long:  entry * (1 - (1/leverage) * (1 - maintenance_rate))
///   short: entry * (1 + (1/leverage) * (1 - maintenance_rate))
///
/// At 1x (or below) the threshold sits at or past zero / double the entry,
/// so the position cannot be liquidated before the stop: returns `None` and
/// the matcher skips the check entirely.
pub fn liquidation_price(
    entry: f64,
    side: TradeSide,
    leverage: f64,
    maintenance_margin_rate: f64,
) -> Option<f64> {
    if leverage <= 1.0 + 1e-9 || !leverage.is_finite() {
        return None;
    }
    let offset = (1.0 / leverage) * (1.0 - maintenance_margin_rate);
    let price = match side {
        TradeSide::Long => entry * (1.0 - offset),
        TradeSide::Short => entry * (1.0 + offset),
    };
    (price.is_finite() && price > 0.0).then_some(price)
}
