// =============================================================================
// Account summary — wallet plus per-tick derived margin figures
// =============================================================================
//
//   margin_balance = wallet + sum of unrealised PnL
//   used_margin    = sum of reserved margin across open positions
//   available      = max(0, margin_balance - used_margin)
//
// Journal statistics (win rate, profit factor) are derived from the closed
// history for the dashboard.

use serde::{Deserialize, Serialize};

use crate::paper::position::PaperPosition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    /// Realised wallet funds.
    pub wallet_balance: f64,
    /// Wallet plus unrealised PnL.
    pub margin_balance: f64,
    pub used_margin: f64,
    pub available_balance: f64,
    pub unrealized_pnl: f64,

    pub open_positions: usize,
    pub pending_positions: usize,
    pub closed_trades: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_factor: Option<f64>,
    pub total_realized_pnl: f64,
}

impl AccountSummary {
    /// Derive the summary from the wallet and current position sets. Open
    /// positions are marked at their latest `mark_price`.
    pub fn derive(
        wallet_balance: f64,
        pending: &[PaperPosition],
        open: &[PaperPosition],
        closed: &[PaperPosition],
    ) -> Self {
        let unrealized_pnl: f64 = open.iter().map(|p| p.unrealized_pnl(p.mark_price)).sum();
        let used_margin: f64 = open.iter().map(|p| p.margin).sum();
        let margin_balance = wallet_balance + unrealized_pnl;

        let total_realized_pnl: f64 = closed.iter().map(|p| p.realized_pnl).sum();

        let (win_rate, profit_factor) = if closed.is_empty() {
            (None, None)
        } else {
            let wins = closed.iter().filter(|p| p.realized_pnl > 0.0).count();
            let gross_profit: f64 = closed
                .iter()
                .map(|p| p.realized_pnl)
                .filter(|&pnl| pnl > 0.0)
                .sum();
            let gross_loss: f64 = closed
                .iter()
                .map(|p| p.realized_pnl)
                .filter(|&pnl| pnl < 0.0)
                .map(f64::abs)
                .sum();
            let profit_factor = if gross_loss > 0.0 {
                Some(gross_profit / gross_loss)
            } else if gross_profit > 0.0 {
                Some(f64::INFINITY)
            } else {
                Some(0.0)
            };
            (Some(wins as f64 / closed.len() as f64), profit_factor)
        };

        Self {
            wallet_balance,
            margin_balance,
            used_margin,
            available_balance: (margin_balance - used_margin).max(0.0),
            unrealized_pnl,
            open_positions: open.len(),
            pending_positions: pending.len(),
            closed_trades: closed.len(),
            win_rate,
            profit_factor,
            total_realized_pnl,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::position::PositionState;
    use crate::types::TradeSide;
    use chrono::{TimeZone, Utc};

    fn open_position(entry: f64, mark: f64, qty: f64, margin: f64) -> PaperPosition {
        PaperPosition {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: "BTCUSDT".to_string(),
            side: TradeSide::Long,
            quantity: qty,
            initial_quantity: qty,
            entry_price: entry,
            stop_loss: entry * 0.98,
            take_profit: vec![],
            margin,
            leverage: 1.0,
            liquidation_price: None,
            state: PositionState::Open,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            open_time: None,
            close_time: None,
            realized_pnl: 0.0,
            exit_reason: None,
            mark_price: mark,
        }
    }

    fn closed_position(pnl: f64) -> PaperPosition {
        let mut p = open_position(100.0, 100.0, 1.0, 100.0);
        p.state = PositionState::Closed;
        p.realized_pnl = pnl;
        p.quantity = 0.0;
        p
    }

    #[test]
    fn derives_margin_figures() {
        // Long 2 @ 100 marked 105 => +10 unrealised; margin 200 reserved.
        let open = vec![open_position(100.0, 105.0, 2.0, 200.0)];
        let summary = AccountSummary::derive(1_000.0, &[], &open, &[]);
        assert!((summary.unrealized_pnl - 10.0).abs() < 1e-9);
        assert!((summary.margin_balance - 1_010.0).abs() < 1e-9);
        assert!((summary.used_margin - 200.0).abs() < 1e-9);
        assert!((summary.available_balance - 810.0).abs() < 1e-9);
        assert!(summary.win_rate.is_none());
    }

    #[test]
    fn available_clamps_at_zero() {
        // Deep drawdown: margin balance below used margin.
        let open = vec![open_position(100.0, 10.0, 5.0, 500.0)];
        let summary = AccountSummary::derive(100.0, &[], &open, &[]);
        assert!(summary.margin_balance < summary.used_margin);
        assert_eq!(summary.available_balance, 0.0);
    }

    #[test]
    fn journal_statistics() {
        let closed = vec![closed_position(30.0), closed_position(-10.0), closed_position(20.0)];
        let summary = AccountSummary::derive(1_000.0, &[], &[], &closed);
        assert!((summary.win_rate.unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert!((summary.profit_factor.unwrap() - 5.0).abs() < 1e-9);
        assert!((summary.total_realized_pnl - 40.0).abs() < 1e-9);
    }

    #[test]
    fn all_winning_history_has_infinite_profit_factor() {
        let closed = vec![closed_position(5.0)];
        let summary = AccountSummary::derive(1_000.0, &[], &[], &closed);
        assert!(summary.profit_factor.unwrap().is_infinite());
    }
}
