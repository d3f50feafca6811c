// =============================================================================
// Order repository port — CRUD over paper positions plus the wallet
// =============================================================================
//
// The engine specifies the port, not the backing store: implementations may
// persist to disk, memory, or a database and must handle their own
// threading. The in-memory implementation below is the reference used by
// the demo binary and the test suite.

use std::collections::HashMap;

use anyhow::{bail, Result};
use parking_lot::RwLock;
use tracing::info;

use crate::paper::position::{PaperPosition, PositionState};

pub trait OrderRepository: Send + Sync {
    /// Persist a new position.
    fn save(&self, position: &PaperPosition) -> Result<()>;

    /// Persist changes to an existing position (keyed by id).
    fn update(&self, position: &PaperPosition) -> Result<()>;

    /// All PENDING positions.
    fn get_pending(&self) -> Result<Vec<PaperPosition>>;

    /// All OPEN positions.
    fn get_active(&self) -> Result<Vec<PaperPosition>>;

    /// The most recent `limit` CLOSED positions, newest first.
    fn get_closed(&self, limit: usize) -> Result<Vec<PaperPosition>>;

    /// Current wallet balance (realised funds).
    fn account_balance(&self) -> Result<f64>;

    /// Credit the wallet. Negative amounts debit it (margin reservation);
    /// the resulting balance is returned.
    fn deposit(&self, amount: f64) -> Result<f64>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Thread-safe in-memory repository.
pub struct InMemoryOrderRepository {
    positions: RwLock<HashMap<String, PaperPosition>>,
    /// Closure order, oldest first.
    closed_order: RwLock<Vec<String>>,
    balance: RwLock<f64>,
}

impl InMemoryOrderRepository {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            closed_order: RwLock::new(Vec::new()),
            balance: RwLock::new(initial_balance),
        }
    }

    fn collect_state(&self, state: PositionState) -> Vec<PaperPosition> {
        let mut positions: Vec<PaperPosition> = self
            .positions
            .read()
            .values()
            .filter(|p| p.state == state)
            .cloned()
            .collect();
        positions.sort_by_key(|p| p.created_at);
        positions
    }
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new(10_000.0)
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn save(&self, position: &PaperPosition) -> Result<()> {
        let mut positions = self.positions.write();
        if positions.contains_key(&position.id) {
            bail!("position {} already exists", position.id);
        }
        positions.insert(position.id.clone(), position.clone());
        Ok(())
    }

    fn update(&self, position: &PaperPosition) -> Result<()> {
        let mut positions = self.positions.write();
        let Some(existing) = positions.get_mut(&position.id) else {
            bail!("position {} not found", position.id);
        };
        let was_closed = existing.state == PositionState::Closed;
        *existing = position.clone();

        if !was_closed && position.state == PositionState::Closed {
            self.closed_order.write().push(position.id.clone());
        }
        Ok(())
    }

    fn get_pending(&self) -> Result<Vec<PaperPosition>> {
        Ok(self.collect_state(PositionState::Pending))
    }

    fn get_active(&self) -> Result<Vec<PaperPosition>> {
        Ok(self.collect_state(PositionState::Open))
    }

    fn get_closed(&self, limit: usize) -> Result<Vec<PaperPosition>> {
        let order = self.closed_order.read();
        let positions = self.positions.read();
        Ok(order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| positions.get(id).cloned())
            .collect())
    }

    fn account_balance(&self) -> Result<f64> {
        Ok(*self.balance.read())
    }

    fn deposit(&self, amount: f64) -> Result<f64> {
        let mut balance = self.balance.write();
        *balance += amount;
        info!(amount, balance = *balance, "wallet adjusted");
        Ok(*balance)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExitReason, TradeSide};
    use chrono::{Duration, TimeZone, Utc};

    fn position(id: &str, state: PositionState, minutes: i64) -> PaperPosition {
        PaperPosition {
            id: id.to_string(),
            symbol: "BTCUSDT".to_string(),
            side: TradeSide::Long,
            quantity: 1.0,
            initial_quantity: 1.0,
            entry_price: 100.0,
            stop_loss: 98.0,
            take_profit: vec![],
            margin: 100.0,
            leverage: 1.0,
            liquidation_price: None,
            state,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
            open_time: None,
            close_time: None,
            realized_pnl: 0.0,
            exit_reason: None,
            mark_price: 100.0,
        }
    }

    #[test]
    fn save_and_query_by_state() {
        let repo = InMemoryOrderRepository::new(1_000.0);
        repo.save(&position("a", PositionState::Pending, 0)).unwrap();
        repo.save(&position("b", PositionState::Open, 1)).unwrap();

        assert_eq!(repo.get_pending().unwrap().len(), 1);
        assert_eq!(repo.get_active().unwrap().len(), 1);
        assert!(repo.get_closed(10).unwrap().is_empty());
    }

    #[test]
    fn duplicate_save_rejected() {
        let repo = InMemoryOrderRepository::new(1_000.0);
        repo.save(&position("a", PositionState::Pending, 0)).unwrap();
        assert!(repo.save(&position("a", PositionState::Pending, 0)).is_err());
    }

    #[test]
    fn update_unknown_rejected() {
        let repo = InMemoryOrderRepository::new(1_000.0);
        assert!(repo.update(&position("ghost", PositionState::Open, 0)).is_err());
    }

    #[test]
    fn closed_history_is_newest_first_and_limited() {
        let repo = InMemoryOrderRepository::new(1_000.0);
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            repo.save(&position(id, PositionState::Open, i as i64)).unwrap();
        }
        for id in ["a", "b", "c"] {
            let mut p = position(id, PositionState::Closed, 0);
            p.exit_reason = Some(ExitReason::Manual);
            repo.update(&p).unwrap();
        }

        let closed = repo.get_closed(2).unwrap();
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].id, "c");
        assert_eq!(closed[1].id, "b");
    }

    #[test]
    fn ordering_by_creation_time() {
        let repo = InMemoryOrderRepository::new(1_000.0);
        repo.save(&position("late", PositionState::Pending, 10)).unwrap();
        repo.save(&position("early", PositionState::Pending, 1)).unwrap();
        let pending = repo.get_pending().unwrap();
        assert_eq!(pending[0].id, "early");
        assert_eq!(pending[1].id, "late");
    }

    #[test]
    fn deposit_and_debit() {
        let repo = InMemoryOrderRepository::new(1_000.0);
        assert!((repo.deposit(500.0).unwrap() - 1_500.0).abs() < 1e-9);
        assert!((repo.deposit(-200.0).unwrap() - 1_300.0).abs() < 1e-9);
        assert!((repo.account_balance().unwrap() - 1_300.0).abs() < 1e-9);
    }
}
