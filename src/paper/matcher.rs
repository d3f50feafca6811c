// =============================================================================
// Paper matcher — routes ticks into PENDING -> OPEN -> CLOSED transitions
// =============================================================================
//
// Two event kinds:
//   * an accepted signal creates a PENDING limit position,
//   * a market tick (close, high, low) is matched against every PENDING and
//     OPEN position for the symbol.
//
// Each position undergoes at most one state transition per tick; a position
// opened by a tick is not eligible for closure until the next one. Closure
// precedence inside a single bar:
//
//   1. liquidation bracketed by the bar         -> close at liquidation
//   2. stop AND a TP level both bracketed       -> the stop wins (the
//      intra-bar path is unknowable; take the conservative exit and count
//      the tiebreak so the policy can be revisited)
//   3. whichever single level the bar crossed   -> close / partial fill
//
// Partial TPs fill at most the next unfilled rung per tick, realise PnL
// pro-rata and release margin for the closed quantity; the last rung closes
// the position. Matcher errors are logged, counted on the health snapshot,
// and swallowed — they never interrupt ingestion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::paper::position::{PaperPosition, PositionState};
use crate::paper::repository::OrderRepository;
use crate::signal::EnrichedSignal;
use crate::types::{ExitReason, TradeSide};

/// Market tick delivered to the matcher: the last bar's traded range.
#[derive(Debug, Clone, Copy)]
pub struct MarkTick {
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub timestamp: DateTime<Utc>,
}

impl MarkTick {
    pub fn from_candle(candle: &crate::market_data::Candle) -> Self {
        Self {
            close: candle.close,
            high: candle.high,
            low: candle.low,
            timestamp: candle.timestamp,
        }
    }
}

/// Lock-free health counters incremented by the matcher.
#[derive(Debug, Default)]
pub struct MatcherCounters {
    pub matcher_errors: AtomicU64,
    /// SL/TP same-bar ambiguity resolved in favour of the stop.
    pub sl_tiebreaks: AtomicU64,
    /// Liquidation preferred over a simultaneous TP.
    pub close_precedence_invoked: AtomicU64,
}

/// Plain-data snapshot of the counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MatcherCountersSnapshot {
    pub matcher_errors: u64,
    pub sl_tiebreaks: u64,
    pub close_precedence_invoked: u64,
}

impl MatcherCounters {
    pub fn snapshot(&self) -> MatcherCountersSnapshot {
        MatcherCountersSnapshot {
            matcher_errors: self.matcher_errors.load(Ordering::Relaxed),
            sl_tiebreaks: self.sl_tiebreaks.load(Ordering::Relaxed),
            close_precedence_invoked: self.close_precedence_invoked.load(Ordering::Relaxed),
        }
    }
}

pub struct PaperMatcher {
    repository: Arc<dyn OrderRepository>,
    leverage: f64,
    maintenance_margin_rate: f64,
    counters: MatcherCounters,
}

impl PaperMatcher {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        leverage: f64,
        maintenance_margin_rate: f64,
    ) -> Self {
        Self {
            repository,
            leverage,
            maintenance_margin_rate,
            counters: MatcherCounters::default(),
        }
    }

    pub fn counters(&self) -> &MatcherCounters {
        &self.counters
    }

    pub fn repository(&self) -> &Arc<dyn OrderRepository> {
        &self.repository
    }

    // -------------------------------------------------------------------------
    // Signal intake
    // -------------------------------------------------------------------------

    /// Create a PENDING limit position from an accepted signal. Returns the
    /// new position id, or `None` when the signal was skipped or persistence
    /// failed (failure is counted, never propagated).
    pub fn on_signal(
        &self,
        signal: &EnrichedSignal,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if signal.position_size <= 0.0 {
            debug!(symbol, "signal carries zero size - no paper order");
            return None;
        }

        let position = match PaperPosition::from_signal(
            signal,
            symbol,
            self.leverage,
            self.maintenance_margin_rate,
            now,
        ) {
            Ok(position) => position,
            Err(e) => {
                error!(symbol, error = %e, "rejected signal at position construction");
                self.counters.matcher_errors.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let id = position.id.clone();
        if let Err(e) = self.repository.save(&position) {
            error!(symbol, error = %e, "failed to persist pending position");
            self.counters.matcher_errors.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        info!(
            id = %id,
            symbol,
            side = %position.side,
            entry = position.entry_price,
            stop = position.stop_loss,
            quantity = position.quantity,
            "pending limit position created"
        );
        Some(id)
    }

    // -------------------------------------------------------------------------
    // Tick matching
    // -------------------------------------------------------------------------

    /// Match one tick against every PENDING and OPEN position for `symbol`.
    pub fn on_tick(&self, symbol: &str, tick: MarkTick) {
        // ── PENDING -> OPEN ──────────────────────────────────────────────
        match self.repository.get_pending() {
            Ok(pending) => {
                for mut position in pending.into_iter().filter(|p| p.symbol == symbol) {
                    if tick.low <= position.entry_price && position.entry_price <= tick.high {
                        self.fill_pending(&mut position, &tick);
                    }
                }
            }
            Err(e) => {
                error!(symbol, error = %e, "failed to load pending positions");
                self.counters.matcher_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        // ── OPEN -> partial / CLOSED ─────────────────────────────────────
        match self.repository.get_active() {
            Ok(active) => {
                for mut position in active.into_iter().filter(|p| p.symbol == symbol) {
                    // A position opened by this very tick already had its
                    // transition; it only becomes matchable next tick.
                    if position.open_time == Some(tick.timestamp) {
                        continue;
                    }
                    self.match_open(&mut position, &tick);
                }
            }
            Err(e) => {
                error!(symbol, error = %e, "failed to load open positions");
                self.counters.matcher_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn fill_pending(&self, position: &mut PaperPosition, tick: &MarkTick) {
        position.state = PositionState::Open;
        position.open_time = Some(tick.timestamp);
        position.mark_price = tick.close;

        // Reserve the margin out of the wallet at fill time.
        if let Err(e) = self.repository.deposit(-position.margin) {
            error!(id = %position.id, error = %e, "margin reservation failed");
            self.counters.matcher_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.persist(position);

        info!(
            id = %position.id,
            entry = position.entry_price,
            margin = position.margin,
            "limit entry filled - position open"
        );
    }

    fn match_open(&self, position: &mut PaperPosition, tick: &MarkTick) {
        let long = position.side == TradeSide::Long;

        let sl_hit = if long {
            tick.low <= position.stop_loss
        } else {
            tick.high >= position.stop_loss
        };

        let next_tp = position.next_tp();
        let tp_hit = next_tp.is_some_and(|(_, level)| {
            if long {
                tick.high >= level.price
            } else {
                tick.low <= level.price
            }
        });

        let liquidation = position
            .liquidation_price
            .filter(|lq| lq.is_finite())
            .filter(|&lq| tick.low <= lq && lq <= tick.high);

        // 1. Liquidation is final and outranks everything in the bar.
        if let Some(liquidation_price) = liquidation {
            if tp_hit {
                self.counters
                    .close_precedence_invoked
                    .fetch_add(1, Ordering::Relaxed);
            }
            self.close_position(position, liquidation_price, ExitReason::Liquidation, tick);
            return;
        }

        // 2. Stop and TP in the same bar: the stop wins.
        if sl_hit && tp_hit {
            self.counters.sl_tiebreaks.fetch_add(1, Ordering::Relaxed);
            self.close_position(position, position.stop_loss, ExitReason::StopLoss, tick);
            return;
        }

        // 3. Plain stop.
        if sl_hit {
            self.close_position(position, position.stop_loss, ExitReason::StopLoss, tick);
            return;
        }

        // 4. Next TP rung: partial fill, or the final close.
        if let Some((index, level)) = next_tp {
            if tp_hit {
                let is_last = index + 1 == position.take_profit.len();
                if is_last {
                    self.close_position(position, level.price, ExitReason::TakeProfit, tick);
                } else {
                    self.partial_fill(position, index, level.price, tick);
                }
                return;
            }
        }

        // 5. Nothing crossed: mark to market only.
        position.mark_price = tick.close;
        self.persist(position);
    }

    fn partial_fill(&self, position: &mut PaperPosition, index: usize, price: f64, tick: &MarkTick) {
        let level = position.take_profit[index];
        let close_qty = (position.initial_quantity * level.weight).min(position.quantity);
        let pnl = position.side.direction() * (price - position.entry_price) * close_qty;

        // Release the margin backing the closed quantity.
        let margin_per_unit = position.entry_price / position.leverage;
        let released = (margin_per_unit * close_qty).min(position.margin);

        position.take_profit[index].filled = true;
        position.quantity -= close_qty;
        position.margin -= released;
        position.realized_pnl += pnl;
        position.mark_price = tick.close;

        if let Err(e) = self.repository.deposit(released + pnl) {
            error!(id = %position.id, error = %e, "partial-fill settlement failed");
            self.counters.matcher_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.persist(position);

        info!(
            id = %position.id,
            tp_index = index,
            price,
            close_qty,
            remaining = position.quantity,
            pnl,
            "partial take-profit filled"
        );
    }

    fn close_position(
        &self,
        position: &mut PaperPosition,
        price: f64,
        reason: ExitReason,
        tick: &MarkTick,
    ) {
        let pnl = position.side.direction() * (price - position.entry_price) * position.quantity;
        let released = position.margin;

        position.realized_pnl += pnl;
        position.quantity = 0.0;
        position.margin = 0.0;
        position.state = PositionState::Closed;
        position.close_time = Some(tick.timestamp);
        position.exit_reason = Some(reason);
        position.mark_price = price;

        if let Err(e) = self.repository.deposit(released + pnl) {
            error!(id = %position.id, error = %e, "close settlement failed");
            self.counters.matcher_errors.fetch_add(1, Ordering::Relaxed);
        }
        self.persist(position);

        info!(
            id = %position.id,
            reason = %reason,
            price,
            realized_pnl = position.realized_pnl,
            "position closed"
        );
    }

    // -------------------------------------------------------------------------
    // Manual close
    // -------------------------------------------------------------------------

    /// Close a position by id at `price`. Idempotent: closing an already
    /// CLOSED (or unknown) id is a no-op.
    pub fn close_manual(&self, id: &str, price: f64, now: DateTime<Utc>) {
        let tick = MarkTick {
            close: price,
            high: price,
            low: price,
            timestamp: now,
        };

        // A resting limit is simply cancelled: no margin was ever taken.
        if let Ok(pending) = self.repository.get_pending() {
            if let Some(mut position) = pending.into_iter().find(|p| p.id == id) {
                position.state = PositionState::Closed;
                position.close_time = Some(now);
                position.exit_reason = Some(ExitReason::Manual);
                position.quantity = 0.0;
                self.persist(&position);
                info!(id, "pending position cancelled");
                return;
            }
        }

        if let Ok(active) = self.repository.get_active() {
            if let Some(mut position) = active.into_iter().find(|p| p.id == id) {
                self.close_position(&mut position, price, ExitReason::Manual, &tick);
                return;
            }
        }

        debug!(id, "manual close: position already closed or unknown - no-op");
    }

    fn persist(&self, position: &PaperPosition) {
        if let Err(e) = self.repository.update(position) {
            error!(id = %position.id, error = %e, "failed to persist position update");
            self.counters.matcher_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for PaperMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperMatcher")
            .field("leverage", &self.leverage)
            .field("counters", &self.counters.snapshot())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::repository::InMemoryOrderRepository;
    use crate::signal::{IndicatorSnapshot, TpLadder, TpMethod};
    use crate::types::SignalSide;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn tick(minute: i64, close: f64, high: f64, low: f64) -> MarkTick {
        MarkTick {
            close,
            high,
            low,
            timestamp: t0() + Duration::minutes(minute),
        }
    }

    fn snapshot(price: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            price,
            timestamp: t0(),
            vwap: None,
            vwap_distance_pct: None,
            bollinger: None,
            stoch: None,
            rsi: None,
            rsi_zone: None,
            atr: None,
            adx: None,
            ema_fast: None,
            ema_slow: None,
            volume: None,
        }
    }

    fn signal(side: SignalSide, entry: f64, stop: f64, tps: [f64; 3], size: f64) -> EnrichedSignal {
        EnrichedSignal {
            side,
            confidence: 0.9,
            confidence_level: crate::types::ConfidenceLevel::High,
            reference_price: entry,
            timestamp: t0(),
            snapshot: snapshot(entry),
            reasons: vec![],
            entry_price: entry,
            stop_loss: stop,
            tp: TpLadder {
                tp1: tps[0],
                tp2: tps[1],
                tp3: tps[2],
                weights: [0.6, 0.3, 0.1],
                method: TpMethod::SupportResistance,
            },
            risk_reward_ratio: 2.0,
            position_size: size,
            is_limit_order: true,
            swing_anchored: false,
        }
    }

    fn matcher_with_balance(balance: f64) -> (PaperMatcher, Arc<InMemoryOrderRepository>) {
        let repo = Arc::new(InMemoryOrderRepository::new(balance));
        let matcher = PaperMatcher::new(repo.clone(), 1.0, 0.004);
        (matcher, repo)
    }

    /// Create a pending BUY and fill it on the next tick.
    fn open_long(
        matcher: &PaperMatcher,
        entry: f64,
        stop: f64,
        tps: [f64; 3],
        size: f64,
    ) -> String {
        let id = matcher
            .on_signal(&signal(SignalSide::Buy, entry, stop, tps, size), "BTCUSDT", t0())
            .expect("pending created");
        matcher.on_tick("BTCUSDT", tick(1, entry, entry + 10.0, entry - 10.0));
        id
    }

    #[test]
    fn pending_opens_when_bar_brackets_entry() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        let id = matcher
            .on_signal(
                &signal(SignalSide::Buy, 50_000.0, 49_500.0, [50_500.0, 51_000.0, 51_500.0], 0.1),
                "BTCUSDT",
                t0(),
            )
            .unwrap();

        // Bar misses the limit: still pending.
        matcher.on_tick("BTCUSDT", tick(1, 50_200.0, 50_300.0, 50_100.0));
        assert_eq!(repo.get_pending().unwrap().len(), 1);

        // Bar trades through the limit: filled.
        matcher.on_tick("BTCUSDT", tick(2, 50_050.0, 50_150.0, 49_900.0));
        let active = repo.get_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
        assert_eq!(active[0].state, PositionState::Open);
        assert!(active[0].open_time.is_some());
        // Margin reserved: 50_000 * 0.1 = 5_000.
        assert!((repo.account_balance().unwrap() - 95_000.0).abs() < 1e-6);
    }

    #[test]
    fn open_is_not_closed_on_the_same_tick() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        matcher
            .on_signal(
                &signal(SignalSide::Buy, 50_000.0, 49_500.0, [50_500.0, 51_000.0, 51_500.0], 0.1),
                "BTCUSDT",
                t0(),
            )
            .unwrap();

        // One wild bar brackets entry AND stop: only the open happens.
        matcher.on_tick("BTCUSDT", tick(1, 49_600.0, 50_100.0, 49_300.0));
        assert_eq!(repo.get_active().unwrap().len(), 1);
        assert!(repo.get_closed(10).unwrap().is_empty());

        // The next tick may close it.
        matcher.on_tick("BTCUSDT", tick(2, 49_400.0, 49_600.0, 49_300.0));
        let closed = repo.get_closed(10).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::StopLoss));
    }

    #[test]
    fn stop_loss_wins_sl_tp_ambiguity() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        open_long(&matcher, 50_000.0, 49_500.0, [50_500.0, 51_000.0, 51_500.0], 0.1);

        // Bar brackets both the stop (49_500) and TP1 (50_500).
        matcher.on_tick("BTCUSDT", tick(2, 50_000.0, 50_600.0, 49_400.0));

        let closed = repo.get_closed(10).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::StopLoss));
        // Executed at the exact stop level.
        assert!((closed[0].mark_price - 49_500.0).abs() < 1e-9);
        assert!((closed[0].realized_pnl - (49_500.0 - 50_000.0) * 0.1).abs() < 1e-9);
        assert_eq!(matcher.counters().snapshot().sl_tiebreaks, 1);
    }

    #[test]
    fn partial_tp_ladder_then_final_close() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        open_long(&matcher, 100.0, 95.0, [110.0, 120.0, 130.0], 1.0);

        // TP1: 60% closes, position stays open.
        matcher.on_tick("BTCUSDT", tick(2, 110.0, 111.0, 105.0));
        let active = repo.get_active().unwrap();
        assert_eq!(active.len(), 1);
        let p = &active[0];
        assert!((p.quantity - 0.4).abs() < 1e-9);
        assert!((p.realized_pnl - 6.0).abs() < 1e-9); // 0.6 * 10
        assert!(p.take_profit[0].filled);

        // TP2: another 30%.
        matcher.on_tick("BTCUSDT", tick(3, 120.0, 121.0, 115.0));
        let p = &repo.get_active().unwrap()[0];
        assert!((p.quantity - 0.1).abs() < 1e-9);
        assert!((p.realized_pnl - 12.0).abs() < 1e-9); // 6 + 0.3 * 20

        // TP3 closes the remainder.
        matcher.on_tick("BTCUSDT", tick(4, 130.0, 131.0, 125.0));
        let closed = repo.get_closed(10).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::TakeProfit));
        assert!((closed[0].realized_pnl - 15.0).abs() < 1e-9); // 6 + 6 + 0.1 * 30
        assert_eq!(closed[0].state, PositionState::Closed);

        // Wallet: margin fully returned plus the realised profit.
        assert!((repo.account_balance().unwrap() - 100_015.0).abs() < 1e-6);
    }

    #[test]
    fn one_tp_rung_per_tick() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        open_long(&matcher, 100.0, 95.0, [110.0, 120.0, 130.0], 1.0);

        // A single huge bar crosses every level; only TP1 fills this tick.
        matcher.on_tick("BTCUSDT", tick(2, 135.0, 140.0, 105.0));
        let p = &repo.get_active().unwrap()[0];
        assert!((p.quantity - 0.4).abs() < 1e-9);
        assert!(!p.take_profit[1].filled);
    }

    #[test]
    fn liquidation_outranks_tp_and_is_counted() {
        let repo = Arc::new(InMemoryOrderRepository::new(100_000.0));
        // 10x leverage so liquidation is reachable: long 100 => liq 90.04.
        let matcher = PaperMatcher::new(repo.clone(), 10.0, 0.004);
        matcher
            .on_signal(
                &signal(SignalSide::Buy, 100.0, 85.0, [110.0, 120.0, 130.0], 1.0),
                "BTCUSDT",
                t0(),
            )
            .unwrap();
        matcher.on_tick("BTCUSDT", tick(1, 100.0, 101.0, 99.0));
        assert_eq!(repo.get_active().unwrap().len(), 1);

        // Bar brackets the liquidation price AND TP1.
        matcher.on_tick("BTCUSDT", tick(2, 100.0, 115.0, 89.0));
        let closed = repo.get_closed(10).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::Liquidation));
        assert!((closed[0].mark_price - 90.04).abs() < 1e-9);
        assert_eq!(matcher.counters().snapshot().close_precedence_invoked, 1);
    }

    #[test]
    fn short_side_mirrors() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        let id = matcher
            .on_signal(
                &signal(SignalSide::Sell, 100.0, 105.0, [95.0, 90.0, 85.0], 1.0),
                "BTCUSDT",
                t0(),
            )
            .unwrap();
        matcher.on_tick("BTCUSDT", tick(1, 100.0, 101.0, 99.0));
        assert_eq!(repo.get_active().unwrap()[0].id, id);

        // Price falls to TP1: 60% of the short covers at 95.
        matcher.on_tick("BTCUSDT", tick(2, 95.0, 99.0, 94.0));
        let p = &repo.get_active().unwrap()[0];
        assert!((p.realized_pnl - 3.0).abs() < 1e-9); // 0.6 * (100 - 95)

        // Price rips through the stop.
        matcher.on_tick("BTCUSDT", tick(3, 106.0, 107.0, 104.0));
        let closed = repo.get_closed(10).unwrap();
        assert_eq!(closed[0].exit_reason, Some(ExitReason::StopLoss));
        // Final leg: 0.4 * (100 - 105) = -2; total 3 - 2 = 1.
        assert!((closed[0].realized_pnl - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mark_to_market_updates_without_transitions() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        open_long(&matcher, 100.0, 95.0, [110.0, 120.0, 130.0], 1.0);

        matcher.on_tick("BTCUSDT", tick(2, 104.0, 105.0, 103.0));
        let p = &repo.get_active().unwrap()[0];
        assert!((p.mark_price - 104.0).abs() < 1e-9);
        assert!((p.unrealized_pnl(p.mark_price) - 4.0).abs() < 1e-9);
        assert_eq!(p.state, PositionState::Open);
    }

    #[test]
    fn other_symbols_are_untouched() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        matcher
            .on_signal(
                &signal(SignalSide::Buy, 100.0, 95.0, [110.0, 120.0, 130.0], 1.0),
                "ETHUSDT",
                t0(),
            )
            .unwrap();
        matcher.on_tick("BTCUSDT", tick(1, 100.0, 200.0, 50.0));
        assert_eq!(repo.get_pending().unwrap().len(), 1);
    }

    #[test]
    fn manual_close_is_idempotent() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        let id = open_long(&matcher, 100.0, 95.0, [110.0, 120.0, 130.0], 1.0);

        matcher.close_manual(&id, 102.0, t0() + Duration::minutes(5));
        let closed = repo.get_closed(10).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::Manual));
        assert!((closed[0].realized_pnl - 2.0).abs() < 1e-9);
        let balance = repo.account_balance().unwrap();

        // Second close: nothing changes.
        matcher.close_manual(&id, 90.0, t0() + Duration::minutes(6));
        assert_eq!(repo.get_closed(10).unwrap().len(), 1);
        assert_eq!(repo.get_closed(10).unwrap()[0].exit_reason, Some(ExitReason::Manual));
        assert!((repo.account_balance().unwrap() - balance).abs() < 1e-9);
    }

    #[test]
    fn manual_close_of_pending_cancels_without_settlement() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        let id = matcher
            .on_signal(
                &signal(SignalSide::Buy, 100.0, 95.0, [110.0, 120.0, 130.0], 1.0),
                "BTCUSDT",
                t0(),
            )
            .unwrap();
        matcher.close_manual(&id, 100.0, t0() + Duration::minutes(1));

        let closed = repo.get_closed(10).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].realized_pnl, 0.0);
        // Wallet untouched: margin was never reserved.
        assert!((repo.account_balance().unwrap() - 100_000.0).abs() < 1e-9);
    }

    #[test]
    fn zero_size_signal_creates_nothing() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        let sig = signal(SignalSide::Buy, 100.0, 95.0, [110.0, 120.0, 130.0], 0.0);
        assert!(matcher.on_signal(&sig, "BTCUSDT", t0()).is_none());
        assert!(repo.get_pending().unwrap().is_empty());
    }

    #[test]
    fn wallet_round_trip_on_stop_loss() {
        let (matcher, repo) = matcher_with_balance(100_000.0);
        open_long(&matcher, 100.0, 95.0, [110.0, 120.0, 130.0], 2.0);
        // Margin reserved: 200.
        assert!((repo.account_balance().unwrap() - 99_800.0).abs() < 1e-6);

        matcher.on_tick("BTCUSDT", tick(2, 94.0, 96.0, 93.0));
        // Margin (200) returned, loss 2 * 5 = 10 realised.
        assert!((repo.account_balance().unwrap() - 99_990.0).abs() < 1e-6);
        let closed = repo.get_closed(10).unwrap();
        assert!((closed[0].realized_pnl + 10.0).abs() < 1e-9);
    }
}
