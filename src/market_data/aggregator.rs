// =============================================================================
// Aggregator — 1m -> 15m / 1h real-time aggregation
// =============================================================================
//
// Receives `(candle, is_closed)` from the ingress. The forming 1m slot is
// replaced on every tick; a closed 1m candle is committed to the 1m ring and
// accumulated into the 15m and 1h pending slots.
//
// Closure rule for a higher-timeframe bar:
//   * boundary — the inbound closed candle opens a new period (its minute is
//     0 mod the period length) while the pending slot still holds
//     constituents from the previous period, or
//   * count — the slot has accumulated a full period of 1m candles,
// whichever comes first.
//
// Aggregation: open = first.open, high = max, low = min, close = last.close,
// volume = sum, timestamp = period-aligned open of the first constituent.
//
// Ephemeral forming 15m/1h bars (pending slot + forming 1m) are available for
// live charts; they are never pushed to a ring and never fire callbacks.

use tracing::{debug, error, info, warn};

use crate::market_data::{Candle, CandleBuffer};
use crate::types::Timeframe;

/// Synchronous close listener, invoked on the ingestion thread.
pub type CloseCallback = Box<dyn Fn(&Candle) + Send + Sync>;

/// What a single closed-candle ingestion produced.
#[derive(Debug, Clone, Default)]
pub struct AggregationOutcome {
    pub closed_15m: Option<Candle>,
    pub closed_1h: Option<Candle>,
}

/// A pending slot growing past this is an internal inconsistency: the slot is
/// cleared and ingestion resumes at the next candle.
const MAX_PENDING_SLOT: usize = 60;

pub struct Aggregator {
    buffer_1m: CandleBuffer,
    buffer_15m: CandleBuffer,
    buffer_1h: CandleBuffer,

    forming_1m: Option<Candle>,
    pending_15m: Vec<Candle>,
    pending_1h: Vec<Candle>,

    last_15m: Option<Candle>,
    last_1h: Option<Candle>,

    callbacks_15m: Vec<CloseCallback>,
    callbacks_1h: Vec<CloseCallback>,

    state_corruptions: u64,
}

impl Aggregator {
    pub fn new(capacity_1m: usize, capacity_htf: usize) -> Self {
        Self {
            buffer_1m: CandleBuffer::new(capacity_1m),
            buffer_15m: CandleBuffer::new(capacity_htf),
            buffer_1h: CandleBuffer::new(capacity_htf),
            forming_1m: None,
            pending_15m: Vec::new(),
            pending_1h: Vec::new(),
            last_15m: None,
            last_1h: None,
            callbacks_15m: Vec::new(),
            callbacks_1h: Vec::new(),
            state_corruptions: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Ingestion
    // -------------------------------------------------------------------------

    /// Feed one 1m candle update. Forming ticks only refresh the forming
    /// slot; closed candles commit and may close higher-timeframe bars.
    pub fn on_candle(&mut self, candle: Candle, is_closed: bool) -> AggregationOutcome {
        self.forming_1m = Some(candle.clone());

        if !is_closed {
            debug!(timestamp = %candle.timestamp, close = candle.close, "forming 1m updated");
            return AggregationOutcome::default();
        }

        self.guard_pending_slots();

        let mut outcome = AggregationOutcome::default();
        let minute = candle_minute(&candle);

        // Boundary crossing: the inbound candle opens a new period, so the
        // previous period's constituents close first, without it.
        if minute % 15 == 0 && !self.pending_15m.is_empty() {
            outcome.closed_15m = self.close_slot(Timeframe::M15);
        }
        if minute == 0 && !self.pending_1h.is_empty() {
            outcome.closed_1h = self.close_slot(Timeframe::H1);
        }

        self.buffer_1m.push(candle.clone());
        self.pending_15m.push(candle.clone());
        self.pending_1h.push(candle);

        // Count-based closure: a full period of constituents accumulated.
        if self.pending_15m.len() >= 15 {
            outcome.closed_15m = self.close_slot(Timeframe::M15);
        }
        if self.pending_1h.len() >= 60 {
            outcome.closed_1h = self.close_slot(Timeframe::H1);
        }

        outcome
    }

    /// Seed a ring with an already-closed historical candle, bypassing the
    /// pending-slot machinery. Used by the warm-up loader when the history
    /// stream is already at the target timeframe.
    pub fn seed_closed(&mut self, timeframe: Timeframe, candle: Candle) {
        match timeframe {
            Timeframe::M1 => {
                self.on_candle(candle, true);
            }
            Timeframe::M15 => {
                self.last_15m = Some(candle.clone());
                self.buffer_15m.push(candle);
            }
            Timeframe::H1 => {
                self.last_1h = Some(candle.clone());
                self.buffer_1h.push(candle);
            }
            other => warn!(timeframe = %other, "seed_closed ignores unsupported timeframe"),
        }
    }

    /// Drop in-flight forming state (shutdown drain). Committed rings and
    /// last-emitted bars survive; partial periods are discarded.
    pub fn flush(&mut self) {
        let dropped = self.pending_15m.len() + self.pending_1h.len();
        self.forming_1m = None;
        self.pending_15m.clear();
        self.pending_1h.clear();
        if dropped > 0 {
            info!(dropped, "aggregator flushed in-flight forming state");
        }
    }

    // -------------------------------------------------------------------------
    // Closure
    // -------------------------------------------------------------------------

    fn close_slot(&mut self, timeframe: Timeframe) -> Option<Candle> {
        let slot = match timeframe {
            Timeframe::M15 => &mut self.pending_15m,
            Timeframe::H1 => &mut self.pending_1h,
            _ => return None,
        };
        let constituents = std::mem::take(slot);
        let aggregated = aggregate(&constituents, timeframe)?;

        info!(
            timeframe = %timeframe,
            timestamp = %aggregated.timestamp,
            close = aggregated.close,
            constituents = constituents.len(),
            "higher-timeframe candle closed"
        );

        match timeframe {
            Timeframe::M15 => {
                self.last_15m = Some(aggregated.clone());
                self.buffer_15m.push(aggregated.clone());
                for cb in &self.callbacks_15m {
                    cb(&aggregated);
                }
            }
            Timeframe::H1 => {
                self.last_1h = Some(aggregated.clone());
                self.buffer_1h.push(aggregated.clone());
                for cb in &self.callbacks_1h {
                    cb(&aggregated);
                }
            }
            _ => {}
        }

        Some(aggregated)
    }

    /// Clear any pending slot that has grown past [`MAX_PENDING_SLOT`] — an
    /// internal inconsistency that must not poison later bars.
    fn guard_pending_slots(&mut self) {
        for (name, slot) in [
            ("15m", &mut self.pending_15m),
            ("1h", &mut self.pending_1h),
        ] {
            if slot.len() > MAX_PENDING_SLOT {
                error!(
                    slot = name,
                    len = slot.len(),
                    "pending aggregation slot overflow — clearing and resuming"
                );
                slot.clear();
                self.state_corruptions += 1;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Ephemeral forming 15m bar: pending constituents plus the forming 1m.
    /// Never pushed to a ring, never fires callbacks.
    pub fn forming_15m(&self) -> Option<Candle> {
        self.forming_bar(&self.pending_15m, Timeframe::M15)
    }

    /// Ephemeral forming 1h bar.
    pub fn forming_1h(&self) -> Option<Candle> {
        self.forming_bar(&self.pending_1h, Timeframe::H1)
    }

    fn forming_bar(&self, pending: &[Candle], timeframe: Timeframe) -> Option<Candle> {
        let mut constituents: Vec<Candle> = pending.to_vec();
        if let Some(forming) = &self.forming_1m {
            // The forming slot may still hold the candle that just committed;
            // include it only when it is genuinely newer.
            let already_pending = pending
                .last()
                .is_some_and(|last| last.timestamp >= forming.timestamp);
            if !already_pending {
                constituents.push(forming.clone());
            }
        }
        aggregate(&constituents, timeframe)
    }

    pub fn buffer(&self, timeframe: Timeframe) -> &CandleBuffer {
        match timeframe {
            Timeframe::M15 => &self.buffer_15m,
            Timeframe::H1 => &self.buffer_1h,
            _ => &self.buffer_1m,
        }
    }

    pub fn forming_1m(&self) -> Option<&Candle> {
        self.forming_1m.as_ref()
    }

    pub fn last_15m(&self) -> Option<&Candle> {
        self.last_15m.as_ref()
    }

    pub fn last_1h(&self) -> Option<&Candle> {
        self.last_1h.as_ref()
    }

    pub fn pending_counts(&self) -> (usize, usize) {
        (self.pending_15m.len(), self.pending_1h.len())
    }

    pub fn state_corruptions(&self) -> u64 {
        self.state_corruptions
    }

    // -------------------------------------------------------------------------
    // Callbacks
    // -------------------------------------------------------------------------

    pub fn on_15m_close(&mut self, callback: CloseCallback) {
        self.callbacks_15m.push(callback);
    }

    pub fn on_1h_close(&mut self, callback: CloseCallback) {
        self.callbacks_1h.push(callback);
    }
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("candles_1m", &self.buffer_1m.len())
            .field("pending_15m", &self.pending_15m.len())
            .field("pending_1h", &self.pending_1h.len())
            .finish()
    }
}

// =============================================================================
// Free functions
// =============================================================================

/// Minute-of-hour of a candle's open timestamp.
pub(crate) fn candle_minute(candle: &Candle) -> u32 {
    use chrono::Timelike;
    candle.timestamp.minute()
}

/// Aggregate constituent candles into one higher-timeframe bar.
///
/// The output timestamp is the first constituent's open aligned down to the
/// period boundary, so a stream that starts mid-period still produces a bar
/// keyed at the period open.
pub fn aggregate(constituents: &[Candle], timeframe: Timeframe) -> Option<Candle> {
    if constituents.is_empty() {
        return None;
    }

    let mut sorted: Vec<&Candle> = constituents.iter().collect();
    sorted.sort_by_key(|c| c.timestamp);

    let first = sorted[0];
    let last = sorted[sorted.len() - 1];

    let open = first.open;
    let close = last.close;
    let high = sorted.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = sorted.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let volume: f64 = sorted.iter().map(|c| c.volume).sum();
    let timestamp = align_to_period(first.timestamp, timeframe);

    match Candle::new(timestamp, open, high, low, close, volume) {
        Ok(candle) => Some(candle),
        Err(e) => {
            // Constituents are individually valid, so this should be
            // unreachable; treat it as corruption rather than propagating.
            error!(error = %e, timeframe = %timeframe, "aggregation produced invalid candle");
            None
        }
    }
}

/// Align a timestamp down to the open of its containing period.
pub fn align_to_period(
    ts: chrono::DateTime<chrono::Utc>,
    timeframe: Timeframe,
) -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    let period_secs = i64::from(timeframe.minutes()) * 60;
    let aligned = ts.timestamp() - ts.timestamp().rem_euclid(period_secs);
    chrono::Utc
        .timestamp_opt(aligned, 0)
        .single()
        .unwrap_or(ts)
}
