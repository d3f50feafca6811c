// =============================================================================
// CandleBuffer — bounded ring of closed candles for one timeframe
// =============================================================================
//
// Keys candles by timestamp, preserves chronological order, and overwrites
// the oldest entry on overflow. Push / pop are O(1); `last(n)` copies the
// tail. The buffer has no interior locking: it is owned by the engine state
// which sits behind the orchestrator's RwLock, so readers never observe a
// torn tick.

use std::collections::VecDeque;

use tracing::debug;

use crate::market_data::Candle;

pub struct CandleBuffer {
    ring: VecDeque<Candle>,
    capacity: usize,
}

impl CandleBuffer {
    /// Create a buffer retaining at most `capacity` candles.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Insert a candle keyed by its timestamp.
    ///
    /// * Same timestamp as the newest entry — replace it (re-delivery of a
    ///   finalized bar).
    /// * Newer timestamp — append, trimming the oldest entries past capacity.
    /// * Older timestamp — dropped; the stream is expected to be monotone.
    pub fn push(&mut self, candle: Candle) {
        if let Some(back) = self.ring.back() {
            if candle.timestamp == back.timestamp {
                self.ring.pop_back();
            } else if candle.timestamp < back.timestamp {
                debug!(
                    incoming = %candle.timestamp,
                    newest = %back.timestamp,
                    "out-of-order candle dropped"
                );
                return;
            }
        }
        self.ring.push_back(candle);
        while self.ring.len() > self.capacity {
            self.ring.pop_front();
        }
    }

    /// The most recent `n` candles, oldest-first.
    pub fn last(&self, n: usize) -> Vec<Candle> {
        let start = self.ring.len().saturating_sub(n);
        self.ring.iter().skip(start).cloned().collect()
    }

    /// The newest candle, if any.
    pub fn latest(&self) -> Option<&Candle> {
        self.ring.back()
    }

    /// Close prices of the most recent `n` candles, oldest-first.
    pub fn closes(&self, n: usize) -> Vec<f64> {
        let start = self.ring.len().saturating_sub(n);
        self.ring.iter().skip(start).map(|c| c.close).collect()
    }

    /// Volumes of the most recent `n` candles, oldest-first.
    pub fn volumes(&self, n: usize) -> Vec<f64> {
        let start = self.ring.len().saturating_sub(n);
        self.ring.iter().skip(start).map(|c| c.volume).collect()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.ring.iter()
    }
}

impl std::fmt::Debug for CandleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleBuffer")
            .field("len", &self.ring.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
