// =============================================================================
// Top-of-book port — optional best bid/ask for limit-price refinement
// =============================================================================
//
// The enricher consults this when shaping limit entries but must degrade
// gracefully when the port is absent or the quote has gone stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Best bid/ask snapshot for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookTicker {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    pub bid_qty: f64,
    pub ask_qty: f64,
    pub timestamp: DateTime<Utc>,
}

impl BookTicker {
    /// Whether the quote is younger than `max_age` as of `now`.
    pub fn fresh(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) <= max_age
    }

    /// Quote midpoint.
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Spread in basis points of the midpoint.
    pub fn spread_bps(&self) -> Option<f64> {
        let mid = self.mid();
        if mid <= 0.0 {
            return None;
        }
        Some((self.ask - self.bid) / mid * 10_000.0)
    }
}

pub trait TopOfBook: Send + Sync {
    /// Latest best bid/ask for `symbol`, or `None` when unavailable.
    fn best_bid_ask(&self, symbol: &str) -> Option<BookTicker>;
}
