// =============================================================================
// History port — REST-style candle backfill for warm-up
// =============================================================================
//
// The engine never fetches over the network itself; an adapter implements
// this trait against the venue's kline endpoint (or a fixture file in
// tests). Implementations must be idempotent and return an empty sequence on
// recoverable failure — the warm-up loader maps "empty" onto a degraded
// `WarmupResult` instead of aborting the engine.

use anyhow::Result;
use async_trait::async_trait;

use crate::market_data::Candle;
use crate::types::Timeframe;

#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Fetch up to `limit` historical candles for `symbol` at `interval`,
    /// newest-last (chronological order).
    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>>;
}
