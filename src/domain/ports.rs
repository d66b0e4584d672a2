use crate::domain::market::candlestick::Candlestick;
use crate::domain::market::interval::Interval;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Upstream market-data API, reduced to the one call the reconciliation
/// engine needs. Implementations are expected to return at most `limit`
/// bars per call, in ascending open-time order; the engine re-validates
/// the ordering and treats a violation as fatal.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> Result<Vec<Candlestick>>;
}

/// Wall-clock access for the rate-limit cooldown. Injected so tests can
/// drive time without sleeping.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
    async fn sleep(&self, duration: Duration);
}
