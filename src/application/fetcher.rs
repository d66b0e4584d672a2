//! Rate-limited wrapper around the upstream market-data client.
//!
//! Request accounting is pessimistic: every call is charged the full
//! per-request candle cap, whatever the actual result size. The budget is
//! owned by the fetcher instance, and the reconciliation engine creates a
//! fresh fetcher per reconcile call, so the counter never leaks across
//! invocations.

use crate::domain::errors::ReconcileError;
use crate::domain::market::candlestick::Candlestick;
use crate::domain::market::interval::Interval;
use crate::domain::ports::{Clock, MarketDataClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Upstream pagination cap per klines call.
pub const MAX_PER_REQUEST: u32 = 1000;
/// Request-unit budget per wall-clock minute.
pub const MAX_UNITS_PER_MINUTE: u32 = 6000;

const MINUTE_MS: i64 = 60_000;

pub struct RateLimitedFetcher {
    client: Arc<dyn MarketDataClient>,
    clock: Arc<dyn Clock>,
    used_units: u32,
    cooldowns: u32,
}

impl RateLimitedFetcher {
    pub fn new(client: Arc<dyn MarketDataClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            used_units: 0,
            cooldowns: 0,
        }
    }

    /// Request units consumed since the last budget reset.
    pub fn used_units(&self) -> u32 {
        self.used_units
    }

    /// Number of cooldown waits performed so far.
    pub fn cooldowns(&self) -> u32 {
        self.cooldowns
    }

    /// Fetches one batch for `[start_ms, end_ms]`, blocking on the budget
    /// cooldown first if the minute's units are spent.
    ///
    /// An empty result is a normal outcome (upstream has no data for the
    /// window), not an error. A batch whose open times are not strictly
    /// increasing is a protocol violation and fails the call before the
    /// caller can persist anything from it.
    pub async fn fetch(
        &mut self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candlestick>, ReconcileError> {
        self.charge_budget().await;

        info!(
            symbol,
            %interval,
            start_ms,
            end_ms,
            "fetching candlesticks from upstream"
        );
        let batch = self
            .client
            .get_candles(symbol, interval, MAX_PER_REQUEST, Some(start_ms), Some(end_ms))
            .await
            .map_err(|source| ReconcileError::Upstream {
                symbol: symbol.to_string(),
                interval,
                source,
            })?;

        if batch.is_empty() {
            warn!(symbol, %interval, start_ms, end_ms, "upstream returned no candlesticks");
        }
        validate_order(symbol, interval, &batch)?;
        Ok(batch)
    }

    /// Fetches the most recent `limit` bars, without an explicit range.
    pub async fn fetch_latest(
        &mut self,
        symbol: &str,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candlestick>, ReconcileError> {
        self.charge_budget().await;

        let batch = self
            .client
            .get_candles(symbol, interval, limit.min(MAX_PER_REQUEST), None, None)
            .await
            .map_err(|source| ReconcileError::Upstream {
                symbol: symbol.to_string(),
                interval,
                source,
            })?;
        validate_order(symbol, interval, &batch)?;
        Ok(batch)
    }

    async fn charge_budget(&mut self) {
        if self.used_units >= MAX_UNITS_PER_MINUTE {
            let now = self.clock.now_ms();
            let wait_ms = MINUTE_MS - now.rem_euclid(MINUTE_MS);
            info!(wait_ms, "request budget exhausted, waiting for the next minute");
            self.clock.sleep(Duration::from_millis(wait_ms as u64)).await;
            self.used_units = 0;
            self.cooldowns += 1;
        }
        self.used_units += MAX_PER_REQUEST;
    }
}

/// Enforces the upstream ordering contract: strictly increasing open times.
fn validate_order(
    symbol: &str,
    interval: Interval,
    batch: &[Candlestick],
) -> Result<(), ReconcileError> {
    let mut last_open_time = i64::MIN;
    for candlestick in batch {
        if candlestick.open_time <= last_open_time {
            return Err(ReconcileError::OutOfOrderData {
                symbol: symbol.to_string(),
                interval,
                previous_open_time: last_open_time,
                open_time: candlestick.open_time,
            });
        }
        last_open_time = candlestick.open_time;
    }
    Ok(())
}
