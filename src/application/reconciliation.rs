//! Convergence loop that backfills a candlestick range against the
//! upstream API.
//!
//! Each iteration fetches one batch for the earliest unresolved gap,
//! persists what the store does not already have, then reloads the store
//! and recomputes the gaps. The loop ends when no gaps remain or when it
//! can prove it is no longer making progress: a batch window start seen
//! twice, an empty upstream batch, or a recomputed gap list identical to
//! the previous one. Slots upstream can never fill (delistings,
//! maintenance windows) therefore terminate the loop instead of retrying
//! forever.

use crate::application::fetcher::{MAX_PER_REQUEST, RateLimitedFetcher};
use crate::application::gap_finder;
use crate::domain::errors::{ReconcileError, ValidationError};
use crate::domain::market::candlestick::Candlestick;
use crate::domain::market::interval::Interval;
use crate::domain::ports::{Clock, MarketDataClient};
use crate::domain::repositories::{CandlestickRepository, InsertOutcome};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why a reconcile call stopped before closing every gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Upstream returned an empty batch; there is no more data to offer.
    UpstreamExhausted,
    /// A batch window start was about to be attempted a second time.
    RepeatedWindow,
    /// The gap list did not change after persisting a batch.
    NoProgress,
    /// The shutdown signal fired, possibly during a rate-limit wait.
    Cancelled,
}

/// Whether the requested range ended up gap-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Partial(AbortReason),
}

/// Result of a reconcile call: the series as currently persisted for the
/// range, how it terminated, and how many new slots this call filled.
#[derive(Debug)]
pub struct Reconciliation {
    pub candles: Vec<Candlestick>,
    pub outcome: Outcome,
    pub filled: usize,
}

impl Reconciliation {
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, Outcome::Complete)
    }
}

pub struct ReconciliationEngine {
    client: Arc<dyn MarketDataClient>,
    repository: Arc<dyn CandlestickRepository>,
    clock: Arc<dyn Clock>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ReconciliationEngine {
    pub fn new(
        client: Arc<dyn MarketDataClient>,
        repository: Arc<dyn CandlestickRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            repository,
            clock,
            shutdown: None,
        }
    }

    /// Registers a shutdown flag. When it flips to `true` the current
    /// reconcile aborts cleanly, including out of a cooldown wait.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Converges the store towards a gap-free series over
    /// `[start_ms, end_ms)` and returns whatever is persisted for the
    /// range afterwards, in ascending open-time order.
    pub async fn reconcile(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Reconciliation, ReconcileError> {
        if symbol.is_empty() {
            return Err(ValidationError::EmptySymbol.into());
        }
        if start_ms > end_ms {
            return Err(ValidationError::InvalidRange { start_ms, end_ms }.into());
        }

        let mut existing = self.load_range(symbol, interval, start_ms, end_ms).await?;
        let mut missing = gap_finder::find_missing(&existing, start_ms, end_ms, interval);
        info!(
            symbol,
            %interval,
            start_ms,
            end_ms,
            existing = existing.len(),
            missing = missing.len(),
            "starting reconciliation"
        );

        // Budget and progress state are scoped to this call.
        let mut fetcher = RateLimitedFetcher::new(self.client.clone(), self.clock.clone());
        let mut attempted_starts: HashSet<i64> = HashSet::new();
        let mut filled = 0usize;

        let outcome = loop {
            if missing.is_empty() {
                break Outcome::Complete;
            }
            if self.is_shutting_down() {
                break Outcome::Partial(AbortReason::Cancelled);
            }

            let window_start = missing[0].open_time;
            if !attempted_starts.insert(window_start) {
                warn!(window_start, "batch window already attempted, aborting");
                break Outcome::Partial(AbortReason::RepeatedWindow);
            }
            let window_end =
                (window_start + i64::from(MAX_PER_REQUEST) * interval.duration_ms()).min(end_ms);

            let batch = match self
                .fetch_window(&mut fetcher, symbol, interval, window_start, window_end)
                .await?
            {
                Some(batch) => batch,
                None => break Outcome::Partial(AbortReason::Cancelled),
            };
            if batch.is_empty() {
                break Outcome::Partial(AbortReason::UpstreamExhausted);
            }

            filled += self.persist_batch(&batch).await?;

            existing = self.load_range(symbol, interval, start_ms, end_ms).await?;
            let recomputed = gap_finder::find_missing(&existing, start_ms, end_ms, interval);
            if recomputed.is_empty() {
                break Outcome::Complete;
            }
            if recomputed == missing {
                warn!(
                    symbol,
                    %interval,
                    remaining = recomputed.len(),
                    "no progress closing gaps, aborting"
                );
                break Outcome::Partial(AbortReason::NoProgress);
            }
            missing = recomputed;
        };

        if let Outcome::Partial(reason) = outcome {
            warn!(
                symbol,
                %interval,
                start_ms,
                end_ms,
                filled,
                ?reason,
                "reconciliation returned a partial series"
            );
        } else {
            info!(symbol, %interval, filled, "reconciliation complete");
        }

        Ok(Reconciliation {
            candles: existing,
            outcome,
            filled,
        })
    }

    /// Runs the fetch, racing it against the shutdown flag. Returns
    /// `Ok(None)` when shutdown interrupts the fetch or its cooldown wait.
    async fn fetch_window(
        &self,
        fetcher: &mut RateLimitedFetcher,
        symbol: &str,
        interval: Interval,
        window_start: i64,
        window_end: i64,
    ) -> Result<Option<Vec<Candlestick>>, ReconcileError> {
        match &self.shutdown {
            Some(rx) => {
                let mut rx = rx.clone();
                tokio::select! {
                    result = fetcher.fetch(symbol, interval, window_start, window_end) => {
                        result.map(Some)
                    }
                    Ok(_) = rx.wait_for(|&stop| stop) => {
                        warn!(symbol, %interval, "shutdown during fetch, aborting reconcile");
                        Ok(None)
                    }
                }
            }
            None => fetcher
                .fetch(symbol, interval, window_start, window_end)
                .await
                .map(Some),
        }
    }

    /// Validates and inserts every bar of the batch the store does not
    /// already hold. Returns the number of newly filled slots.
    async fn persist_batch(&self, batch: &[Candlestick]) -> Result<usize, ReconcileError> {
        let mut inserted = 0usize;
        for candlestick in batch {
            let key = candlestick.slot_key();
            if self
                .repository
                .exists(&key)
                .await
                .map_err(ReconcileError::Store)?
            {
                debug!(
                    symbol = %key.symbol,
                    open_time = key.open_time,
                    "slot already persisted, skipping"
                );
                continue;
            }
            candlestick.validate()?;
            match self
                .repository
                .insert(candlestick)
                .await
                .map_err(ReconcileError::Store)?
            {
                InsertOutcome::Inserted => inserted += 1,
                InsertOutcome::Duplicate => {
                    // Lost a race with a concurrent producer. Benign.
                    warn!(
                        symbol = %key.symbol,
                        open_time = key.open_time,
                        "duplicate insert skipped"
                    );
                }
            }
        }
        Ok(inserted)
    }

    async fn load_range(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candlestick>, ReconcileError> {
        self.repository
            .query(symbol, interval, start_ms, end_ms)
            .await
            .map_err(ReconcileError::Store)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }
}
