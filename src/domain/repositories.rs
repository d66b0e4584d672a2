//! Repository abstraction over the candlestick store.
//!
//! The reconciliation engine only needs three operations: a range query,
//! a slot existence check, and an insert that reports duplicates instead
//! of failing on them. Concurrent producers may race on the same slot, so
//! `insert` distinguishes a fresh write from a benign duplicate.

use crate::domain::market::candlestick::{Candlestick, SlotKey};
use crate::domain::market::interval::Interval;
use anyhow::Result;
use async_trait::async_trait;

/// Result of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The slot was already occupied. Expected concurrency noise, never fatal.
    Duplicate,
}

/// Persisted candlestick storage. Rows are append-only; deletion is an
/// administrative concern outside this interface.
#[async_trait]
pub trait CandlestickRepository: Send + Sync {
    /// All bars with `open_time` in `[start_ms, end_ms)`, ascending by open time.
    async fn query(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candlestick>>;

    /// Whether a bar already occupies this exact slot.
    async fn exists(&self, key: &SlotKey) -> Result<bool>;

    /// Insert a bar, reporting `Duplicate` if the slot is already taken.
    async fn insert(&self, candlestick: &Candlestick) -> Result<InsertOutcome>;
}
