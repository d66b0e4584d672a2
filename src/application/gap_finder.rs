//! Computes which candlestick slots in a requested range are missing from
//! a known set of bars. Output order is chronological because the walk is,
//! and the same inputs always produce the same list; the reconciliation
//! loop relies on that determinism for its no-progress check.

use crate::domain::market::candlestick::{Candlestick, CandlestickSlot};
use crate::domain::market::interval::Interval;
use std::collections::HashSet;
use tracing::debug;

/// Walks `[start_ms, end_ms)` in interval steps and emits a slot for every
/// boundary whose open time is absent from `existing`. Returns an empty
/// list when `start_ms >= end_ms`.
pub fn find_missing(
    existing: &[Candlestick],
    start_ms: i64,
    end_ms: i64,
    interval: Interval,
) -> Vec<CandlestickSlot> {
    let existing_opens: HashSet<i64> = existing.iter().map(|c| c.open_time).collect();

    let mut missing = Vec::new();
    let mut current = start_ms;
    while current < end_ms {
        let next = interval.advance(current);
        if !existing_opens.contains(&current) {
            missing.push(CandlestickSlot {
                open_time: current,
                close_time: next - 1,
            });
        }
        current = next;
    }

    debug!(
        start_ms,
        end_ms,
        %interval,
        existing = existing_opens.len(),
        missing = missing.len(),
        "computed missing slots"
    );
    missing
}
