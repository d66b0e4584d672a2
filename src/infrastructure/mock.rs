//! Test doubles for the upstream client and the clock.
//!
//! `ScriptedMarketClient` behaves like a klines endpoint over a synthetic
//! data set: it answers any window with the bars it "has", capped by the
//! request limit, and records every call so tests can assert on fetch
//! counts. `ManualClock` advances only when slept on, so cooldown tests
//! run instantly.

use crate::domain::market::candlestick::Candlestick;
use crate::domain::market::interval::Interval;
use crate::domain::ports::{Clock, MarketDataClient};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

/// Builds a plausible, valid bar for a slot. Close prices vary with the
/// slot index so RSI over synthetic series is non-degenerate.
pub fn synthetic_candle(symbol: &str, interval: Interval, open_time: i64) -> Candlestick {
    let step = (open_time / interval.duration_ms()) % 7;
    let close = Decimal::from(100 + step);
    Candlestick {
        symbol: symbol.to_string(),
        interval,
        open_time,
        close_time: interval.advance(open_time) - 1,
        open: Decimal::from(100),
        high: Decimal::from(110),
        low: Decimal::from(95),
        close,
        volume: Decimal::from(10),
        quote_asset_volume: Decimal::from(1000),
        number_of_trades: 25,
        taker_buy_base_volume: Decimal::from(5),
        taker_buy_quote_volume: Decimal::from(500),
    }
}

enum Behavior {
    /// Serve every aligned slot inside [available_start, available_end),
    /// minus the holes.
    Range {
        symbol: String,
        interval: Interval,
        available_start: i64,
        available_end: i64,
        holes: HashSet<i64>,
    },
    /// Always return an empty batch.
    Empty,
    /// Return a batch whose open times are not strictly increasing.
    OutOfOrder {
        symbol: String,
        interval: Interval,
        base: i64,
    },
}

pub struct ScriptedMarketClient {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl ScriptedMarketClient {
    pub fn serving_range(
        symbol: &str,
        interval: Interval,
        available_start: i64,
        available_end: i64,
    ) -> Self {
        Self {
            behavior: Behavior::Range {
                symbol: symbol.to_string(),
                interval,
                available_start,
                available_end,
                holes: HashSet::new(),
            },
            calls: AtomicUsize::new(0),
        }
    }

    /// Like `serving_range`, but the given open times never get data,
    /// mimicking exchange maintenance windows or listing gaps.
    pub fn serving_range_with_holes(
        symbol: &str,
        interval: Interval,
        available_start: i64,
        available_end: i64,
        holes: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            behavior: Behavior::Range {
                symbol: symbol.to_string(),
                interval,
                available_start,
                available_end,
                holes: holes.into_iter().collect(),
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            behavior: Behavior::Empty,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn out_of_order(symbol: &str, interval: Interval, base: i64) -> Self {
        Self {
            behavior: Behavior::OutOfOrder {
                symbol: symbol.to_string(),
                interval,
                base,
            },
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of upstream calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataClient for ScriptedMarketClient {
    async fn get_candles(
        &self,
        _symbol: &str,
        _interval: Interval,
        limit: u32,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> Result<Vec<Candlestick>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Empty => Ok(vec![]),
            Behavior::OutOfOrder {
                symbol,
                interval,
                base,
            } => {
                let a = synthetic_candle(symbol, *interval, *base);
                let b = synthetic_candle(symbol, *interval, interval.advance(*base));
                // second bar repeats the first open time
                let mut c = synthetic_candle(symbol, *interval, *base);
                c.close_time = b.close_time;
                Ok(vec![a, c, b])
            }
            Behavior::Range {
                symbol,
                interval,
                available_start,
                available_end,
                holes,
            } => {
                let from = start_ms.unwrap_or(*available_start).max(*available_start);
                let to = end_ms.unwrap_or(*available_end).min(*available_end);

                let mut batch = Vec::new();
                let mut current = interval.bucket_start(from);
                if current < from {
                    current = interval.advance(current);
                }
                while current < to && batch.len() < limit as usize {
                    if !holes.contains(&current) {
                        batch.push(synthetic_candle(symbol, *interval, current));
                    }
                    current = interval.advance(current);
                }
                Ok(batch)
            }
        }
    }
}

/// Clock that only moves when something sleeps on it.
pub struct ManualClock {
    now_ms: AtomicI64,
    sleeps: Mutex<Vec<u64>>,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps.lock().unwrap().len()
    }

    pub fn last_sleep_ms(&self) -> Option<u64> {
        self.sleeps.lock().unwrap().last().copied()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        let millis = duration.as_millis() as u64;
        self.sleeps.lock().unwrap().push(millis);
        self.now_ms.fetch_add(millis as i64, Ordering::SeqCst);
    }
}
