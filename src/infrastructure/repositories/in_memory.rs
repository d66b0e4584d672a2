//! In-memory candlestick store.
//!
//! Thread-safe (`Arc<RwLock>`), async-ready, and keyed exactly like the
//! SQLite implementation so the reconciliation engine cannot tell them
//! apart. Used by tests and suitable for single-instance dry runs; data
//! is lost on restart.

use crate::domain::market::candlestick::{Candlestick, SlotKey};
use crate::domain::market::interval::Interval;
use crate::domain::repositories::{CandlestickRepository, InsertOutcome};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct InMemoryCandlestickRepository {
    slots: Arc<RwLock<HashMap<SlotKey, Candlestick>>>,
}

impl InMemoryCandlestickRepository {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

impl Default for InMemoryCandlestickRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandlestickRepository for InMemoryCandlestickRepository {
    async fn query(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candlestick>> {
        let slots = self.slots.read().await;
        let mut candles: Vec<Candlestick> = slots
            .values()
            .filter(|c| {
                c.symbol == symbol
                    && c.interval == interval
                    && c.open_time >= start_ms
                    && c.open_time < end_ms
            })
            .cloned()
            .collect();
        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }

    async fn exists(&self, key: &SlotKey) -> Result<bool> {
        Ok(self.slots.read().await.contains_key(key))
    }

    async fn insert(&self, candlestick: &Candlestick) -> Result<InsertOutcome> {
        let mut slots = self.slots.write().await;
        let key = candlestick.slot_key();
        if slots.contains_key(&key) {
            return Ok(InsertOutcome::Duplicate);
        }
        slots.insert(key, candlestick.clone());
        Ok(InsertOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BASE: i64 = 1704067200000;

    fn bar(open_time: i64) -> Candlestick {
        Candlestick {
            symbol: "ETHUSDT".to_string(),
            interval: Interval::OneMin,
            open_time,
            close_time: open_time + 59_999,
            open: dec!(2000),
            high: dec!(2010),
            low: dec!(1995),
            close: dec!(2005),
            volume: dec!(10),
            quote_asset_volume: dec!(20000),
            number_of_trades: 5,
            taker_buy_base_volume: dec!(4),
            taker_buy_quote_volume: dec!(8000),
        }
    }

    #[tokio::test]
    async fn test_insert_query_exists() {
        let repo = InMemoryCandlestickRepository::new();
        let candle = bar(BASE);

        assert_eq!(repo.insert(&candle).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            repo.insert(&candle).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert!(repo.exists(&candle.slot_key()).await.unwrap());

        let found = repo
            .query("ETHUSDT", Interval::OneMin, BASE, BASE + 60_000)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_query_sorted_and_half_open() {
        let repo = InMemoryCandlestickRepository::new();
        // insert out of order
        for open in [BASE + 2 * 60_000, BASE, BASE + 60_000] {
            repo.insert(&bar(open)).await.unwrap();
        }

        let found = repo
            .query("ETHUSDT", Interval::OneMin, BASE, BASE + 2 * 60_000)
            .await
            .unwrap();
        let opens: Vec<i64> = found.iter().map(|c| c.open_time).collect();
        assert_eq!(opens, vec![BASE, BASE + 60_000]);
    }
}
