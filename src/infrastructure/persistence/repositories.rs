use crate::domain::market::candlestick::{Candlestick, SlotKey};
use crate::domain::market::interval::Interval;
use crate::domain::repositories::{CandlestickRepository, InsertOutcome};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::debug;

pub struct SqliteCandlestickRepository {
    pool: SqlitePool,
}

impl SqliteCandlestickRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_row(row: &sqlx::sqlite::SqliteRow) -> Result<Candlestick> {
        let interval_str: String = row.try_get("interval")?;
        let decimal = |column: &str| -> Result<Decimal> {
            let text: String = row.try_get(column)?;
            Decimal::from_str(&text)
                .map_err(|e| anyhow!("invalid decimal in column {}: {}", column, e))
        };

        Ok(Candlestick {
            symbol: row.try_get("symbol")?,
            interval: Interval::from_str(&interval_str)?,
            open_time: row.try_get("open_time")?,
            close_time: row.try_get("close_time")?,
            open: decimal("open")?,
            high: decimal("high")?,
            low: decimal("low")?,
            close: decimal("close")?,
            volume: decimal("volume")?,
            quote_asset_volume: decimal("quote_asset_volume")?,
            number_of_trades: row.try_get("number_of_trades")?,
            taker_buy_base_volume: decimal("taker_buy_base_volume")?,
            taker_buy_quote_volume: decimal("taker_buy_quote_volume")?,
        })
    }
}

#[async_trait]
impl CandlestickRepository for SqliteCandlestickRepository {
    async fn query(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candlestick>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM candlesticks
            WHERE symbol = ? AND interval = ? AND open_time >= ? AND open_time < ?
            ORDER BY open_time ASC
            "#,
        )
        .bind(symbol)
        .bind(interval.as_api_str())
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query candlesticks")?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            candles.push(Self::map_row(row)?);
        }
        Ok(candles)
    }

    async fn exists(&self, key: &SlotKey) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM candlesticks
                WHERE symbol = ? AND interval = ? AND open_time = ? AND close_time = ?
            ) AS present
            "#,
        )
        .bind(&key.symbol)
        .bind(key.interval.as_api_str())
        .bind(key.open_time)
        .bind(key.close_time)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check candlestick existence")?;

        let present: i64 = row.try_get("present")?;
        Ok(present != 0)
    }

    async fn insert(&self, candlestick: &Candlestick) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO candlesticks (
                symbol, interval, open_time, close_time,
                open, high, low, close,
                volume, quote_asset_volume, number_of_trades,
                taker_buy_base_volume, taker_buy_quote_volume
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&candlestick.symbol)
        .bind(candlestick.interval.as_api_str())
        .bind(candlestick.open_time)
        .bind(candlestick.close_time)
        .bind(candlestick.open.to_string())
        .bind(candlestick.high.to_string())
        .bind(candlestick.low.to_string())
        .bind(candlestick.close.to_string())
        .bind(candlestick.volume.to_string())
        .bind(candlestick.quote_asset_volume.to_string())
        .bind(candlestick.number_of_trades)
        .bind(candlestick.taker_buy_base_volume.to_string())
        .bind(candlestick.taker_buy_quote_volume.to_string())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(
                    symbol = %candlestick.symbol,
                    open_time = candlestick.open_time,
                    "persisted candlestick"
                );
                Ok(InsertOutcome::Inserted)
            }
            Err(e) => {
                if let Some(db_err) = e.as_database_error()
                    && db_err.is_unique_violation()
                {
                    return Ok(InsertOutcome::Duplicate);
                }
                Err(e).context("Failed to insert candlestick")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::database::Database;
    use rust_decimal_macros::dec;

    fn bar(open_time: i64) -> Candlestick {
        Candlestick {
            symbol: "BTCUSDT".to_string(),
            interval: Interval::OneMin,
            open_time,
            close_time: open_time + 59_999,
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100.5),
            volume: dec!(2.5),
            quote_asset_volume: dec!(250),
            number_of_trades: 7,
            taker_buy_base_volume: dec!(1.2),
            taker_buy_quote_volume: dec!(120),
        }
    }

    async fn repo() -> SqliteCandlestickRepository {
        let db = Database::in_memory().await.unwrap();
        SqliteCandlestickRepository::new(db.pool)
    }

    const BASE: i64 = 1704067200000;

    #[tokio::test]
    async fn test_insert_and_query_round_trip() {
        let repo = repo().await;
        let candle = bar(BASE);
        assert_eq!(repo.insert(&candle).await.unwrap(), InsertOutcome::Inserted);

        let found = repo
            .query("BTCUSDT", Interval::OneMin, BASE, BASE + 60_000)
            .await
            .unwrap();
        assert_eq!(found, vec![candle]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_reported_not_failed() {
        let repo = repo().await;
        let candle = bar(BASE);
        repo.insert(&candle).await.unwrap();
        assert_eq!(
            repo.insert(&candle).await.unwrap(),
            InsertOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_query_range_is_half_open_and_sorted() {
        let repo = repo().await;
        for i in 0..3 {
            repo.insert(&bar(BASE + i * 60_000)).await.unwrap();
        }

        let found = repo
            .query("BTCUSDT", Interval::OneMin, BASE, BASE + 2 * 60_000)
            .await
            .unwrap();
        let opens: Vec<i64> = found.iter().map(|c| c.open_time).collect();
        // end is exclusive
        assert_eq!(opens, vec![BASE, BASE + 60_000]);
    }

    #[tokio::test]
    async fn test_exists_matches_full_slot_key() {
        let repo = repo().await;
        let candle = bar(BASE);
        repo.insert(&candle).await.unwrap();

        assert!(repo.exists(&candle.slot_key()).await.unwrap());

        let mut other = candle.slot_key();
        other.open_time += 60_000;
        assert!(!repo.exists(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_query_filters_by_interval() {
        let repo = repo().await;
        repo.insert(&bar(BASE)).await.unwrap();

        let found = repo
            .query("BTCUSDT", Interval::FiveMin, BASE, BASE + 60_000)
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
