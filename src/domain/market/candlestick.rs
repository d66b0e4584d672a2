use crate::domain::errors::ValidationError;
use crate::domain::market::interval::Interval;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar for a symbol over a fixed time bucket.
///
/// Rows are append-only once persisted. Full-value equality (`PartialEq`)
/// compares every field; slot identity is the narrower [`SlotKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candlestick {
    pub symbol: String,
    pub interval: Interval,
    pub open_time: i64,
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_asset_volume: Decimal,
    pub number_of_trades: i64,
    pub taker_buy_base_volume: Decimal,
    pub taker_buy_quote_volume: Decimal,
}

/// Composite identity of a candlestick's time bucket.
///
/// Two candlesticks occupy the same slot iff these four fields match,
/// regardless of their OHLCV payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub symbol: String,
    pub interval: Interval,
    pub open_time: i64,
    pub close_time: i64,
}

/// A candlestick-sized time bucket that may or may not have data yet.
/// Emitted by the gap finder; `close_time` is the next boundary minus 1 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandlestickSlot {
    pub open_time: i64,
    pub close_time: i64,
}

impl Candlestick {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            symbol: self.symbol.clone(),
            interval: self.interval,
            open_time: self.open_time,
            close_time: self.close_time,
        }
    }

    /// Checks the field invariants required before persisting a bar.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if self.open_time >= self.close_time {
            return Err(ValidationError::TimeOrder {
                open_time: self.open_time,
                close_time: self.close_time,
            });
        }
        if self.high < self.low {
            return Err(ValidationError::HighBelowLow {
                high: self.high,
                low: self.low,
            });
        }
        let non_negative: [(&str, Decimal); 8] = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
            ("quote_asset_volume", self.quote_asset_volume),
            ("taker_buy_base_volume", self.taker_buy_base_volume),
            ("taker_buy_quote_volume", self.taker_buy_quote_volume),
        ];
        for (field, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(ValidationError::NegativeField {
                    field,
                    value: value.to_string(),
                });
            }
        }
        if self.number_of_trades < 0 {
            return Err(ValidationError::NegativeField {
                field: "number_of_trades",
                value: self.number_of_trades.to_string(),
            });
        }
        if !self.interval.is_aligned(self.open_time) {
            return Err(ValidationError::Misaligned {
                open_time: self.open_time,
                interval: self.interval,
            });
        }
        Ok(())
    }
}
