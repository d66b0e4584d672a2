//! Wilder-smoothed RSI over a reconciled candlestick series.

use crate::application::reconciliation::ReconciliationEngine;
use crate::domain::errors::RsiError;
use crate::domain::market::interval::Interval;
use anyhow::{Context, Result};
use chrono::DateTime;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info};

const DAY_MS: i64 = 86_400_000;

/// Computes the RSI sequence for `closes` with Wilder's smoothing.
///
/// The first `period - 1` deltas seed the average gain/loss (each sum
/// divided by `period`); every later close updates the averages with
/// `(avg * (period - 1) + delta) / period`. Output length is
/// `closes.len() - period + 1`.
///
/// A zero average loss saturates RSI at 100. A flat seed window (both
/// averages zero) yields 50 by convention, so a constant price series
/// reads as neutral momentum rather than NaN.
pub fn compute_rsi(closes: &[f64], period: usize) -> Result<Vec<f64>, RsiError> {
    if period == 0 {
        return Err(RsiError::ZeroPeriod);
    }
    if closes.len() < period {
        return Err(RsiError::InsufficientData {
            available: closes.len(),
            period,
        });
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let mut values = Vec::with_capacity(closes.len() - period + 1);
    values.push(rsi_value(avg_gain, avg_loss));

    for i in period..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        values.push(rsi_value(avg_gain, avg_loss));
    }

    Ok(values)
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return 50.0;
        }
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// An RSI sequence with one date label per value. Immutable once built;
/// construction fails on a length mismatch or an out-of-range value.
#[derive(Debug, Clone, PartialEq)]
pub struct RsiSeries {
    dates: Vec<String>,
    values: Vec<f64>,
}

impl RsiSeries {
    pub fn new(dates: Vec<String>, values: Vec<f64>) -> Result<Self, RsiError> {
        if dates.len() != values.len() {
            return Err(RsiError::LengthMismatch {
                dates: dates.len(),
                values: values.len(),
            });
        }
        for (index, &value) in values.iter().enumerate() {
            if !(0.0..=100.0).contains(&value) {
                return Err(RsiError::OutOfBounds { index, value });
            }
        }
        Ok(Self { dates, values })
    }

    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Reconciles a range and derives its RSI series. The n-th RSI value is
/// labelled with the open time of the candle it lands on, i.e. index
/// `period - 1 + n` of the reconciled series.
pub struct RsiService {
    engine: ReconciliationEngine,
}

impl RsiService {
    pub fn new(engine: ReconciliationEngine) -> Self {
        Self { engine }
    }

    pub async fn historical_rsi(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
        period: usize,
    ) -> Result<RsiSeries> {
        let reconciliation = self
            .engine
            .reconcile(symbol, interval, start_ms, end_ms)
            .await?;
        if !reconciliation.is_complete() {
            info!(
                symbol,
                %interval,
                outcome = ?reconciliation.outcome,
                "computing RSI over a partial series"
            );
        }

        let candles = reconciliation.candles;
        let mut closes = Vec::with_capacity(candles.len());
        for candle in &candles {
            let close = candle
                .close
                .to_f64()
                .with_context(|| format!("close price {} not representable as f64", candle.close))?;
            closes.push(close);
        }

        let values = compute_rsi(&closes, period)?;
        let dates: Vec<String> = candles[period - 1..]
            .iter()
            .map(|c| format_label(c.open_time, interval))
            .collect();
        debug!(symbol, %interval, points = values.len(), "rsi series computed");

        Ok(RsiSeries::new(dates, values)?)
    }
}

fn format_label(open_time_ms: i64, interval: Interval) -> String {
    let datetime = DateTime::from_timestamp_millis(open_time_ms).unwrap_or_default();
    if interval.duration_ms() >= DAY_MS {
        datetime.format("%Y-%m-%d").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M").to_string()
    }
}
