use crate::domain::market::interval::Interval;
use rust_decimal::Decimal;
use thiserror::Error;

/// Field-level invariant violations, raised before any write and never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Symbol must not be empty")]
    EmptySymbol,

    #[error("Start time {start_ms} must be before end time {end_ms}")]
    InvalidRange { start_ms: i64, end_ms: i64 },

    #[error("Open time {open_time} must be before close time {close_time}")]
    TimeOrder { open_time: i64, close_time: i64 },

    #[error("High {high} cannot be less than low {low}")]
    HighBelowLow { high: Decimal, low: Decimal },

    #[error("Field {field} must be non-negative, got {value}")]
    NegativeField { field: &'static str, value: String },

    #[error("Open time {open_time} is not aligned to a {interval} boundary")]
    Misaligned { open_time: i64, interval: Interval },
}

/// Faults that abort a reconcile call outright. Expected terminations
/// (empty upstream, no progress) are not errors; see
/// `application::reconciliation::Outcome`.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(
        "Upstream returned candlesticks out of order for {symbol} {interval}: \
         open time {open_time} follows {previous_open_time}"
    )]
    OutOfOrderData {
        symbol: String,
        interval: Interval,
        previous_open_time: i64,
        open_time: i64,
    },

    #[error("Upstream fetch failed for {symbol} {interval}: {source}")]
    Upstream {
        symbol: String,
        interval: Interval,
        #[source]
        source: anyhow::Error,
    },

    #[error("Candlestick store error: {0}")]
    Store(#[source] anyhow::Error),
}

/// Errors raised by the RSI computation.
#[derive(Debug, Error)]
pub enum RsiError {
    #[error("Not enough close prices to compute RSI: have {available}, need at least {period}")]
    InsufficientData { available: usize, period: usize },

    #[error("RSI period must be greater than zero")]
    ZeroPeriod,

    #[error("RSI series has {values} values but {dates} date labels")]
    LengthMismatch { dates: usize, values: usize },

    #[error("RSI value {value} at index {index} is outside [0, 100]")]
    OutOfBounds { index: usize, value: f64 },
}
