pub mod candlestick;
pub mod interval;
