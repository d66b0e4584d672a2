use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Candlestick bucket duration. All boundary arithmetic is epoch-ms UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    OneMin,
    ThreeMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    TwoHour,
    FourHour,
    SixHour,
    EightHour,
    TwelveHour,
    OneDay,
    ThreeDay,
    OneWeek,
}

impl Interval {
    /// Duration of one bucket in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        match self {
            Interval::OneMin => MINUTE_MS,
            Interval::ThreeMin => 3 * MINUTE_MS,
            Interval::FiveMin => 5 * MINUTE_MS,
            Interval::FifteenMin => 15 * MINUTE_MS,
            Interval::ThirtyMin => 30 * MINUTE_MS,
            Interval::OneHour => HOUR_MS,
            Interval::TwoHour => 2 * HOUR_MS,
            Interval::FourHour => 4 * HOUR_MS,
            Interval::SixHour => 6 * HOUR_MS,
            Interval::EightHour => 8 * HOUR_MS,
            Interval::TwelveHour => 12 * HOUR_MS,
            Interval::OneDay => DAY_MS,
            Interval::ThreeDay => 3 * DAY_MS,
            Interval::OneWeek => 7 * DAY_MS,
        }
    }

    /// The open time of the bucket that follows one opening at `open_ms`.
    pub fn advance(&self, open_ms: i64) -> i64 {
        open_ms + self.duration_ms()
    }

    /// Whether `timestamp_ms` lands on a bucket boundary for this interval.
    ///
    /// Multi-day intervals are only required to land on a UTC midnight,
    /// since the exchange anchors their weekly/3-day grids to its own
    /// listing calendar rather than the epoch.
    pub fn is_aligned(&self, timestamp_ms: i64) -> bool {
        match self {
            Interval::ThreeDay | Interval::OneWeek => timestamp_ms.rem_euclid(DAY_MS) == 0,
            _ => timestamp_ms.rem_euclid(self.duration_ms()) == 0,
        }
    }

    /// Rounds `timestamp_ms` down to the open of its bucket.
    pub fn bucket_start(&self, timestamp_ms: i64) -> i64 {
        let step = match self {
            Interval::ThreeDay | Interval::OneWeek => DAY_MS,
            _ => self.duration_ms(),
        };
        timestamp_ms - timestamp_ms.rem_euclid(step)
    }

    /// Upstream API interval token.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Interval::OneMin => "1m",
            Interval::ThreeMin => "3m",
            Interval::FiveMin => "5m",
            Interval::FifteenMin => "15m",
            Interval::ThirtyMin => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHour => "2h",
            Interval::FourHour => "4h",
            Interval::SixHour => "6h",
            Interval::EightHour => "8h",
            Interval::TwelveHour => "12h",
            Interval::OneDay => "1d",
            Interval::ThreeDay => "3d",
            Interval::OneWeek => "1w",
        }
    }

    /// Returns all supported intervals in ascending duration order.
    pub fn all() -> Vec<Interval> {
        vec![
            Interval::OneMin,
            Interval::ThreeMin,
            Interval::FiveMin,
            Interval::FifteenMin,
            Interval::ThirtyMin,
            Interval::OneHour,
            Interval::TwoHour,
            Interval::FourHour,
            Interval::SixHour,
            Interval::EightHour,
            Interval::TwelveHour,
            Interval::OneDay,
            Interval::ThreeDay,
            Interval::OneWeek,
        ]
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" => Ok(Interval::OneMin),
            "3m" | "3min" => Ok(Interval::ThreeMin),
            "5m" | "5min" => Ok(Interval::FiveMin),
            "15m" | "15min" => Ok(Interval::FifteenMin),
            "30m" | "30min" => Ok(Interval::ThirtyMin),
            "1h" | "1hour" => Ok(Interval::OneHour),
            "2h" | "2hour" => Ok(Interval::TwoHour),
            "4h" | "4hour" => Ok(Interval::FourHour),
            "6h" | "6hour" => Ok(Interval::SixHour),
            "8h" | "8hour" => Ok(Interval::EightHour),
            "12h" | "12hour" => Ok(Interval::TwelveHour),
            "1d" | "1day" => Ok(Interval::OneDay),
            "3d" | "3day" => Ok(Interval::ThreeDay),
            "1w" | "1week" => Ok(Interval::OneWeek),
            _ => Err(anyhow!(
                "Invalid interval: '{}'. Valid options: 1m, 3m, 5m, 15m, 30m, 1h, 2h, 4h, 6h, 8h, 12h, 1d, 3d, 1w",
                s
            )),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_api_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_ms() {
        assert_eq!(Interval::OneMin.duration_ms(), 60_000);
        assert_eq!(Interval::FiveMin.duration_ms(), 300_000);
        assert_eq!(Interval::OneHour.duration_ms(), 3_600_000);
        assert_eq!(Interval::OneDay.duration_ms(), 86_400_000);
        assert_eq!(Interval::OneWeek.duration_ms(), 7 * 86_400_000);
    }

    #[test]
    fn test_advance() {
        // 2024-01-01 00:00:00 UTC
        let base = 1704067200000i64;
        assert_eq!(Interval::OneMin.advance(base), base + 60_000);
        assert_eq!(Interval::OneDay.advance(base), base + 86_400_000);
    }

    #[test]
    fn test_from_str() {
        assert_eq!(Interval::from_str("1m").unwrap(), Interval::OneMin);
        assert_eq!(Interval::from_str("15M").unwrap(), Interval::FifteenMin);
        assert_eq!(Interval::from_str("4h").unwrap(), Interval::FourHour);
        assert_eq!(Interval::from_str("1day").unwrap(), Interval::OneDay);
        assert_eq!(Interval::from_str("1w").unwrap(), Interval::OneWeek);
        assert!(Interval::from_str("2w").is_err());
    }

    #[test]
    fn test_is_aligned() {
        let base = 1704067200000i64; // 2024-01-01 00:00:00 UTC, a midnight
        assert!(Interval::FiveMin.is_aligned(base));
        assert!(Interval::FiveMin.is_aligned(base + 5 * 60_000));
        assert!(!Interval::FiveMin.is_aligned(base + 3 * 60_000));
        assert!(Interval::OneDay.is_aligned(base));
        assert!(!Interval::OneDay.is_aligned(base + 60_000));
        // weekly buckets only need to open at a UTC midnight
        assert!(Interval::OneWeek.is_aligned(base + 86_400_000));
    }

    #[test]
    fn test_bucket_start() {
        let base = 1704067200000i64;
        assert_eq!(
            Interval::FiveMin.bucket_start(base + 7 * 60_000),
            base + 5 * 60_000
        );
        assert_eq!(Interval::OneHour.bucket_start(base + 59 * 60_000), base);
        assert_eq!(Interval::OneHour.bucket_start(base), base);
    }

    #[test]
    fn test_api_strings_round_trip() {
        for interval in Interval::all() {
            assert_eq!(Interval::from_str(interval.as_api_str()).unwrap(), interval);
        }
    }
}
