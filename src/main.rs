//! candlesync - historical candlestick backfill and RSI derivation.
//!
//! Reconciles a local SQLite store against the Binance klines endpoint for
//! a requested (symbol, interval, range), fetching only the missing slots,
//! then optionally derives an RSI series from the reconciled data.
//!
//! # Usage
//! ```sh
//! candlesync backfill --symbol BTCUSDT --interval 1h --start 2024-01-01 --end 2024-02-01
//! candlesync rsi --symbol BTCUSDT --interval 1d --start 2024-01-01 --end 2024-03-01 --period 14
//! candlesync latest --symbol BTCUSDT --interval 1m --limit 100
//! ```
//!
//! # Environment Variables
//! - `BINANCE_BASE_URL` - upstream REST base URL (default: https://api.binance.com)
//! - `DATABASE_URL` - SQLite URL (default: sqlite://data/candlesync.db)
//! - `RSI_PERIOD` - default RSI lookback period (default: 14)

use anyhow::{Context, Result, anyhow};
use candlesync::application::fetcher::RateLimitedFetcher;
use candlesync::application::reconciliation::{Outcome, ReconciliationEngine};
use candlesync::application::rsi::RsiService;
use candlesync::config::Config;
use candlesync::domain::market::interval::Interval;
use candlesync::infrastructure::binance::market_data::BinanceMarketDataClient;
use candlesync::infrastructure::core::clock::SystemClock;
use candlesync::infrastructure::persistence::database::Database;
use candlesync::infrastructure::persistence::repositories::SqliteCandlestickRepository;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "candlesync", about = "Backfill candlestick history and derive RSI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile the local store against upstream for a time range
    Backfill {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "1h")]
        interval: String,
        /// Range start: YYYY-MM-DD or epoch milliseconds
        #[arg(long)]
        start: String,
        /// Range end (exclusive): YYYY-MM-DD or epoch milliseconds
        #[arg(long)]
        end: String,
    },
    /// Reconcile a range and print its RSI series
    Rsi {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "1d")]
        interval: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Lookback period; falls back to RSI_PERIOD when omitted
        #[arg(long)]
        period: Option<usize>,
    },
    /// Fetch the most recent bars straight from upstream (no store)
    Latest {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "1m")]
        interval: String,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("candlesync {} starting...", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let client = Arc::new(BinanceMarketDataClient::new(config.binance_base_url.clone()));
    let clock = Arc::new(SystemClock);

    match cli.command {
        Command::Backfill {
            symbol,
            interval,
            start,
            end,
        } => {
            let interval: Interval = interval.parse()?;
            let (start_ms, end_ms) = (parse_time(&start)?, parse_time(&end)?);

            let engine = build_engine(&config, client, clock).await?;
            let result = engine.reconcile(&symbol, interval, start_ms, end_ms).await?;

            match result.outcome {
                Outcome::Complete => info!(
                    "Backfill complete: {} bars for {} {} ({} newly filled)",
                    result.candles.len(),
                    symbol,
                    interval,
                    result.filled
                ),
                Outcome::Partial(reason) => warn!(
                    "Backfill partial ({:?}): {} bars for {} {} ({} newly filled)",
                    reason,
                    result.candles.len(),
                    symbol,
                    interval,
                    result.filled
                ),
            }
        }
        Command::Rsi {
            symbol,
            interval,
            start,
            end,
            period,
        } => {
            let interval: Interval = interval.parse()?;
            let (start_ms, end_ms) = (parse_time(&start)?, parse_time(&end)?);
            let period = period.unwrap_or(config.default_rsi_period);

            let engine = build_engine(&config, client, clock).await?;
            let service = RsiService::new(engine);
            let series = service
                .historical_rsi(&symbol, interval, start_ms, end_ms, period)
                .await?;

            info!(
                "RSI({}) for {} {}: {} points",
                period,
                symbol,
                interval,
                series.len()
            );
            for (date, value) in series.dates().iter().zip(series.values()) {
                println!("{date}  {value:.2}");
            }
        }
        Command::Latest {
            symbol,
            interval,
            limit,
        } => {
            let interval: Interval = interval.parse()?;
            let mut fetcher = RateLimitedFetcher::new(client, clock);
            let bars = fetcher.fetch_latest(&symbol, interval, limit).await?;

            info!("Fetched {} latest bars for {} {}", bars.len(), symbol, interval);
            for bar in &bars {
                println!(
                    "{}  o={} h={} l={} c={} v={}",
                    bar.open_time, bar.open, bar.high, bar.low, bar.close, bar.volume
                );
            }
        }
    }

    Ok(())
}

async fn build_engine(
    config: &Config,
    client: Arc<BinanceMarketDataClient>,
    clock: Arc<SystemClock>,
) -> Result<ReconciliationEngine> {
    let database = Database::new(&config.database_url).await?;
    let repository = Arc::new(SqliteCandlestickRepository::new(database.pool));

    // Ctrl+C flips the shutdown flag so a long backfill aborts cleanly,
    // including out of a rate-limit cooldown.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, aborting after current step...");
            let _ = shutdown_tx.send(true);
        }
    });

    Ok(ReconciliationEngine::new(client, repository, clock).with_shutdown(shutdown_rx))
}

/// Accepts either epoch milliseconds or a YYYY-MM-DD date (UTC midnight).
fn parse_time(raw: &str) -> Result<i64> {
    if raw.chars().all(|c| c.is_ascii_digit()) {
        return raw
            .parse::<i64>()
            .with_context(|| format!("invalid epoch milliseconds: {raw}"));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD or epoch milliseconds, got: {raw}"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| anyhow!("invalid date: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_epoch_ms() {
        assert_eq!(parse_time("1704067200000").unwrap(), 1704067200000);
    }

    #[test]
    fn test_parse_time_date() {
        assert_eq!(parse_time("2024-01-01").unwrap(), 1704067200000);
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(parse_time("yesterday").is_err());
    }
}
