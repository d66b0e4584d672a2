//! Configuration loading from environment variables.

use anyhow::{Context, Result};
use std::env;

const DEFAULT_BINANCE_BASE_URL: &str = "https://api.binance.com";
const DEFAULT_DATABASE_URL: &str = "sqlite://data/candlesync.db";
const DEFAULT_RSI_PERIOD: usize = 14;

#[derive(Debug, Clone)]
pub struct Config {
    pub binance_base_url: String,
    pub database_url: String,
    pub default_rsi_period: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let binance_base_url =
            env::var("BINANCE_BASE_URL").unwrap_or_else(|_| DEFAULT_BINANCE_BASE_URL.to_string());
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
        let default_rsi_period = match env::var("RSI_PERIOD") {
            Ok(raw) => raw
                .parse::<usize>()
                .context("RSI_PERIOD must be a positive integer")?,
            Err(_) => DEFAULT_RSI_PERIOD,
        };
        if default_rsi_period == 0 {
            anyhow::bail!("RSI_PERIOD must be greater than zero");
        }

        Ok(Self {
            binance_base_url,
            database_url,
            default_rsi_period,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        // from_env falls back to defaults when variables are unset; the
        // parsed struct must carry usable values either way.
        let config = Config::from_env().unwrap();
        assert!(!config.binance_base_url.is_empty());
        assert!(config.database_url.starts_with("sqlite://"));
        assert!(config.default_rsi_period > 0);
    }
}
