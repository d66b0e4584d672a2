//! Binance klines client.
//!
//! Thin REST wrapper over `GET /api/v3/klines`. Rate-limit budgeting and
//! ordering validation live in the application layer; this client only
//! fetches and decodes.

use crate::domain::market::candlestick::Candlestick;
use crate::domain::market::interval::Interval;
use crate::domain::ports::MarketDataClient;
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, build_url_with_query};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use tracing::{debug, warn};

pub struct BinanceMarketDataClient {
    client: ClientWithMiddleware,
    base_url: String,
}

impl BinanceMarketDataClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            base_url,
        }
    }
}

#[async_trait]
impl MarketDataClient for BinanceMarketDataClient {
    async fn get_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> Result<Vec<Candlestick>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let limit_str = limit.to_string();

        let mut params: Vec<(&str, String)> = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.as_api_str().to_string()),
            ("limit", limit_str),
        ];
        if let Some(start) = start_ms {
            params.push(("startTime", start.to_string()));
        }
        if let Some(end) = end_ms {
            params.push(("endTime", end.to_string()));
        }

        let url_with_query = build_url_with_query(&url, &params);
        let response = self
            .client
            .get(&url_with_query)
            .send()
            .await
            .context("Failed to fetch klines from Binance")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance klines fetch failed: {}", error_text);
        }

        // Kline rows: [openTime, open, high, low, close, volume, closeTime,
        // quoteAssetVolume, numberOfTrades, takerBuyBase, takerBuyQuote, _]
        let klines: Vec<serde_json::Value> = response
            .json()
            .await
            .context("Failed to parse Binance klines response")?;
        let total = klines.len();

        let candles: Vec<Candlestick> = klines
            .into_iter()
            .filter_map(|k| parse_kline(&k, symbol, interval))
            .collect();

        if candles.len() < total {
            warn!(
                symbol,
                %interval,
                dropped = total - candles.len(),
                "skipped malformed kline rows"
            );
        }
        debug!(symbol, %interval, count = candles.len(), "fetched klines");

        Ok(candles)
    }
}

fn parse_kline(value: &serde_json::Value, symbol: &str, interval: Interval) -> Option<Candlestick> {
    let arr = value.as_array()?;
    if arr.len() < 11 {
        return None;
    }

    let decimal = |v: &serde_json::Value| Decimal::from_str_exact(v.as_str()?).ok();

    Some(Candlestick {
        symbol: symbol.to_string(),
        interval,
        open_time: arr[0].as_i64()?,
        close_time: arr[6].as_i64()?,
        open: decimal(&arr[1])?,
        high: decimal(&arr[2])?,
        low: decimal(&arr[3])?,
        close: decimal(&arr[4])?,
        volume: decimal(&arr[5])?,
        quote_asset_volume: decimal(&arr[7])?,
        number_of_trades: arr[8].as_i64()?,
        taker_buy_base_volume: decimal(&arr[9])?,
        taker_buy_quote_volume: decimal(&arr[10])?,
    })
}
