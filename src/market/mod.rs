//! Binance spot market-data adapter.
//!
//! Covers exactly the two contracts the core consumes: klines for the
//! candidate collector and last price for the lifecycle transitioner.

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;

use crate::collector::MarketData;
use crate::lifecycle::PriceSource;
use crate::models::Bar;

const BINANCE_API_BASE: &str = "https://api.binance.com/api/v3";
const RATE_LIMIT_RPM: u32 = 60;
const MAX_RETRIES: u32 = 3;

// Type alias for the rate limiter to simplify signatures
type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance REST client with rate limiting and bounded retries.
///
/// Cloneable to share across tasks; all clones share one rate limiter.
#[derive(Clone)]
pub struct BinanceMarketData {
    client: Client,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl BinanceMarketData {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Self {
            client,
            rate_limiter,
        })
    }

    /// Rate-limited GET with retry on 429/5xx.
    ///
    /// Client errors (bad symbol, delisted pair) come back as None: the
    /// venue has nothing for us, which is not a failure of this pass.
    async fn make_request(&self, url: &str) -> Result<Option<reqwest::Response>> {
        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(Some(response));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Binance returned {}, backing off for {}s (attempt {}/{})",
                            status,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    if status.is_client_error() {
                        tracing::warn!("Binance rejected request ({}): {}", status, url);
                        return Ok(None);
                    }

                    anyhow::bail!("Binance returned unexpected status {}", status);
                }
                Err(e) => {
                    if attempt == MAX_RETRIES {
                        return Err(e).context("Binance request failed");
                    }
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Binance request error ({}), retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                }
            }
        }

        anyhow::bail!("Binance request retries exhausted")
    }
}

/// Decode kline rows (arrays mixing numbers and stringified decimals).
/// Malformed rows are dropped, not fatal.
fn parse_kline_rows(raw: &serde_json::Value) -> Vec<Bar> {
    let Some(rows) = raw.as_array() else {
        return Vec::new();
    };

    let parse_price = |v: &serde_json::Value| v.as_str().and_then(|s| s.parse::<f64>().ok());

    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(fields) = row.as_array() else {
            continue;
        };
        if fields.len() < 6 {
            continue;
        }
        let Some(open_time_ms) = fields[0].as_i64() else {
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            parse_price(&fields[1]),
            parse_price(&fields[2]),
            parse_price(&fields[3]),
            parse_price(&fields[4]),
            parse_price(&fields[5]),
        ) else {
            continue;
        };

        bars.push(Bar {
            ts: open_time_ms / 1000,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    bars
}

#[async_trait]
impl MarketData for BinanceMarketData {
    async fn get_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Bar>> {
        let url = format!(
            "{}/klines?symbol={}&interval={}&limit={}",
            BINANCE_API_BASE, symbol, timeframe, limit
        );

        let Some(response) = self.make_request(&url).await? else {
            return Ok(Vec::new());
        };

        let raw: serde_json::Value = response
            .json()
            .await
            .context("Failed to decode klines response")?;

        Ok(parse_kline_rows(&raw))
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[async_trait]
impl PriceSource for BinanceMarketData {
    async fn get_price(&self, symbol: &str) -> Result<Option<f64>> {
        let url = format!("{}/ticker/price?symbol={}", BINANCE_API_BASE, symbol);

        let Some(response) = self.make_request(&url).await? else {
            return Ok(None);
        };

        let ticker: TickerPrice = response
            .json()
            .await
            .context("Failed to decode ticker response")?;

        Ok(ticker.price.parse::<f64>().ok())
    }
}
