use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::MarketDataSource;
use crate::types::{normalize_series, Candle, TimeFrame};

pub const BINANCE_API: &str = "https://api.binance.com";
const KLINE_PAGE_LIMIT: usize = 1000;

/// Public market-data client for the Binance REST API.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BinanceClient {
    pub fn new(base_url: impl Into<String>, requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Fetches one page of at most 1000 klines starting at `start_ms`.
    async fn get_klines_page(
        &self,
        symbol: &str,
        interval: TimeFrame,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&startTime={}&endTime={}&limit={}",
            self.base_url,
            symbol,
            interval.as_str(),
            start_ms,
            end_ms,
            KLINE_PAGE_LIMIT
        );

        self.limiter.until_ready().await;
        debug!("GET {}", url);
        let resp: Vec<Vec<Value>> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Kline request failed for {}", symbol))?
            .json()
            .await?;

        resp.iter().map(|k| parse_kline(k)).collect()
    }

    /// Fetches candles between two instants, paging through the 1000-row
    /// limit of the klines endpoint.
    pub async fn get_historical_candles(
        &self,
        symbol: &str,
        interval: TimeFrame,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let mut all_candles = Vec::new();
        let mut current_start = start_time.timestamp_millis();
        // endTime is inclusive on the exchange side
        let end_millis = end_time.timestamp_millis() - 1;

        info!(
            "Fetching {} {} candles from {} to {}",
            symbol, interval, start_time, end_time
        );

        while current_start <= end_millis {
            let candles = self
                .get_klines_page(symbol, interval, current_start, end_millis)
                .await?;
            let batch_len = candles.len();

            match candles.last() {
                Some(last) => current_start = last.close_time + 1,
                None => break,
            }
            all_candles.extend(candles);

            if batch_len < KLINE_PAGE_LIMIT {
                break;
            }
        }

        let all_candles = normalize_series(all_candles);
        info!("Fetched {} candles for {}", all_candles.len(), symbol);
        Ok(all_candles)
    }
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        self.get_historical_candles(symbol, interval, start, end).await
    }
}

fn int_field(k: &[Value], idx: usize) -> Result<i64> {
    k.get(idx)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow!("Kline field {} is not an integer", idx))
}

fn count_field(k: &[Value], idx: usize) -> Result<u64> {
    k.get(idx)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| anyhow!("Kline field {} is not a count", idx))
}

fn num_field(k: &[Value], idx: usize) -> Result<f64> {
    let raw = k
        .get(idx)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("Kline field {} is missing", idx))?;
    raw.parse::<f64>()
        .with_context(|| format!("Kline field {} is not a number: {}", idx, raw))
}

/// Decodes one kline array:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume,
///   trades, taker_base_volume, taker_quote_volume, ignore]`.
pub fn parse_kline(k: &[Value]) -> Result<Candle> {
    Ok(Candle {
        open_time: int_field(k, 0)?,
        open: num_field(k, 1)?,
        high: num_field(k, 2)?,
        low: num_field(k, 3)?,
        close: num_field(k, 4)?,
        volume: num_field(k, 5)?,
        close_time: int_field(k, 6)?,
        quote_asset_volume: num_field(k, 7)?,
        number_of_trades: count_field(k, 8)?,
        taker_buy_base_asset_volume: num_field(k, 9)?,
        taker_buy_quote_asset_volume: num_field(k, 10)?,
    })
}
