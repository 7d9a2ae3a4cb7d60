pub mod binance;

pub use binance::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Candle, TimeFrame};

/// Source of historical klines.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Candles opening in `[start, end)`, ascending by open time.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: TimeFrame,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Candle>>;
}
