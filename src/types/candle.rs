use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::Partitioned;

/// One exchange OHLCV interval. Times are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_asset_volume: f64,
    pub number_of_trades: u64,
    pub taker_buy_base_asset_volume: f64,
    pub taker_buy_quote_asset_volume: f64,
}

impl Candle {
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// High/low must bracket open and close.
    pub fn is_consistent(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

impl Partitioned for Candle {
    fn open_time_ms(&self) -> i64 {
        self.open_time
    }
}

/// Ordering problems found while validating a candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesViolation {
    /// `open_time` at this index is not greater than the previous one.
    OutOfOrder(usize),
    /// `open_time` at this index repeats the previous one.
    Duplicate(usize),
}

/// Checks that open times are strictly increasing.
///
/// Inconsistent OHLC bars are only logged: the exchange is the source of
/// truth for prices and a single odd bar should not sink a run.
pub fn validate_series(candles: &[Candle]) -> Result<(), SeriesViolation> {
    for (i, pair) in candles.windows(2).enumerate() {
        let idx = i + 1;
        if pair[1].open_time == pair[0].open_time {
            return Err(SeriesViolation::Duplicate(idx));
        }
        if pair[1].open_time < pair[0].open_time {
            return Err(SeriesViolation::OutOfOrder(idx));
        }
    }

    let inconsistent = candles.iter().filter(|c| !c.is_consistent()).count();
    if inconsistent > 0 {
        warn!("{} candle(s) have high/low outside open/close", inconsistent);
    }

    Ok(())
}

/// Sorts by open time and drops repeated open times, keeping the last copy.
pub fn normalize_series(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.open_time);
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match out.last_mut() {
            Some(last) if last.open_time == candle.open_time => *last = candle,
            _ => out.push(candle),
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Candle;

    pub const HOUR_MS: i64 = 3_600_000;
    pub const BASE_TS: i64 = 1_704_067_200_000; // 2024-01-01T00:00:00Z

    /// Hourly candles whose open and close rise by `step` every period.
    pub fn rising_candles(n: usize, start: f64, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let open = start + step * i as f64;
                let close = open + step * 0.5;
                Candle {
                    open_time: BASE_TS + i as i64 * HOUR_MS,
                    close_time: BASE_TS + (i as i64 + 1) * HOUR_MS - 1,
                    open,
                    high: close + 1.0,
                    low: open - 1.0,
                    close,
                    volume: 10.0 + i as f64,
                    quote_asset_volume: (10.0 + i as f64) * close,
                    number_of_trades: 100 + i as u64,
                    taker_buy_base_asset_volume: 5.0,
                    taker_buy_quote_asset_volume: 5.0 * close,
                }
            })
            .collect()
    }

    /// Hourly candles following a deterministic oscillation around `level`.
    pub fn wavy_candles(n: usize, level: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                let open = level + 40.0 * (t * 0.7).sin() + 3.0 * t;
                let close = level + 40.0 * ((t + 1.0) * 0.7).sin() + 3.0 * (t + 1.0);
                Candle {
                    open_time: BASE_TS + i as i64 * HOUR_MS,
                    close_time: BASE_TS + (i as i64 + 1) * HOUR_MS - 1,
                    open,
                    high: open.max(close) + 5.0 + (t * 1.3).cos().abs(),
                    low: open.min(close) - 5.0 - (t * 0.9).sin().abs(),
                    close,
                    volume: 100.0 + 20.0 * (t * 0.4).cos(),
                    quote_asset_volume: (100.0 + 20.0 * (t * 0.4).cos()) * close,
                    number_of_trades: 1_000 + (i % 7) as u64 * 13,
                    taker_buy_base_asset_volume: 50.0 + 10.0 * (t * 0.3).sin(),
                    taker_buy_quote_asset_volume: (50.0 + 10.0 * (t * 0.3).sin()) * close,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_validate_series_accepts_ascending() {
        let candles = rising_candles(5, 100.0, 1.0);
        assert!(validate_series(&candles).is_ok());
        assert!(validate_series(&[]).is_ok());
    }

    #[test]
    fn test_validate_series_rejects_duplicates_and_disorder() {
        let mut candles = rising_candles(4, 100.0, 1.0);
        candles[2].open_time = candles[1].open_time;
        assert_eq!(validate_series(&candles), Err(SeriesViolation::Duplicate(2)));

        let mut candles = rising_candles(4, 100.0, 1.0);
        candles.swap(2, 3);
        assert_eq!(validate_series(&candles), Err(SeriesViolation::OutOfOrder(3)));
    }

    #[test]
    fn test_normalize_series_sorts_and_dedups() {
        let mut candles = rising_candles(3, 100.0, 1.0);
        let mut replacement = candles[1].clone();
        replacement.close = 999.0;
        candles.reverse();
        candles.push(replacement);

        let normalized = normalize_series(candles);
        assert_eq!(normalized.len(), 3);
        assert!(normalized.windows(2).all(|w| w[0].open_time < w[1].open_time));
        assert_eq!(normalized[1].close, 999.0);
    }

    #[test]
    fn test_typical_price() {
        let candle = &rising_candles(1, 100.0, 2.0)[0];
        // high = 102, low = 99, close = 101
        assert!((candle.typical_price() - 302.0 / 3.0).abs() < 1e-12);
    }
}
