//! Candle series to feature frame.

pub mod columns;
pub mod frame;

pub use frame::{FeatureFrame, FeatureRow};

use tracing::debug;

use crate::error::FeatureError;
use crate::indicators::{
    bollinger_bands, defined, donchian_channel, future_trend, lagged_ema, lead, past_trend, rsi,
    sma, trend_flag, vwap,
};
use crate::types::{validate_series, Candle, SeriesViolation};

pub const DEFAULT_WINDOW: usize = 4;
/// Smallest window that still yields the 2h and 3h past-trend features.
pub const MIN_WINDOW: usize = 4;

const BOLLINGER_WIDTH: f64 = 2.0;

/// Computes every indicator column for an ordered candle series.
///
/// Output has one row per candle. Positions without enough history or
/// future are undefined; a series shorter than the window simply has no
/// defined window columns.
pub fn generate_features(candles: &[Candle], window: usize) -> Result<FeatureFrame, FeatureError> {
    if window < MIN_WINDOW {
        return Err(FeatureError::InvalidWindow { window, min: MIN_WINDOW });
    }
    validate_series(candles).map_err(|v| match v {
        SeriesViolation::OutOfOrder(i) => FeatureError::UnorderedCandles(i),
        SeriesViolation::Duplicate(i) => FeatureError::DuplicateCandle(i),
    })?;

    let mut frame = FeatureFrame::new(candles.iter().map(|c| c.open_time).collect());
    let field = |f: fn(&Candle) -> f64| -> Vec<f64> { candles.iter().map(f).collect() };

    let opens = field(|c| c.open);
    let closes = field(|c| c.close);
    let volumes = field(|c| c.volume);

    frame.insert(columns::OPEN_TIME, defined(&field(|c| c.open_time as f64)));
    frame.insert(columns::CLOSE_TIME, defined(&field(|c| c.close_time as f64)));
    frame.insert(columns::OPEN, defined(&opens));
    frame.insert(columns::HIGH, defined(&field(|c| c.high)));
    frame.insert(columns::LOW, defined(&field(|c| c.low)));
    frame.insert(columns::CLOSE, defined(&closes));
    frame.insert(columns::VOLUME, defined(&volumes));
    frame.insert(columns::QUOTE_ASSET_VOLUME, defined(&field(|c| c.quote_asset_volume)));
    frame.insert(columns::NUMBER_OF_TRADES, defined(&field(|c| c.number_of_trades as f64)));
    frame.insert(
        columns::TAKER_BUY_BASE_ASSET_VOLUME,
        defined(&field(|c| c.taker_buy_base_asset_volume)),
    );
    frame.insert(
        columns::TAKER_BUY_BASE_QUOTE_VOLUME,
        defined(&field(|c| c.taker_buy_quote_asset_volume)),
    );

    frame.insert(columns::EMA, lagged_ema(&closes, window));
    frame.insert(columns::SMA, sma(&closes, window));
    frame.insert(columns::VWAP, vwap(&field(Candle::typical_price), &volumes, window));
    frame.insert(columns::RSI, rsi(&closes, window));

    let channel = donchian_channel(&closes, window);
    frame.insert(columns::DC_DOWN, channel.lower);
    frame.insert(columns::DC_UP, channel.upper);
    frame.insert(columns::DC_MID, channel.middle);

    let bands = bollinger_bands(&closes, window, BOLLINGER_WIDTH);
    frame.insert(columns::BOLLINGER_BASIS, bands.basis);
    frame.insert(columns::BOLLINGER_UPPER, bands.upper);
    frame.insert(columns::BOLLINGER_LOWER, bands.lower);

    frame.insert(columns::TARGET, lead(&closes));

    for hours in 1..window {
        let future_name = columns::future_trend(hours);
        let future = future_trend(&opens, hours);
        frame.insert(columns::flag(&future_name), trend_flag(&future));
        frame.insert(future_name, future);

        let past_name = columns::past_trend(hours);
        let past = past_trend(&opens, hours);
        frame.insert(columns::flag(&past_name), trend_flag(&past));
        frame.insert(past_name, past);
    }

    debug!(
        "Generated {} columns over {} candles (window {})",
        frame.column_names().count(),
        frame.len(),
        window
    );
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::candle::fixtures::*;

    #[test]
    fn test_ten_candle_frame() {
        let candles = rising_candles(10, 100.0, 1.0);
        let frame = generate_features(&candles, DEFAULT_WINDOW).unwrap();

        assert_eq!(frame.len(), 10);
        for name in columns::FEATURE_ROSTER {
            assert!(frame.column(name).is_some(), "missing {}", name);
        }
        for name in [columns::EMA, columns::RSI, columns::TARGET, columns::OPEN_TIME] {
            assert!(frame.column(name).is_some(), "missing {}", name);
        }
        for h in 1..DEFAULT_WINDOW {
            assert!(frame.column(&columns::future_trend(h)).is_some());
            assert!(frame.column(&columns::flag(&columns::past_trend(h))).is_some());
        }
        assert_eq!(frame.value(9, columns::TARGET), None);
        assert_eq!(frame.value(8, columns::TARGET), Some(candles[9].close));
        assert_eq!(frame.open_times()[0], BASE_TS);
    }

    #[test]
    fn test_window_warm_up_rows() {
        for n in [0, 2, 3, 4, 10] {
            let frame = generate_features(&rising_candles(n, 100.0, 1.0), 4).unwrap();
            let expected = n.min(3);
            for name in [
                columns::SMA,
                columns::DC_UP,
                columns::DC_DOWN,
                columns::BOLLINGER_BASIS,
            ] {
                let series = frame.column(name).unwrap();
                let leading = series.iter().take_while(|v| v.is_none()).count();
                assert_eq!(leading, expected, "{} with {} candles", name, n);
                assert!(series[expected..].iter().all(Option::is_some));
            }
        }
    }

    #[test]
    fn test_roster_has_no_lookahead_columns() {
        for name in columns::FEATURE_ROSTER {
            assert!(!name.starts_with("Future"), "{} looks ahead", name);
            assert_ne!(name, columns::TARGET);
            assert_ne!(name, columns::EMA);
            assert_ne!(name, columns::RSI);
        }
    }

    #[test]
    fn test_roster_columns_defined_after_warm_up() {
        let frame = generate_features(&wavy_candles(12, 30_000.0), 4).unwrap();
        for name in columns::FEATURE_ROSTER {
            for row in 3..12 {
                assert!(frame.value(row, name).is_some(), "{} undefined at {}", name, row);
            }
        }
    }

    #[test]
    fn test_constant_series_is_finite() {
        let mut candles = rising_candles(8, 100.0, 0.0);
        for c in &mut candles {
            c.high = 100.0;
            c.low = 100.0;
        }
        let frame = generate_features(&candles, 4).unwrap();
        assert_eq!(frame.value(5, "Past_trend_Open_3h"), Some(0.0));
        assert_eq!(frame.value(5, "Past_trend_Open_3h_flag"), Some(1.0));
        assert_eq!(frame.value(5, columns::BOLLINGER_UPPER), Some(100.0));
        assert_eq!(frame.value(5, columns::RSI), None);
    }

    #[test]
    fn test_rejects_small_window() {
        let err = generate_features(&rising_candles(10, 100.0, 1.0), 3).unwrap_err();
        assert_eq!(err, FeatureError::InvalidWindow { window: 3, min: 4 });
    }

    #[test]
    fn test_rejects_unordered_candles() {
        let mut candles = rising_candles(5, 100.0, 1.0);
        candles.swap(1, 2);
        assert_eq!(
            generate_features(&candles, 4).unwrap_err(),
            FeatureError::UnorderedCandles(2)
        );
    }

    #[test]
    fn test_empty_series() {
        let frame = generate_features(&[], 4).unwrap();
        assert!(frame.is_empty());
        assert!(frame.column(columns::SMA).unwrap().is_empty());
    }
}
