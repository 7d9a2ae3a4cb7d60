//! Column names of the processed frame. Dashboards and stored snapshots key
//! on these exact strings.

pub const OPEN_TIME: &str = "Open_time";
pub const CLOSE_TIME: &str = "Close_time";
pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";
pub const QUOTE_ASSET_VOLUME: &str = "Quote_asset_volume";
pub const NUMBER_OF_TRADES: &str = "Number_of_trades";
pub const TAKER_BUY_BASE_ASSET_VOLUME: &str = "Taker_buy_base_asset_volume";
pub const TAKER_BUY_BASE_QUOTE_VOLUME: &str = "Taker_buy_base_quote_volume";

pub const EMA: &str = "EMA";
pub const SMA: &str = "SMA";
pub const VWAP: &str = "VWAP";
pub const RSI: &str = "RSI";
pub const DC_DOWN: &str = "DCdown";
pub const DC_UP: &str = "DCup";
pub const DC_MID: &str = "DCmid";
pub const BOLLINGER_BASIS: &str = "BollingerBasis";
pub const BOLLINGER_UPPER: &str = "BollingerUpper";
pub const BOLLINGER_LOWER: &str = "BollingerLower";

pub const TARGET: &str = "target";

/// Model inputs, in the order the design matrix is built.
pub const FEATURE_ROSTER: [&str; 21] = [
    OPEN,
    HIGH,
    LOW,
    CLOSE,
    VOLUME,
    QUOTE_ASSET_VOLUME,
    NUMBER_OF_TRADES,
    TAKER_BUY_BASE_ASSET_VOLUME,
    TAKER_BUY_BASE_QUOTE_VOLUME,
    SMA,
    VWAP,
    DC_DOWN,
    DC_UP,
    DC_MID,
    BOLLINGER_BASIS,
    BOLLINGER_UPPER,
    BOLLINGER_LOWER,
    "Past_trend_Open_2h",
    "Past_trend_Open_3h",
    "Past_trend_Open_2h_flag",
    "Past_trend_Open_3h_flag",
];

/// Raw candle columns, in frame order.
pub const BASE_COLUMNS: [&str; 11] = [
    OPEN_TIME,
    CLOSE_TIME,
    OPEN,
    HIGH,
    LOW,
    CLOSE,
    VOLUME,
    QUOTE_ASSET_VOLUME,
    NUMBER_OF_TRADES,
    TAKER_BUY_BASE_ASSET_VOLUME,
    TAKER_BUY_BASE_QUOTE_VOLUME,
];

pub fn past_trend(hours: usize) -> String {
    format!("Past_trend_Open_{}h", hours)
}

pub fn future_trend(hours: usize) -> String {
    format!("Future_trend_Open_{}h", hours)
}

pub fn flag(column: &str) -> String {
    format!("{}_flag", column)
}

pub fn roster() -> Vec<String> {
    FEATURE_ROSTER.iter().map(|s| s.to_string()).collect()
}
