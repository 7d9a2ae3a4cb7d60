use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionKind {
    Real,
    Predict,
}

impl PredictionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionKind::Real => "real",
            PredictionKind::Predict => "predict",
        }
    }
}

impl fmt::Display for PredictionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row handed to the metrics sink. `time` is epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub time: f64,
    pub price: f64,
    pub kind: PredictionKind,
}

impl PredictionRecord {
    /// The observed close at the last open time of the series.
    pub fn real(open_time_ms: i64, price: f64) -> Self {
        Self {
            time: open_time_ms as f64 / 1000.0,
            price,
            kind: PredictionKind::Real,
        }
    }

    /// The forecast for one period after the last open time, rounded to cents.
    pub fn forecast(last_open_time_ms: i64, period_ms: i64, price: f64) -> Self {
        Self {
            time: (last_open_time_ms + period_ms) as f64 / 1000.0,
            price: round_price(price),
            kind: PredictionKind::Predict,
        }
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt((self.time * 1000.0).round() as i64).single()
    }
}

/// Rounds to two decimals with banker's rounding; non-representable values pass through.
pub fn round_price(price: f64) -> f64 {
    Decimal::try_from(price)
        .ok()
        .and_then(|d| d.round_dp(2).to_f64())
        .unwrap_or(price)
}
