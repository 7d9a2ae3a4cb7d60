use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, DurationRound, NaiveDateTime, TimeZone, Utc};

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Half-open time range `[start, end)` a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RunWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(anyhow!("Window start {} is not before end {}", start, end));
        }
        Ok(Self { start, end })
    }

    /// The `hours` hours before `end`.
    pub fn lookback(end: DateTime<Utc>, hours: u32) -> Result<Self> {
        Self::new(end - Duration::hours(i64::from(hours)), end)
    }

    /// Lookback window ending at the start of the current UTC hour.
    pub fn latest(hours: u32) -> Result<Self> {
        Self::lookback(current_hour()?, hours)
    }

    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// Last millisecond inside the window.
    pub fn last_ms(&self) -> i64 {
        self.end.timestamp_millis() - 1
    }
}

impl fmt::Display for RunWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format(DATETIME_FORMAT),
            self.end.format(DATETIME_FORMAT)
        )
    }
}

pub fn current_hour() -> Result<DateTime<Utc>> {
    Ok(Utc::now().duration_trunc(Duration::hours(1))?)
}

/// Parses `YYYY-MM-DD HH:MM:SS` as UTC.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), DATETIME_FORMAT)
        .map_err(|e| anyhow!("Invalid datetime '{}' (expected YYYY-MM-DD HH:MM:SS): {}", s, e))?;
    Ok(Utc.from_utc_datetime(&naive))
}
