use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kline interval understood by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    M1,   // 1 minute
    M5,   // 5 minutes
    M15,  // 15 minutes
    H1,   // 1 hour
    H4,   // 4 hours
    D1,   // 1 day
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::M1 => "1m",
            TimeFrame::M5 => "5m",
            TimeFrame::M15 => "15m",
            TimeFrame::H1 => "1h",
            TimeFrame::H4 => "4h",
            TimeFrame::D1 => "1d",
        }
    }

    pub fn to_minutes(&self) -> u64 {
        match self {
            TimeFrame::M1 => 1,
            TimeFrame::M5 => 5,
            TimeFrame::M15 => 15,
            TimeFrame::H1 => 60,
            TimeFrame::H4 => 240,
            TimeFrame::D1 => 1440,
        }
    }

    pub fn to_milliseconds(&self) -> i64 {
        self.to_minutes() as i64 * 60 * 1000
    }
}

impl FromStr for TimeFrame {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "1m" | "m1" => Ok(TimeFrame::M1),
            "5m" | "m5" => Ok(TimeFrame::M5),
            "15m" | "m15" => Ok(TimeFrame::M15),
            "1h" | "h1" => Ok(TimeFrame::H1),
            "4h" | "h4" => Ok(TimeFrame::H4),
            "1d" | "d1" => Ok(TimeFrame::D1),
            _ => Err(anyhow::anyhow!("Unknown timeframe: {}", s)),
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!(TimeFrame::from_str("1h").unwrap(), TimeFrame::H1);
        assert_eq!(TimeFrame::from_str("H4").unwrap(), TimeFrame::H4);
        assert!(TimeFrame::from_str("2h").is_err());
    }

    #[test]
    fn test_timeframe_period() {
        assert_eq!(TimeFrame::H1.to_milliseconds(), 3_600_000);
        assert_eq!(TimeFrame::D1.as_str(), "1d");
    }
}
