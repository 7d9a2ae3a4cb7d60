use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::features::{DEFAULT_WINDOW, MIN_WINDOW};
use crate::types::TimeFrame;

/// Prefix of environment overrides, e.g. `BTC_PIPELINE__TRAINING__FOLDS=5`.
pub const ENV_PREFIX: &str = "BTC_PIPELINE";
pub const DEFAULT_CONFIG_PATH: &str = "pipeline.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub market: MarketSettings,
    pub storage: StorageSettings,
    pub features: FeatureSettings,
    pub training: TrainingSettings,
    pub models: ModelStoreSettings,
    pub sink: SinkSettings,
    pub logging: LoggingSettings,
}

impl PipelineConfig {
    /// Layers environment variables over an optional TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Invalid configuration values")
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Smallest candle count a training run can work with.
    pub fn min_candles(&self) -> usize {
        self.training.folds.max(self.features.window + 2)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.market.symbol.trim().is_empty() {
            errors.push("market.symbol must not be empty".to_string());
        }
        if self.market.interval().is_err() {
            errors.push(format!("market.interval '{}' is not a known interval", self.market.interval));
        }
        if self.market.requests_per_second == 0 {
            errors.push("market.requests_per_second must be > 0".to_string());
        }
        if !self.market.base_url.starts_with("http") {
            errors.push("market.base_url must be an http(s) URL".to_string());
        }

        if self.features.window < MIN_WINDOW {
            errors.push(format!("features.window must be >= {}", MIN_WINDOW));
        }

        if self.training.folds < 2 {
            errors.push("training.folds must be >= 2".to_string());
        }
        if !(self.training.validation_fraction > 0.0 && self.training.validation_fraction < 1.0) {
            errors.push("training.validation_fraction must be between 0 and 1".to_string());
        }
        if self.training.slot.is_empty() || self.training.slot.contains(['/', '\\']) {
            errors.push("training.slot must be a plain, non-empty name".to_string());
        }
        if (self.training.lookback_hours as usize) < self.min_candles() {
            errors.push(format!(
                "training.lookback_hours must cover at least {} candles",
                self.min_candles()
            ));
        }

        if self.storage.bucket.is_empty() {
            errors.push("storage.bucket must not be empty".to_string());
        }
        if self.storage.raw_prefix == self.storage.processed_prefix {
            errors.push("storage.raw_prefix and storage.processed_prefix must differ".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub base_url: String,
    pub symbol: String,
    pub interval: String,
    pub requests_per_second: u32,
}

impl MarketSettings {
    pub fn interval(&self) -> Result<TimeFrame> {
        self.interval.parse()
    }
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            base_url: crate::exchange::BINANCE_API.to_string(),
            symbol: "BTCUSDT".to_string(),
            interval: "1h".to_string(),
            requests_per_second: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub root: String,
    pub bucket: String,
    pub raw_prefix: String,
    pub processed_prefix: String,
    pub reports_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: "./data".to_string(),
            bucket: "btc-prediction".to_string(),
            raw_prefix: "raw".to_string(),
            processed_prefix: "processed".to_string(),
            reports_dir: "./reports".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    pub window: usize,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self { window: DEFAULT_WINDOW }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub folds: usize,
    pub validation_fraction: f64,
    pub seed: u64,
    /// Champion slot the run competes for.
    pub slot: String,
    pub lookback_hours: u32,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            folds: 3,
            validation_fraction: 0.2,
            seed: 42,
            slot: "btc_hourly".to_string(),
            lookback_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelStoreSettings {
    pub database_url: String,
    pub models_dir: String,
}

impl Default for ModelStoreSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./models.db".to_string(),
            models_dir: "./models".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub database_url: String,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./analytics.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub json: bool,
}
