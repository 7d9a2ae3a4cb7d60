//! Hourly run orchestration: extract, feature generation, model selection,
//! champion arbitration and publishing.

pub mod window;

pub use window::*;

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use chrono::Utc;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::database::{MetricsSink, SqliteMetricsSink};
use crate::error::{DatasetError, PipelineError, Stage, StageExt};
use crate::exchange::{BinanceClient, MarketDataSource};
use crate::features::{columns, generate_features, FeatureFrame, FeatureRow};
use crate::ml::{
    arbitrate, model_candidates, process_input, select_challenger, ChampionStore, Decision,
    Hyperparams, LeaderboardEntry, ModelArtifact, ModelKind, RegressionMetrics, SqliteChampionStore,
    StandardScaler,
};
use crate::profiling::write_profile_report;
use crate::storage::{read_partitioned, write_partitioned, BlobStore, LocalBlobStore};
use crate::types::{normalize_series, Candle, PredictionRecord};

/// Which steps a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RunMode {
    /// Extract, transform, then train and publish.
    Full,
    /// Fetch candles and store raw partitions only.
    Extract,
    /// Rebuild features from stored raw partitions.
    Transform,
    /// Train and publish from stored feature partitions.
    Train,
}

/// What one training step decided and published.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub challenger: ModelKind,
    pub challenger_params: Hyperparams,
    pub challenger_metrics: RegressionMetrics,
    pub winner: ModelKind,
    pub winner_metrics: RegressionMetrics,
    pub decision: Decision,
    pub is_new_champion: bool,
    /// Slot version after the run, `None` if the slot is still empty.
    pub champion_version: Option<i64>,
    pub records: Vec<PredictionRecord>,
    /// Best point of every algorithm that fit, in roster order.
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    pub window: RunWindow,
    pub candles: usize,
    pub feature_rows: usize,
    pub profile_report: Option<PathBuf>,
    pub training: Option<TrainingReport>,
}

impl RunReport {
    fn new(mode: RunMode, window: RunWindow) -> Self {
        Self {
            mode,
            window,
            candles: 0,
            feature_rows: 0,
            profile_report: None,
            training: None,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    source: Box<dyn MarketDataSource>,
    blobs: Box<dyn BlobStore>,
    champions: Box<dyn ChampionStore>,
    sink: Box<dyn MetricsSink>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Box<dyn MarketDataSource>,
        blobs: Box<dyn BlobStore>,
        champions: Box<dyn ChampionStore>,
        sink: Box<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            source,
            blobs,
            champions,
            sink,
        }
    }

    /// Wires the production collaborators described by `config`.
    pub async fn from_config(config: PipelineConfig) -> anyhow::Result<Self> {
        let source = BinanceClient::new(&config.market.base_url, config.market.requests_per_second);
        let blobs = LocalBlobStore::new(&config.storage.root);
        let champions =
            SqliteChampionStore::connect(&config.models.database_url, &config.models.models_dir)
                .await
                .context("Failed to open model registry")?;
        let sink = SqliteMetricsSink::connect(&config.sink.database_url)
            .await
            .context("Failed to open metrics sink")?;

        Ok(Self::new(
            config,
            Box::new(source),
            Box::new(blobs),
            Box::new(champions),
            Box::new(sink),
        ))
    }

    pub fn champions(&self) -> &dyn ChampionStore {
        self.champions.as_ref()
    }

    pub async fn run(&self, mode: RunMode, window: RunWindow) -> Result<RunReport, PipelineError> {
        info!("Starting {:?} run over {}", mode, window);
        let mut report = RunReport::new(mode, window);

        match mode {
            RunMode::Extract => {
                report.candles = self.extract(window).await?.len();
            }
            RunMode::Transform => {
                let candles = self.load_raw(window).await?;
                report.candles = candles.len();
                let (frame, profile) = self.transform(&candles).await?;
                report.feature_rows = frame.len();
                report.profile_report = profile;
            }
            RunMode::Train => {
                let frame = self.load_processed(window).await?;
                report.feature_rows = frame.len();
                report.training = Some(self.train_and_publish(&frame).await?);
            }
            RunMode::Full => {
                self.extract(window).await?;
                // Reading back picks up partitions written by earlier runs too.
                let candles = self.load_raw(window).await?;
                report.candles = candles.len();
                let (frame, profile) = self.transform(&candles).await?;
                report.feature_rows = frame.len();
                report.profile_report = profile;
                report.training = Some(self.train_and_publish(&frame).await?);
            }
        }

        info!(
            "Run finished: {} candle(s), {} feature row(s)",
            report.candles, report.feature_rows
        );
        Ok(report)
    }

    /// Fetches the window's candles and stores them as raw hourly partitions.
    pub async fn extract(&self, window: RunWindow) -> Result<Vec<Candle>, PipelineError> {
        info!("=== Extract ===");
        let interval = self.config.market.interval().stage(Stage::Fetch)?;
        let fetched = self
            .source
            .fetch_candles(&self.config.market.symbol, interval, window.start, window.end)
            .await
            .with_context(|| format!("Failed to fetch {} candles", self.config.market.symbol))
            .stage(Stage::Fetch)?;

        let candles = normalize_series(fetched);
        if candles.is_empty() {
            return Err(PipelineError::new(
                Stage::Fetch,
                anyhow!("No candles returned for {}", window),
            ));
        }
        info!("Fetched {} candle(s)", candles.len());

        let storage = &self.config.storage;
        write_partitioned(self.blobs.as_ref(), &storage.bucket, &storage.raw_prefix, &candles)
            .await
            .stage(Stage::Persist)?;
        Ok(candles)
    }

    pub async fn load_raw(&self, window: RunWindow) -> Result<Vec<Candle>, PipelineError> {
        let storage = &self.config.storage;
        read_partitioned(
            self.blobs.as_ref(),
            &storage.bucket,
            &storage.raw_prefix,
            window.start_ms(),
            window.last_ms(),
        )
        .await
        .stage(Stage::Fetch)
    }

    /// Builds the feature frame, stores it as processed partitions and writes
    /// a column profile next to it.
    pub async fn transform(
        &self,
        candles: &[Candle],
    ) -> Result<(FeatureFrame, Option<PathBuf>), PipelineError> {
        info!("=== Transform ===");
        let frame = generate_features(candles, self.config.features.window).stage(Stage::Features)?;
        info!("Generated {} column(s) over {} row(s)", frame.columns().count(), frame.len());

        let storage = &self.config.storage;
        let rows = frame.to_rows();
        write_partitioned(self.blobs.as_ref(), &storage.bucket, &storage.processed_prefix, &rows)
            .await
            .stage(Stage::Persist)?;

        let name = format!("features_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let profile = match write_profile_report(&frame, &storage.reports_dir, &name) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping feature profile: {:#}", e);
                None
            }
        };

        Ok((frame, profile))
    }

    pub async fn load_processed(&self, window: RunWindow) -> Result<FeatureFrame, PipelineError> {
        let storage = &self.config.storage;
        let rows: Vec<FeatureRow> = read_partitioned(
            self.blobs.as_ref(),
            &storage.bucket,
            &storage.processed_prefix,
            window.start_ms(),
            window.last_ms(),
        )
        .await
        .stage(Stage::Fetch)?;
        Ok(FeatureFrame::from_rows(&rows))
    }

    /// Selects a challenger, arbitrates it against the stored champion,
    /// forecasts the next period with the winner and appends both records
    /// to the sink.
    pub async fn train_and_publish(&self, frame: &FeatureFrame) -> Result<TrainingReport, PipelineError> {
        info!("=== Train ===");
        let training = &self.config.training;
        let window = self.config.features.window;

        let needed = self.config.min_candles();
        if frame.len() < needed {
            return Err(PipelineError::new(
                Stage::Training,
                DatasetError::InsufficientRows { needed, got: frame.len() },
            ));
        }

        let set = process_input(frame, &columns::roster(), columns::TARGET, window).stage(Stage::Training)?;
        let (fit, validation) = set.split_holdout(training.validation_fraction).stage(Stage::Training)?;
        if fit.len() < training.folds {
            return Err(PipelineError::new(
                Stage::Training,
                DatasetError::InsufficientRows { needed: training.folds, got: fit.len() },
            ));
        }
        info!(
            "Training on {} row(s), holding out {} for validation",
            fit.len(),
            validation.len()
        );

        let scaler = StandardScaler::fit(&fit.x).stage(Stage::Training)?;
        let scaled = scaler.transform(&fit.x).stage(Stage::Training)?;
        let selection = select_challenger(&model_candidates(training.seed), &scaled, &fit.y, training.folds)
            .stage(Stage::Training)?;

        let leaderboard = selection.leaderboard();
        let best = selection.into_challenger();
        let holdout_predictions = scaler
            .transform(&validation.x)
            .and_then(|x| best.model.predict(&x))
            .stage(Stage::Training)?;
        let holdout_metrics =
            RegressionMetrics::evaluate(&validation.y.to_vec(), &holdout_predictions).stage(Stage::Training)?;

        let challenger = ModelArtifact {
            model_name: best.kind,
            params: best.params,
            regressor: best.model,
            scaler,
            feature_names: set.feature_names.clone(),
            metrics: holdout_metrics,
            cv_mse: best.cv_mse,
            trained_at: Utc::now(),
        };
        info!("Challenger {} hold-out: {}", challenger.model_name, challenger.metrics);

        if let Err(e) = self.champions.save_challenger(&training.slot, &challenger).await {
            warn!("Failed to archive challenger: {:#}", e);
        }

        info!("=== Arbitrate ===");
        let (champion, expected_version) = self.current_champion(&training.slot).await?;
        let challenger_kind = challenger.model_name;
        let challenger_params = challenger.params.clone();
        let challenger_metrics = challenger.metrics;
        let outcome = arbitrate(challenger, champion, &validation.x, &validation.y);

        let forecast = outcome.winner.predict_one(&set.live_row).stage(Stage::Arbitration)?;
        let live_close = frame
            .value(frame.len() - 1, columns::CLOSE)
            .ok_or_else(|| DatasetError::UndefinedValue {
                column: columns::CLOSE.to_string(),
                row: frame.len() - 1,
            })
            .stage(Stage::Training)?;
        let period_ms = self
            .config
            .market
            .interval()
            .stage(Stage::Training)?
            .to_milliseconds();

        let records = vec![
            PredictionRecord::real(set.live_open_time, live_close),
            PredictionRecord::forecast(set.live_open_time, period_ms, forecast),
        ];

        let champion_version = if outcome.is_new_champion {
            let version = self
                .champions
                .save_champion(&training.slot, &outcome.winner, expected_version)
                .await
                .stage(Stage::Persist)?;
            info!("{} is champion of '{}' at version {}", outcome.winner_name, training.slot, version);
            Some(version)
        } else {
            expected_version
        };

        info!(
            "Close {:.2}, next-period forecast {:.2} from {}",
            records[0].price, records[1].price, outcome.winner_name
        );
        self.sink.append(&records).await.stage(Stage::Persist)?;

        Ok(TrainingReport {
            challenger: challenger_kind,
            challenger_params,
            challenger_metrics,
            winner: outcome.winner_name,
            winner_metrics: outcome.winner_metrics,
            decision: outcome.decision,
            is_new_champion: outcome.is_new_champion,
            champion_version,
            records,
            leaderboard,
        })
    }

    /// Loads the slot's champion. An unreadable artifact is treated as
    /// missing but its version is kept so the replacement still goes
    /// through the version check.
    async fn current_champion(
        &self,
        slot: &str,
    ) -> Result<(Option<ModelArtifact>, Option<i64>), PipelineError> {
        match self.champions.load_champion(slot).await {
            Ok(Some(stored)) => Ok((Some(stored.artifact), Some(stored.version))),
            Ok(None) => Ok((None, None)),
            Err(e) => {
                warn!("Stored champion for '{}' is unreadable: {:#}", slot, e);
                let record = self
                    .champions
                    .champion_record(slot)
                    .await
                    .stage(Stage::Arbitration)?;
                Ok((None, record.map(|r| r.version)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockMarketDataSource;
    use crate::types::candle::fixtures::*;
    use crate::types::PredictionKind;
    use chrono::TimeZone;
    use std::path::Path;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pipeline-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn test_config(dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.storage.root = dir.join("data").display().to_string();
        config.storage.reports_dir = dir.join("reports").display().to_string();
        config.models.database_url = format!("sqlite:{}", dir.join("models.db").display());
        config.models.models_dir = dir.join("models").display().to_string();
        config.sink.database_url = format!("sqlite:{}", dir.join("analytics.db").display());
        config
    }

    fn test_window(n: usize) -> RunWindow {
        let start = Utc.timestamp_millis_opt(BASE_TS).unwrap();
        let end = Utc.timestamp_millis_opt(BASE_TS + n as i64 * HOUR_MS).unwrap();
        RunWindow::new(start, end).unwrap()
    }

    async fn pipeline_with(dir: &Path, source: MockMarketDataSource) -> Pipeline {
        pipeline_with_config(test_config(dir), source).await
    }

    async fn pipeline_with_config(config: PipelineConfig, source: MockMarketDataSource) -> Pipeline {
        let champions =
            SqliteChampionStore::connect(&config.models.database_url, &config.models.models_dir)
                .await
                .unwrap();
        let sink = SqliteMetricsSink::connect(&config.sink.database_url).await.unwrap();
        let blobs = LocalBlobStore::new(&config.storage.root);
        Pipeline::new(
            config,
            Box::new(source),
            Box::new(blobs),
            Box::new(champions),
            Box::new(sink),
        )
    }

    fn serving(candles: Vec<Candle>) -> MockMarketDataSource {
        let mut source = MockMarketDataSource::new();
        source
            .expect_fetch_candles()
            .returning(move |_, _, _, _| Ok(candles.clone()));
        source
    }

    async fn published(dir: &Path) -> Vec<PredictionRecord> {
        let url = format!("sqlite:{}", dir.join("analytics.db").display());
        SqliteMetricsSink::connect(&url).await.unwrap().recent(100).await.unwrap()
    }

    #[tokio::test]
    async fn test_full_run_publishes_close_and_forecast() {
        let dir = temp_dir();
        let candles = wavy_candles(72, 42_000.0);
        let last = candles.last().unwrap().clone();
        let pipeline = pipeline_with(&dir, serving(candles)).await;

        let report = pipeline.run(RunMode::Full, test_window(72)).await.unwrap();
        assert_eq!(report.candles, 72);
        assert_eq!(report.feature_rows, 72);
        assert!(report.profile_report.unwrap().exists());

        let training = report.training.unwrap();
        assert!(training.is_new_champion);
        assert_eq!(training.decision, Decision::Bootstrap);
        assert_eq!(training.champion_version, Some(1));
        let kinds: Vec<ModelKind> = training.leaderboard.iter().map(|e| e.kind).collect();
        assert!(!kinds.is_empty());
        let roster_order: Vec<ModelKind> =
            ModelKind::ALL.into_iter().filter(|k| kinds.contains(k)).collect();
        assert_eq!(kinds, roster_order);
        assert!(kinds.contains(&training.challenger));

        let records = published(&dir).await;
        assert_eq!(records.len(), 2);
        let real = records.iter().find(|r| r.kind == PredictionKind::Real).unwrap();
        let predicted = records.iter().find(|r| r.kind == PredictionKind::Predict).unwrap();
        assert_eq!(real.time, last.open_time as f64 / 1000.0);
        assert_eq!(predicted.time, real.time + 3600.0);
        assert!(predicted.price.is_finite());

        let stored = pipeline.champions().load_champion("btc_hourly").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.artifact.model_name, training.winner);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_second_run_competes_with_champion() {
        let dir = temp_dir();
        let pipeline = pipeline_with(&dir, serving(wavy_candles(72, 42_000.0))).await;

        pipeline.run(RunMode::Full, test_window(72)).await.unwrap();
        let second = pipeline.run(RunMode::Full, test_window(72)).await.unwrap();

        let training = second.training.unwrap();
        assert!(matches!(
            training.decision,
            Decision::Promote { .. } | Decision::KeepChampion { .. }
        ));
        let expected_version = if training.is_new_champion { 2 } else { 1 };
        assert_eq!(training.champion_version, Some(expected_version));
        assert_eq!(published(&dir).await.len(), 4);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_fetch_failure_publishes_nothing() {
        let dir = temp_dir();
        let mut source = MockMarketDataSource::new();
        source
            .expect_fetch_candles()
            .times(1)
            .returning(|_, _, _, _| Err(anyhow!("connection refused")));
        let pipeline = pipeline_with(&dir, source).await;

        let err = pipeline.run(RunMode::Full, test_window(72)).await.unwrap_err();
        assert_eq!(err.stage, Stage::Fetch);
        assert!(published(&dir).await.is_empty());
        assert!(pipeline.champions().load_champion("btc_hourly").await.unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_short_history_fails_in_training() {
        let dir = temp_dir();
        let pipeline = pipeline_with(&dir, serving(wavy_candles(5, 42_000.0))).await;

        let err = pipeline.run(RunMode::Full, test_window(5)).await.unwrap_err();
        assert_eq!(err.stage, Stage::Training);
        assert!(published(&dir).await.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_staged_modes_share_partitions() {
        let dir = temp_dir();
        let pipeline = pipeline_with(&dir, serving(wavy_candles(72, 42_000.0))).await;
        let window = test_window(72);

        let extracted = pipeline.run(RunMode::Extract, window).await.unwrap();
        assert_eq!(extracted.candles, 72);
        assert!(extracted.training.is_none());

        let transformed = pipeline.run(RunMode::Transform, window).await.unwrap();
        assert_eq!(transformed.feature_rows, 72);
        assert!(published(&dir).await.is_empty());

        let trained = pipeline.run(RunMode::Train, window).await.unwrap();
        assert_eq!(trained.feature_rows, 72);
        assert_eq!(trained.training.unwrap().records.len(), 2);
        assert_eq!(published(&dir).await.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failed_publish_leaves_champion_slot_untouched() {
        let dir = temp_dir();
        let window = test_window(72);
        let staging = pipeline_with(&dir, serving(wavy_candles(72, 42_000.0))).await;
        staging.run(RunMode::Extract, window).await.unwrap();
        staging.run(RunMode::Transform, window).await.unwrap();

        // Unknown interval: the forecast timestamp cannot be computed.
        let mut config = test_config(&dir);
        config.market.interval = "7h".to_string();
        let pipeline = pipeline_with_config(config, MockMarketDataSource::new()).await;

        let err = pipeline.run(RunMode::Train, window).await.unwrap_err();
        assert_eq!(err.stage, Stage::Training);
        assert!(pipeline.champions().load_champion("btc_hourly").await.unwrap().is_none());
        assert!(published(&dir).await.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
