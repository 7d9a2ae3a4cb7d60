use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::arbiter::ModelArtifact;
use super::metrics::RegressionMetrics;
use super::models::ModelKind;

/// A champion together with the slot version it was read at.
#[derive(Debug)]
pub struct VersionedArtifact {
    pub version: i64,
    pub artifact: ModelArtifact,
}

/// Slot metadata, readable without loading the model file.
#[derive(Debug, Clone)]
pub struct ChampionRecord {
    pub slot: String,
    pub version: i64,
    pub model_name: ModelKind,
    pub trained_at: DateTime<Utc>,
    pub metrics: RegressionMetrics,
    pub model_path: PathBuf,
}

/// The slot moved on since it was read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("champion slot '{slot}' is at version {actual:?}, expected {expected:?}")]
pub struct VersionConflict {
    pub slot: String,
    pub expected: Option<i64>,
    pub actual: Option<i64>,
}

#[async_trait]
pub trait ChampionStore: Send + Sync {
    async fn load_champion(&self, slot: &str) -> Result<Option<VersionedArtifact>>;

    /// Replaces the champion if the slot is still at `expected_version`
    /// (`None` for an empty slot) and returns the new version. Fails with
    /// [`VersionConflict`] otherwise.
    async fn save_champion(
        &self,
        slot: &str,
        artifact: &ModelArtifact,
        expected_version: Option<i64>,
    ) -> Result<i64>;

    /// Appends to the slot's challenger archive.
    async fn save_challenger(&self, slot: &str, artifact: &ModelArtifact) -> Result<i64>;

    async fn champion_record(&self, slot: &str) -> Result<Option<ChampionRecord>>;
}

/// SQLite metadata plus one bincode file per stored model.
pub struct SqliteChampionStore {
    pool: SqlitePool,
    models_dir: PathBuf,
}

impl SqliteChampionStore {
    pub async fn connect(database_url: &str, models_dir: impl Into<PathBuf>) -> Result<Self> {
        info!("Opening champion store at: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open {}", database_url))?;

        let store = Self {
            pool,
            models_dir: models_dir.into(),
        };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS champion_slots (
                slot TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                model_name TEXT NOT NULL,
                trained_at TEXT NOT NULL,
                metrics_json TEXT NOT NULL,
                model_path TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS challengers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slot TEXT NOT NULL,
                model_name TEXT NOT NULL,
                trained_at TEXT NOT NULL,
                archived_at TEXT NOT NULL,
                metrics_json TEXT NOT NULL,
                model_path TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_challengers_slot ON challengers(slot)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn slot_dir(&self, slot: &str) -> PathBuf {
        self.models_dir.join(slot)
    }

    async fn current_version(&self, slot: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT version FROM champion_slots WHERE slot = ?")
            .bind(slot)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("version")))
    }

    pub async fn list_challengers(&self, slot: &str) -> Result<Vec<(ModelKind, RegressionMetrics)>> {
        let rows = sqlx::query(
            "SELECT model_name, metrics_json FROM challengers WHERE slot = ? ORDER BY id",
        )
        .bind(slot)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(ModelKind, RegressionMetrics)> {
                let name: String = row.get("model_name");
                let metrics_json: String = row.get("metrics_json");
                Ok((ModelKind::from_str(&name)?, serde_json::from_str(&metrics_json)?))
            })
            .collect()
    }
}

/// Writes `bytes` next to `path` and renames it into place.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

#[async_trait]
impl ChampionStore for SqliteChampionStore {
    async fn load_champion(&self, slot: &str) -> Result<Option<VersionedArtifact>> {
        let Some(record) = self.champion_record(slot).await? else {
            return Ok(None);
        };
        let bytes = std::fs::read(&record.model_path)
            .with_context(|| format!("Champion file missing: {}", record.model_path.display()))?;
        let artifact = ModelArtifact::from_bytes(&bytes)?;
        info!(
            "Loaded champion {} v{} for slot '{}'",
            artifact.model_name, record.version, slot
        );
        Ok(Some(VersionedArtifact {
            version: record.version,
            artifact,
        }))
    }

    async fn save_champion(
        &self,
        slot: &str,
        artifact: &ModelArtifact,
        expected_version: Option<i64>,
    ) -> Result<i64> {
        let new_version = expected_version.unwrap_or(0) + 1;
        let model_path = self
            .slot_dir(slot)
            .join(format!("champion_v{}_{}.bin", new_version, Uuid::new_v4().simple()));
        write_atomically(&model_path, &artifact.to_bytes()?)?;

        let metrics_json = serde_json::to_string(&artifact.metrics)?;
        let path_str = model_path.to_string_lossy().to_string();
        let previous = self.champion_record(slot).await?;

        let result = match expected_version {
            Some(expected) => {
                sqlx::query(
                    r#"
                    UPDATE champion_slots
                    SET version = ?, model_name = ?, trained_at = ?, metrics_json = ?, model_path = ?
                    WHERE slot = ? AND version = ?
                    "#,
                )
                .bind(new_version)
                .bind(artifact.model_name.as_str())
                .bind(artifact.trained_at.to_rfc3339())
                .bind(&metrics_json)
                .bind(&path_str)
                .bind(slot)
                .bind(expected)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO champion_slots (slot, version, model_name, trained_at, metrics_json, model_path)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(slot) DO NOTHING
                    "#,
                )
                .bind(slot)
                .bind(new_version)
                .bind(artifact.model_name.as_str())
                .bind(artifact.trained_at.to_rfc3339())
                .bind(&metrics_json)
                .bind(&path_str)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            if let Err(e) = std::fs::remove_file(&model_path) {
                warn!("Failed to remove orphaned {}: {}", model_path.display(), e);
            }
            return Err(VersionConflict {
                slot: slot.to_string(),
                expected: expected_version,
                actual: self.current_version(slot).await?,
            }
            .into());
        }

        if let Some(previous) = previous.filter(|p| p.version == expected_version.unwrap_or(0)) {
            if let Err(e) = std::fs::remove_file(&previous.model_path) {
                warn!("Failed to remove replaced {}: {}", previous.model_path.display(), e);
            }
        }

        info!(
            "Saved {} as champion v{} for slot '{}' at {}",
            artifact.model_name,
            new_version,
            slot,
            model_path.display()
        );
        Ok(new_version)
    }

    async fn save_challenger(&self, slot: &str, artifact: &ModelArtifact) -> Result<i64> {
        let archived_at = Utc::now();
        let model_path = self.slot_dir(slot).join("challengers").join(format!(
            "{}_{}_{}.bin",
            archived_at.format("%Y%m%dT%H%M%S"),
            artifact.model_name.as_str().to_lowercase(),
            Uuid::new_v4().simple()
        ));
        write_atomically(&model_path, &artifact.to_bytes()?)?;

        let result = sqlx::query(
            r#"
            INSERT INTO challengers (slot, model_name, trained_at, archived_at, metrics_json, model_path)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(slot)
        .bind(artifact.model_name.as_str())
        .bind(artifact.trained_at.to_rfc3339())
        .bind(archived_at.to_rfc3339())
        .bind(serde_json::to_string(&artifact.metrics)?)
        .bind(model_path.to_string_lossy().to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn champion_record(&self, slot: &str) -> Result<Option<ChampionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT slot, version, model_name, trained_at, metrics_json, model_path
            FROM champion_slots
            WHERE slot = ?
            "#,
        )
        .bind(slot)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let model_name: String = row.get("model_name");
                let trained_at: String = row.get("trained_at");
                let metrics_json: String = row.get("metrics_json");
                Ok(Some(ChampionRecord {
                    slot: row.get("slot"),
                    version: row.get("version"),
                    model_name: ModelKind::from_str(&model_name)
                        .map_err(|e| anyhow!("Corrupt champion slot '{}': {}", slot, e))?,
                    trained_at: DateTime::parse_from_rfc3339(&trained_at)?.with_timezone(&Utc),
                    metrics: serde_json::from_str(&metrics_json)?,
                    model_path: PathBuf::from(row.get::<String, _>("model_path")),
                }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::arbiter::tests::artifact;

    async fn temp_store() -> (SqliteChampionStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("champion-store-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let url = format!("sqlite:{}", dir.join("models.db").display());
        let store = SqliteChampionStore::connect(&url, dir.join("models")).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_empty_slot_has_no_champion() {
        let (store, dir) = temp_store().await;
        assert!(store.load_champion("btc").await.unwrap().is_none());
        assert!(store.champion_record("btc").await.unwrap().is_none());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_save_and_load_champion() {
        let (store, dir) = temp_store().await;
        let version = store.save_champion("btc", &artifact(1.0, 0.4), None).await.unwrap();
        assert_eq!(version, 1);

        let loaded = store.load_champion("btc").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.artifact.model_name, ModelKind::Ridge);
        assert_eq!(loaded.artifact.metrics.rmse, 0.4);

        let version = store.save_champion("btc", &artifact(2.0, 0.3), Some(1)).await.unwrap();
        assert_eq!(version, 2);
        let record = store.champion_record("btc").await.unwrap().unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.metrics.rmse, 0.3);
        assert!(record.model_path.exists());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let (store, dir) = temp_store().await;
        store.save_champion("btc", &artifact(1.0, 0.4), None).await.unwrap();

        let err = store.save_champion("btc", &artifact(1.0, 0.2), None).await.unwrap_err();
        let conflict = err.downcast_ref::<VersionConflict>().unwrap();
        assert_eq!(conflict.actual, Some(1));

        let err = store.save_champion("btc", &artifact(1.0, 0.2), Some(7)).await.unwrap_err();
        assert!(err.downcast_ref::<VersionConflict>().is_some());

        // The incumbent is untouched.
        let loaded = store.load_champion("btc").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.artifact.metrics.rmse, 0.4);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_challengers_are_appended() {
        let (store, dir) = temp_store().await;
        store.save_challenger("btc", &artifact(0.0, 0.5)).await.unwrap();
        store.save_challenger("btc", &artifact(0.0, 0.6)).await.unwrap();
        store.save_challenger("eth", &artifact(0.0, 0.7)).await.unwrap();

        let archived = store.list_challengers("btc").await.unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(archived[1].1.rmse, 0.6);
        assert!(store.load_champion("btc").await.unwrap().is_none());
        std::fs::remove_dir_all(dir).ok();
    }
}
