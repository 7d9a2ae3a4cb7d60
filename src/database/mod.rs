use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use crate::types::{PredictionKind, PredictionRecord};

/// Destination of the actual/predicted price rows the dashboard reads.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Writes every record or none of them.
    async fn append(&self, records: &[PredictionRecord]) -> Result<()>;
}

pub struct SqliteMetricsSink {
    pool: SqlitePool,
}

impl SqliteMetricsSink {
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Opening metrics sink at: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open {}", database_url))?;

        let sink = Self { pool };
        sink.create_schema().await?;
        Ok(sink)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time REAL NOT NULL,
                datetime TEXT NOT NULL,
                price REAL NOT NULL,
                type TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_price_predictions_time ON price_predictions(time)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Most recent rows first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<PredictionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT time, price, type FROM price_predictions
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind = match row.get::<String, _>("type").as_str() {
                    "real" => PredictionKind::Real,
                    "predict" => PredictionKind::Predict,
                    other => anyhow::bail!("Unknown prediction type: {}", other),
                };
                Ok(PredictionRecord {
                    time: row.get("time"),
                    price: row.get("price"),
                    kind,
                })
            })
            .collect()
    }
}

#[async_trait]
impl MetricsSink for SqliteMetricsSink {
    async fn append(&self, records: &[PredictionRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            let datetime = record
                .datetime()
                .with_context(|| format!("Record time out of range: {}", record.time))?;
            sqlx::query(
                r#"
                INSERT INTO price_predictions (time, datetime, price, type)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(record.time)
            .bind(datetime.to_rfc3339())
            .bind(record.price)
            .bind(record.kind.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("Appended {} prediction record(s)", records.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_sink() -> (SqliteMetricsSink, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("metrics-sink-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let url = format!("sqlite:{}", dir.join("analytics.db").display());
        (SqliteMetricsSink::connect(&url).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let (sink, dir) = temp_sink().await;
        let records = vec![
            PredictionRecord::real(1_704_067_200_000, 42_000.5),
            PredictionRecord::forecast(1_704_067_200_000, 3_600_000, 42_100.456),
        ];
        sink.append(&records).await.unwrap();

        let stored = sink.recent(10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].kind, PredictionKind::Predict);
        assert_eq!(stored[0].price, 42_100.46);
        assert_eq!(stored[0].time, 1_704_070_800.0);
        assert_eq!(stored[1], records[0]);
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let (sink, dir) = temp_sink().await;
        let good = PredictionRecord::real(1_704_067_200_000, 1.0);
        let bad = PredictionRecord {
            time: f64::MAX,
            price: 2.0,
            kind: PredictionKind::Predict,
        };
        assert!(sink.append(&[good, bad]).await.is_err());
        assert!(sink.recent(10).await.unwrap().is_empty());
        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_schema_creation_is_idempotent() {
        let (sink, dir) = temp_sink().await;
        sink.create_schema().await.unwrap();
        sink.create_schema().await.unwrap();
        std::fs::remove_dir_all(dir).ok();
    }
}
