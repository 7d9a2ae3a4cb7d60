//! Hour-partitioned object storage for raw and processed snapshots.

pub mod local;

pub use local::LocalBlobStore;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

const PARTITION_FILE: &str = "data.jsonl";

/// Rows that are partitioned by the hour of their open time.
pub trait Partitioned {
    fn open_time_ms(&self) -> i64;
}

/// Flat key/value object store, S3 style.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<()>;

    /// `None` when the object does not exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;
}

/// `{prefix}/date=YYYY-MM-DD/hour=HH` for the UTC hour containing `time`.
pub fn partition_path(prefix: &str, time: DateTime<Utc>) -> String {
    format!(
        "{}/date={}/hour={}",
        prefix.trim_end_matches('/'),
        time.format("%Y-%m-%d"),
        time.format("%H")
    )
}

fn partition_key(prefix: &str, time: DateTime<Utc>) -> String {
    format!("{}/{}", partition_path(prefix, time), PARTITION_FILE)
}

fn to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .with_context(|| format!("Timestamp out of range: {}", ms))
}

fn hour_floor(time: DateTime<Utc>) -> Result<DateTime<Utc>> {
    Ok(time.duration_trunc(Duration::hours(1))?)
}

/// Groups rows by UTC hour and writes one JSON-lines object per partition,
/// replacing whatever the partition held before.
pub async fn write_partitioned<T>(
    store: &dyn BlobStore,
    bucket: &str,
    prefix: &str,
    rows: &[T],
) -> Result<usize>
where
    T: Serialize + Partitioned + Sync,
{
    let mut partitions: BTreeMap<String, Vec<&T>> = BTreeMap::new();
    for row in rows {
        let key = partition_key(prefix, to_datetime(row.open_time_ms())?);
        partitions.entry(key).or_default().push(row);
    }

    for (key, group) in &partitions {
        let mut body = Vec::new();
        for row in group {
            serde_json::to_writer(&mut body, row)?;
            body.push(b'\n');
        }
        store
            .put(bucket, key, body)
            .await
            .with_context(|| format!("Failed to write {}/{}", bucket, key))?;
        debug!("Wrote {} row(s) to {}/{}", group.len(), bucket, key);
    }

    info!(
        "Wrote {} rows across {} partition(s) under {}/{}",
        rows.len(),
        partitions.len(),
        bucket,
        prefix
    );
    Ok(partitions.len())
}

/// Reads every partition overlapping `[start_ms, end_ms]`, keeps rows inside
/// the range, sorts them and drops repeated open times (last one wins).
pub async fn read_partitioned<T>(
    store: &dyn BlobStore,
    bucket: &str,
    prefix: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<T>>
where
    T: DeserializeOwned + Partitioned,
{
    let mut rows: Vec<T> = Vec::new();
    if end_ms < start_ms {
        return Ok(rows);
    }

    let end = to_datetime(end_ms)?;
    let mut hour = hour_floor(to_datetime(start_ms)?)?;
    while hour <= end {
        let key = partition_key(prefix, hour);
        if let Some(bytes) = store.get(bucket, &key).await? {
            for (line_no, line) in bytes.split(|b| *b == b'\n').enumerate() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                let row: T = serde_json::from_slice(line)
                    .with_context(|| format!("Corrupt row {} in {}/{}", line_no + 1, bucket, key))?;
                let t = row.open_time_ms();
                if (start_ms..=end_ms).contains(&t) {
                    rows.push(row);
                }
            }
        }
        hour += Duration::hours(1);
    }

    // stable sort keeps later copies after earlier ones
    rows.sort_by_key(|r| r.open_time_ms());
    let mut deduped: Vec<T> = Vec::with_capacity(rows.len());
    for row in rows {
        match deduped.last_mut() {
            Some(last) if last.open_time_ms() == row.open_time_ms() => *last = row,
            _ => deduped.push(row),
        }
    }

    debug!("Read {} rows from {}/{}", deduped.len(), bucket, prefix);
    Ok(deduped)
}
