use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::columns::BASE_COLUMNS;
use crate::indicators::Series;
use crate::storage::Partitioned;

/// Column-oriented table with one row per candle, keyed by open time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    open_times: Vec<i64>,
    columns: Vec<(String, Series)>,
}

impl FeatureFrame {
    pub fn new(open_times: Vec<i64>) -> Self {
        Self { open_times, columns: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.open_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open_times.is_empty()
    }

    pub fn open_times(&self) -> &[i64] {
        &self.open_times
    }

    /// Adds a column, replacing any existing column with the same name.
    ///
    /// Panics in debug builds if the length differs from the frame's.
    pub fn insert(&mut self, name: impl Into<String>, values: Series) {
        debug_assert_eq!(values.len(), self.len());
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values,
            None => self.columns.push((name, values)),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Series> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Series)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        self.column(column).and_then(|c| c.get(row).copied().flatten())
    }

    pub fn to_rows(&self) -> Vec<FeatureRow> {
        self.open_times
            .iter()
            .enumerate()
            .map(|(i, &open_time)| FeatureRow {
                open_time,
                values: self
                    .columns
                    .iter()
                    .map(|(name, values)| (name.clone(), values[i]))
                    .collect(),
            })
            .collect()
    }

    /// Rebuilds a frame from stored rows. Raw candle columns come first in
    /// their usual order, the rest alphabetically. A column missing from a
    /// row reads as undefined.
    pub fn from_rows(rows: &[FeatureRow]) -> Self {
        let mut names: Vec<String> = BASE_COLUMNS
            .iter()
            .filter(|c| rows.iter().any(|r| r.values.contains_key(**c)))
            .map(|c| c.to_string())
            .collect();
        let mut extra: Vec<&String> = rows
            .iter()
            .flat_map(|r| r.values.keys())
            .filter(|k| !BASE_COLUMNS.contains(&k.as_str()))
            .collect();
        extra.sort();
        extra.dedup();
        names.extend(extra.into_iter().cloned());

        let mut frame = Self::new(rows.iter().map(|r| r.open_time).collect());
        for name in names {
            let values = rows
                .iter()
                .map(|r| r.values.get(&name).copied().flatten())
                .collect();
            frame.columns.push((name, values));
        }
        frame
    }
}

/// Row-wise form of a frame used for snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub open_time: i64,
    pub values: BTreeMap<String, Option<f64>>,
}

impl Partitioned for FeatureRow {
    fn open_time_ms(&self) -> i64 {
        self.open_time
    }
}
