//! Per-column summary of a processed frame, written as CSV for inspection.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::features::FeatureFrame;
use crate::indicators::{mean, stddev};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProfile {
    pub name: String,
    pub count: usize,
    pub undefined: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

pub fn profile_frame(frame: &FeatureFrame) -> Vec<ColumnProfile> {
    frame
        .columns()
        .map(|(name, values)| {
            let defined: Vec<f64> = values.iter().flatten().copied().collect();
            ColumnProfile {
                name: name.to_string(),
                count: values.len(),
                undefined: values.len() - defined.len(),
                mean: mean(&defined),
                std: stddev(&defined),
                min: defined.iter().copied().reduce(f64::min),
                max: defined.iter().copied().reduce(f64::max),
            }
        })
        .collect()
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

pub fn write_profile_csv(profiles: &[ColumnProfile], mut out: impl Write) -> Result<()> {
    writeln!(out, "column,count,undefined,mean,std,min,max")?;
    for p in profiles {
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            p.name,
            p.count,
            p.undefined,
            cell(p.mean),
            cell(p.std),
            cell(p.min),
            cell(p.max)
        )?;
    }
    out.flush()?;
    Ok(())
}

/// Writes `{reports_dir}/{name}.csv` and returns its path.
pub fn write_profile_report(frame: &FeatureFrame, reports_dir: impl AsRef<Path>, name: &str) -> Result<PathBuf> {
    let dir = reports_dir.as_ref();
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{}.csv", name));

    let file = std::fs::File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_profile_csv(&profile_frame(frame), std::io::BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("Profile of {} columns written to {}", frame.column_names().count(), path.display());
    Ok(path)
}
