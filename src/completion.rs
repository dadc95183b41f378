//! Batch verdicts and completion markers
//!
//! A batch is healthy when `errors / processed` stays below the threshold.
//! Processed batches are marked by renaming them to a dot-prefixed name in
//! the same directory.

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use log::{error, info, warn};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pool::WorkerTally;

pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Unhealthy,
    /// Nothing was processed, so there is no ratio to judge
    Undetermined,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Health::Healthy => "healthy",
            Health::Unhealthy => "unhealthy",
            Health::Undetermined => "undetermined",
        })
    }
}

/// Which batches get the completion marker
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Mark every fully read batch, whatever its health
    #[default]
    #[value(name = "archive")]
    Always,
    /// Mark only healthy batches
    #[value(name = "keep")]
    HealthyOnly,
}

impl CompletionPolicy {
    pub fn should_mark(self, health: Health) -> bool {
        match self {
            CompletionPolicy::Always => true,
            CompletionPolicy::HealthyOnly => health == Health::Healthy,
        }
    }
}

/// `errors / processed`, or `None` when nothing was processed
pub fn error_ratio(tally: &WorkerTally) -> Option<f64> {
    (tally.processed > 0).then(|| tally.errors as f64 / tally.processed as f64)
}

pub fn evaluate(ratio: Option<f64>, threshold: f64) -> Health {
    match ratio {
        Some(ratio) if ratio < threshold => Health::Healthy,
        Some(_) => Health::Unhealthy,
        None => Health::Undetermined,
    }
}

/// Outcome of one fully dispatched batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub path: PathBuf,
    pub processed: u64,
    pub errors: u64,
    pub dropped: u64,
    pub ratio: Option<f64>,
    pub health: Health,
    /// New location when the batch was marked complete
    pub marked: Option<PathBuf>,
    #[serde(with = "elapsed_format")]
    pub elapsed: Duration,
}

/// Elapsed time rounded down to milliseconds, e.g. `1s 500ms`
pub fn format_elapsed(elapsed: Duration) -> String {
    humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64)).to_string()
}

mod elapsed_format {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_elapsed(*elapsed))
    }
}

impl BatchResult {
    pub fn new(path: &Path, tally: &WorkerTally, threshold: f64, elapsed: Duration) -> Self {
        let ratio = error_ratio(tally);
        Self {
            path: path.to_path_buf(),
            processed: tally.processed,
            errors: tally.errors,
            dropped: tally.dropped,
            ratio,
            health: evaluate(ratio, threshold),
            marked: None,
            elapsed,
        }
    }

    /// Log the verdict and a one-line summary
    pub fn log_summary(&self) {
        match (self.health, self.ratio) {
            (Health::Healthy, Some(ratio)) => {
                info!("Acceptable error rate ({:.4}). Successful load", ratio)
            }
            (Health::Unhealthy, Some(ratio)) => {
                error!("High error rate ({:.4}). Failed load", ratio)
            }
            _ => warn!("No records processed in {}", self.path.display()),
        }

        let ratio = self
            .ratio
            .map_or_else(|| "n/a".to_string(), |r| format!("{:.4}", r));
        info!(
            "file={} processed={} errors={} dropped={} ratio={} verdict={} elapsed={}",
            self.path.display(),
            self.processed,
            self.errors,
            self.dropped,
            ratio,
            self.health,
            format_elapsed(self.elapsed),
        );
    }
}

/// Rename `path` to `.name` in the same directory and return the new path.
pub fn dot_rename(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?;
    let mut marked_name = std::ffi::OsString::from(".");
    marked_name.push(name);
    let marked = path.with_file_name(marked_name);

    fs::rename(path, &marked)
        .with_context(|| format!("Failed to rename {} to {}", path.display(), marked.display()))?;
    Ok(marked)
}

/// Apply `policy` to a finished batch, renaming it when required.
pub fn complete(result: &mut BatchResult, policy: CompletionPolicy) -> Result<()> {
    if policy.should_mark(result.health) {
        result.marked = Some(dot_rename(&result.path)?);
    } else {
        warn!(
            "Leaving {} in place ({} batch)",
            result.path.display(),
            result.health
        );
    }
    Ok(())
}
