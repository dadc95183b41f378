use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::completion::{format_elapsed, BatchResult, Health};
use crate::config::StatsFormat;
use crate::pool::WorkerTally;

/// A batch that could not be read to the end
#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch {
    pub path: PathBuf,
    pub error: String,
}

/// Totals for one loader run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub files_found: usize,
    pub totals: WorkerTally,
    pub batches: Vec<BatchResult>,
    pub failures: Vec<FailedBatch>,
    /// Stopped by a signal before every file was handled
    pub interrupted: bool,
    #[serde(serialize_with = "serialize_elapsed")]
    pub elapsed: Duration,
}

fn serialize_elapsed<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_elapsed(*elapsed))
}

impl RunStats {
    pub fn record_batch(&mut self, tally: WorkerTally, result: BatchResult) {
        self.totals += tally;
        self.batches.push(result);
    }

    pub fn record_failure(&mut self, path: PathBuf, error: &anyhow::Error) {
        self.failures.push(FailedBatch {
            path,
            error: format!("{:#}", error),
        });
    }

    pub fn files_processed(&self) -> usize {
        self.batches.len()
    }

    pub fn files_marked(&self) -> usize {
        self.batches.iter().filter(|b| b.marked.is_some()).count()
    }

    pub fn count_health(&self, health: Health) -> usize {
        self.batches.iter().filter(|b| b.health == health).count()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Format statistics for display
    pub fn format_stats(&self) -> String {
        let mut output = format!(
            "Files: {} found, {} processed, {} marked",
            self.files_found,
            self.files_processed(),
            self.files_marked()
        );
        if self.has_failures() {
            output.push_str(&format!(", {} failed", self.failures.len()));
        }
        if self.interrupted {
            output.push_str(" (interrupted)");
        }

        output.push_str(&format!(
            "\nBatches: {} healthy, {} unhealthy, {} undetermined",
            self.count_health(Health::Healthy),
            self.count_health(Health::Unhealthy),
            self.count_health(Health::Undetermined)
        ));

        output.push_str(&format!(
            "\nRecords: {} processed, {} errors ({} unknown device type), {} malformed lines skipped",
            self.totals.processed, self.totals.errors, self.totals.unknown_type, self.totals.dropped
        ));

        let elapsed_ms = self.elapsed.as_millis();
        output.push_str(&format!("\nTime: {}", format_elapsed(self.elapsed)));
        if elapsed_ms > 0 && self.totals.processed > 0 {
            let per_sec = (self.totals.processed as f64 * 1000.0) / elapsed_ms as f64;
            output.push_str(&format!(" ({:.0} records/s)", per_sec));
        }

        for failure in &self.failures {
            output.push_str(&format!("\nFailed: {}: {}", failure.path.display(), failure.error));
        }

        output
    }

    pub fn render(&self, format: StatsFormat) -> Result<String> {
        match format {
            StatsFormat::Table => Ok(self.format_stats()),
            StatsFormat::Json => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}
