//! Type definitions for the worker pool
//!
//! Contains the pool configuration, channel messages and per-worker tallies.

use serde::Serialize;
use std::ops::AddAssign;

use crate::record::MalformedLine;

/// Configuration for the per-batch worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub num_workers: usize,
    /// Capacity of each worker channel; 0 makes every send a rendezvous
    pub queue_depth: usize,
    /// Progress tick every N successful writes per worker, 0 disables
    pub progress_every: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_depth: 0,
            progress_every: 1000,
        }
    }
}

/// Message sent from the dispatcher to one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkMessage {
    /// One trimmed, non-empty input line
    Line(String),
    /// No more lines for this batch
    Quit,
}

/// What happened to a single line inside a worker
#[derive(Debug)]
pub enum RecordOutcome {
    /// Written to its shard (or logged in dry-run mode)
    Stored,
    /// Not a record; not an error either
    Dropped(MalformedLine),
    /// Device type has no shard
    UnknownType(String),
    /// Write retries exhausted
    WriteFailed,
}

/// Counters kept by one worker for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerTally {
    pub processed: u64,
    pub errors: u64,
    /// Malformed lines, reported for diagnostics only
    pub dropped: u64,
    /// Records whose device type had no shard; already counted in `errors`
    pub unknown_type: u64,
}

impl WorkerTally {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Stored => self.processed += 1,
            RecordOutcome::Dropped(_) => self.dropped += 1,
            RecordOutcome::UnknownType(_) => {
                self.errors += 1;
                self.unknown_type += 1;
            }
            RecordOutcome::WriteFailed => self.errors += 1,
        }
    }
}

impl AddAssign for WorkerTally {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.errors += other.errors;
        self.dropped += other.dropped;
        self.unknown_type += other.unknown_type;
    }
}

impl std::iter::Sum for WorkerTally {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, tally| {
            acc += tally;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let mut tally = WorkerTally::default();
        tally.record(&RecordOutcome::Stored);
        tally.record(&RecordOutcome::Stored);
        tally.record(&RecordOutcome::Dropped(MalformedLine::TooFewFields(3)));
        tally.record(&RecordOutcome::UnknownType("wat".to_string()));
        tally.record(&RecordOutcome::WriteFailed);

        assert_eq!(
            tally,
            WorkerTally {
                processed: 2,
                errors: 2,
                dropped: 1,
                unknown_type: 1,
            }
        );
    }

    #[test]
    fn test_sum_of_tallies() {
        let tallies = vec![
            WorkerTally {
                processed: 3,
                errors: 1,
                dropped: 0,
                unknown_type: 1,
            },
            WorkerTally {
                processed: 4,
                errors: 0,
                dropped: 2,
                unknown_type: 0,
            },
        ];
        let total: WorkerTally = tallies.into_iter().sum();
        assert_eq!(total.processed, 7);
        assert_eq!(total.errors, 1);
        assert_eq!(total.dropped, 2);
        assert_eq!(total.unknown_type, 1);
    }

    #[test]
    fn test_default_pool() {
        let config = PoolConfig::default();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.queue_depth, 0);
        assert_eq!(config.progress_every, 1000);
    }
}
