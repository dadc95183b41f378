//! Per-file orchestration
//!
//! Files are handled one at a time: open, dispatch over a fresh pool,
//! aggregate, then apply the completion policy. A file that cannot be read
//! to the end is reported and left in place; the run moves on.

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::completion::{complete, BatchResult};
use crate::config::LoaderConfig;
use crate::decompression::DecompressionReader;
use crate::discovery::discover;
use crate::platform::SHOULD_TERMINATE;
use crate::pool::{dispatch, WorkerTally};
use crate::stats::RunStats;
use crate::store::{Connector, MemcacheConnector, Sleeper, StoreSettings};

pub struct Loader {
    config: LoaderConfig,
    settings: StoreSettings,
    stop: &'static AtomicBool,
}

impl Loader {
    /// Validate the configuration and prepare a loader using `connector`.
    pub fn new(config: LoaderConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.shards.validate().context("Invalid shard configuration")?;

        let mut settings = StoreSettings::new(connector);
        settings.dry_run = config.store.dry_run;
        settings.retry = config.store.retry;

        Ok(Self {
            config,
            settings,
            stop: &SHOULD_TERMINATE,
        })
    }

    /// Loader talking to real memcached shards
    pub fn with_memcache(config: LoaderConfig) -> Result<Self> {
        let connector = Arc::new(MemcacheConnector::new(config.store.io_timeout));
        Self::new(config, connector)
    }

    /// Flag checked between files; the process-wide signal flag by default
    pub fn with_stop_flag(mut self, stop: &'static AtomicBool) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_sleeper(mut self, sleep: Sleeper) -> Self {
        self.settings.sleep = sleep;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Process every batch matching the configured pattern
    pub fn run(&self) -> Result<RunStats> {
        let started = Instant::now();
        let files = discover(&self.config.input.pattern, self.config.input.file_order)?;

        let mut stats = RunStats {
            files_found: files.len(),
            ..RunStats::default()
        };
        if files.is_empty() {
            info!("No files match {}", self.config.input.pattern);
        }

        for path in files {
            if self.stop.load(Ordering::Relaxed) {
                warn!("Stopping before {}", path.display());
                stats.interrupted = true;
                break;
            }

            info!("Processing {}", path.display());
            match self.load_file(&path) {
                Ok((tally, mut result)) => {
                    // Records are already written; keep their counts even if marking fails
                    if let Err(e) = complete(&mut result, self.config.completion.policy) {
                        error!("Failed to mark {}: {:#}", path.display(), e);
                        stats.record_failure(path.clone(), &e);
                    }
                    stats.record_batch(tally, result);
                }
                Err(e) => {
                    error!("Failed to load {}: {:#}", path.display(), e);
                    stats.record_failure(path, &e);
                }
            }
        }

        stats.elapsed = started.elapsed();
        Ok(stats)
    }

    /// Load one batch file and judge it. The completion policy is applied
    /// by the caller.
    pub fn load_file(&self, path: &Path) -> Result<(WorkerTally, BatchResult)> {
        let started = Instant::now();
        let reader = DecompressionReader::open(path)?;
        let tally = dispatch(reader, &self.config.shards, &self.settings, &self.config.pool)
            .with_context(|| format!("Batch {} aborted", path.display()))?;

        let result = BatchResult::new(
            path,
            &tally,
            self.config.completion.error_threshold,
            started.elapsed(),
        );
        result.log_summary();
        Ok((tally, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionPolicy, Health};
    use crate::config::{FileOrder, ShardMap};
    use crate::store::{Connection, StoreError};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const BATCH: &str = "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23\n\
                         gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424\n\
                         wat\tx\t1\t2\t3\n\
                         idfa\tbroken\t1\n";

    struct NoNetwork;

    impl Connector for NoNetwork {
        fn connect(&self, addr: &str) -> Result<Box<dyn Connection>, StoreError> {
            Err(StoreError::Connect {
                addr: addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            })
        }
    }

    fn config(dir: &TempDir) -> LoaderConfig {
        let mut config = LoaderConfig::default();
        config.input.pattern = dir.path().join("*.tsv").to_string_lossy().to_string();
        config.input.file_order = FileOrder::Name;
        config.store.dry_run = true;
        config.pool.num_workers = 2;
        config.pool.progress_every = 0;
        config
    }

    static NEVER_STOP: AtomicBool = AtomicBool::new(false);
    static ALWAYS_STOP: AtomicBool = AtomicBool::new(true);

    fn loader(config: LoaderConfig) -> Loader {
        Loader::new(config, Arc::new(NoNetwork))
            .unwrap()
            .with_stop_flag(&NEVER_STOP)
            .with_sleeper(Arc::new(|_: Duration| {}))
    }

    #[test]
    fn test_unhealthy_batch_still_marked() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("20170929000000.tsv");
        fs::write(&path, BATCH).unwrap();

        let stats = loader(config(&dir)).run().unwrap();
        assert_eq!(stats.files_found, 1);
        assert_eq!(stats.batches.len(), 1);

        let batch = &stats.batches[0];
        assert_eq!(batch.processed, 2);
        assert_eq!(batch.errors, 1);
        assert_eq!(batch.ratio, Some(0.5));
        assert_eq!(batch.health, Health::Unhealthy);
        assert_eq!(batch.marked, Some(dir.path().join(".20170929000000.tsv")));
        assert!(!path.exists());
    }

    #[test]
    fn test_rerun_is_noop() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.tsv"), BATCH).unwrap();

        let first = loader(config(&dir)).run().unwrap();
        assert_eq!(first.files_found, 1);

        let second = loader(config(&dir)).run().unwrap();
        assert_eq!(second.files_found, 0);
        assert!(second.batches.is_empty());
        assert!(dir.path().join(".a.tsv").exists());
    }

    #[test]
    fn test_keep_policy_leaves_unhealthy_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tsv");
        fs::write(&path, BATCH).unwrap();

        let mut config = config(&dir);
        config.completion.policy = CompletionPolicy::HealthyOnly;
        let stats = loader(config).run().unwrap();

        assert!(stats.batches[0].marked.is_none());
        assert!(path.exists());
    }

    #[test]
    fn test_write_failures_make_batch_unhealthy() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.tsv"), "idfa\ta\t1\t2\t3\ngaid\tb\t1\t2\t3\n").unwrap();

        let mut config = config(&dir);
        config.store.dry_run = false;
        config.store.retry.attempts = 2;
        let stats = loader(config).run().unwrap();

        let batch = &stats.batches[0];
        assert_eq!(batch.processed, 0);
        assert_eq!(batch.errors, 2);
        assert_eq!(batch.health, Health::Undetermined);
    }

    #[test]
    fn test_broken_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("a.tsv");
        // gzip magic followed by garbage
        fs::write(&broken, [0x1F, 0x8B, 0x08, 0x00, 0xFF, 0xFF]).unwrap();
        fs::write(dir.path().join("b.tsv"), BATCH).unwrap();

        let stats = loader(config(&dir)).run().unwrap();
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].path, broken);
        assert_eq!(stats.batches.len(), 1);
        assert!(broken.exists());
        assert!(dir.path().join(".b.tsv").exists());
    }

    #[test]
    fn test_failed_marking_keeps_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tsv");
        fs::write(&path, BATCH).unwrap();
        // A non-empty directory in the way makes the rename fail
        let blocker = dir.path().join(".a.tsv");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();

        let stats = loader(config(&dir)).run().unwrap();

        assert_eq!(stats.batches.len(), 1);
        assert!(stats.batches[0].marked.is_none());
        assert_eq!(stats.totals.processed, 2);
        assert_eq!(stats.totals.errors, 1);
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].path, path);
        assert!(stats.failures[0].error.contains("Failed to rename"));
        assert!(path.exists());
    }

    #[test]
    fn test_stop_flag_checked_between_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.tsv"), BATCH).unwrap();

        let stats = loader(config(&dir)).with_stop_flag(&ALWAYS_STOP).run().unwrap();
        assert!(stats.interrupted);
        assert!(stats.batches.is_empty());
        assert!(dir.path().join("a.tsv").exists());
    }

    #[test]
    fn test_invalid_shards_rejected_up_front() {
        let mut config = LoaderConfig::default();
        config.shards = ShardMap::new();
        assert!(Loader::new(config, Arc::new(NoNetwork)).is_err());
    }
}
