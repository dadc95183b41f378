use anyhow::{anyhow, Result};
use clap::ValueEnum;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::completion::{CompletionPolicy, DEFAULT_ERROR_THRESHOLD};
use crate::pool::PoolConfig;
use crate::store::RetryPolicy;

pub const DEFAULT_PATTERN: &str = "/data/appsinstalled/*.tsv.gz";

/// Device types with a dedicated command-line flag, and their default shards
pub const DEFAULT_SHARDS: [(&str, &str); 4] = [
    ("idfa", "127.0.0.1:33013"),
    ("gaid", "127.0.0.1:33014"),
    ("adid", "127.0.0.1:33015"),
    ("dvid", "127.0.0.1:33016"),
];

/// Main configuration struct for a loader run
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub input: InputConfig,
    pub shards: ShardMap,
    pub store: StoreConfig,
    pub pool: PoolConfig,
    pub completion: CompletionConfig,
    pub output: OutputConfig,
}

/// Input configuration
#[derive(Debug, Clone)]
pub struct InputConfig {
    pub pattern: String,
    pub file_order: FileOrder,
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub dry_run: bool,
    pub retry: RetryPolicy,
    pub io_timeout: Option<Duration>,
}

/// Batch health and completion configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub error_threshold: f64,
    pub policy: CompletionPolicy,
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub log_file: Option<PathBuf>,
    pub stats: bool,
    pub stats_format: StatsFormat,
}

/// Batch processing order
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FileOrder {
    /// Order returned by glob expansion
    #[default]
    Glob,
    Name,
    Mtime,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StatsFormat {
    #[default]
    Table,
    Json,
}

/// Mapping from device type to shard address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardMap {
    endpoints: BTreeMap<String, String>,
}

impl ShardMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four built-in device types on their default local ports
    pub fn with_defaults() -> Self {
        DEFAULT_SHARDS
            .iter()
            .map(|(dev_type, addr)| (dev_type.to_string(), addr.to_string()))
            .collect()
    }

    pub fn insert(&mut self, dev_type: impl Into<String>, addr: impl Into<String>) -> Option<String> {
        self.endpoints.insert(dev_type.into(), addr.into())
    }

    pub fn get(&self, dev_type: &str) -> Option<&str> {
        self.endpoints.get(dev_type).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.endpoints.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Reject an empty map and addresses that are not `host:port`.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(anyhow!("No shards configured"));
        }
        for (dev_type, addr) in &self.endpoints {
            if dev_type.is_empty() || dev_type.chars().any(char::is_whitespace) {
                return Err(anyhow!("Invalid device type '{}'", dev_type));
            }
            validate_addr(addr).map_err(|e| anyhow!("Invalid address for '{}': {}", dev_type, e))?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for ShardMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            endpoints: iter.into_iter().collect(),
        }
    }
}

fn validate_addr(addr: &str) -> Result<()> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("'{}' is not host:port", addr))?;
    if host.is_empty() {
        return Err(anyhow!("'{}' has no host", addr));
    }
    port.parse::<u16>()
        .map_err(|_| anyhow!("'{}' has an invalid port", addr))?;
    Ok(())
}

/// Parse a `TYPE=ADDR` shard argument
pub fn parse_shard_arg(value: &str) -> Result<(String, String), String> {
    let (dev_type, addr) = value
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE=ADDR, got '{}'", value))?;
    let (dev_type, addr) = (dev_type.trim(), addr.trim());
    if dev_type.is_empty() || addr.is_empty() {
        return Err(format!("expected TYPE=ADDR, got '{}'", value));
    }
    Ok((dev_type.to_string(), addr.to_string()))
}

/// Parse an error ratio threshold in `[0, 1]`
pub fn parse_ratio(value: &str) -> Result<f64, String> {
    let ratio: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !(0.0..=1.0).contains(&ratio) {
        return Err(format!("'{}' is outside 0..=1", value));
    }
    Ok(ratio)
}

impl LoaderConfig {
    /// Create configuration from CLI arguments
    pub fn from_cli(cli: &crate::cli::Cli) -> Result<Self> {
        let mut shards = ShardMap::new();
        shards.insert("idfa", cli.idfa.clone());
        shards.insert("gaid", cli.gaid.clone());
        shards.insert("adid", cli.adid.clone());
        shards.insert("dvid", cli.dvid.clone());
        for (dev_type, addr) in &cli.shards {
            shards.insert(dev_type.clone(), addr.clone());
        }
        shards.validate()?;

        if cli.workers == 0 {
            return Err(anyhow!("--workers must be at least 1"));
        }

        Ok(Self {
            input: InputConfig {
                pattern: cli.pattern.clone(),
                file_order: cli.file_order,
            },
            shards,
            store: StoreConfig {
                dry_run: cli.dry,
                retry: RetryPolicy {
                    attempts: cli.attempts.max(1),
                    delay: cli.retry_delay,
                },
                io_timeout: Some(cli.io_timeout).filter(|t| !t.is_zero()),
            },
            pool: PoolConfig {
                num_workers: cli.workers,
                progress_every: cli.progress_every,
                ..PoolConfig::default()
            },
            completion: CompletionConfig {
                error_threshold: cli.error_threshold,
                policy: cli.on_unhealthy,
            },
            output: OutputConfig {
                log_file: cli.log.clone(),
                stats: cli.stats,
                stats_format: cli.stats_format,
            },
        })
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            input: InputConfig {
                pattern: DEFAULT_PATTERN.to_string(),
                file_order: FileOrder::Glob,
            },
            shards: ShardMap::with_defaults(),
            store: StoreConfig {
                dry_run: false,
                retry: RetryPolicy::default(),
                io_timeout: Some(Duration::from_secs(5)),
            },
            pool: PoolConfig::default(),
            completion: CompletionConfig {
                error_threshold: DEFAULT_ERROR_THRESHOLD,
                policy: CompletionPolicy::Always,
            },
            output: OutputConfig {
                log_file: None,
                stats: false,
                stats_format: StatsFormat::Table,
            },
        }
    }
}
