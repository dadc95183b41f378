// Command-line interface definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::completion::CompletionPolicy;
use crate::config::{parse_ratio, parse_shard_arg, FileOrder, StatsFormat, DEFAULT_PATTERN};

#[derive(Parser, Debug)]
#[command(name = "memcload")]
#[command(about = "Load device-install batches into sharded memcached")]
#[command(
    long_about = "Load device-install batches into sharded memcached\n\nEach line of a batch file is `dev_type<TAB>dev_id<TAB>lat<TAB>lon<TAB>apps`.\nRecords are encoded as protobuf and written to the shard for their device type.\nProcessed files are renamed with a leading dot so later runs skip them.\n\nCOMMON EXAMPLES:\n  memcload --pattern '/data/appsinstalled/*.tsv.gz'\n  memcload --dry --pattern 'sample/*.tsv.gz'\n  memcload --shard oaid=10.0.0.7:11211 -w 8 -s"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Glob pattern for batch files
    #[arg(long = "pattern", default_value = DEFAULT_PATTERN, help_heading = "Input Options")]
    pub pattern: String,

    /// Order in which matched batch files are processed
    #[arg(
        long = "file-order",
        value_enum,
        default_value_t = FileOrder::Glob,
        help_heading = "Input Options"
    )]
    pub file_order: FileOrder,

    /// Shard address for idfa devices
    #[arg(long = "idfa", default_value = "127.0.0.1:33013", help_heading = "Shard Options")]
    pub idfa: String,

    /// Shard address for gaid devices
    #[arg(long = "gaid", default_value = "127.0.0.1:33014", help_heading = "Shard Options")]
    pub gaid: String,

    /// Shard address for adid devices
    #[arg(long = "adid", default_value = "127.0.0.1:33015", help_heading = "Shard Options")]
    pub adid: String,

    /// Shard address for dvid devices
    #[arg(long = "dvid", default_value = "127.0.0.1:33016", help_heading = "Shard Options")]
    pub dvid: String,

    /// Additional or overriding shard as TYPE=ADDR (repeatable)
    #[arg(
        long = "shard",
        value_name = "TYPE=ADDR",
        value_parser = parse_shard_arg,
        help_heading = "Shard Options"
    )]
    pub shards: Vec<(String, String)>,

    /// Log writes instead of sending them (raises log level to debug)
    #[arg(long = "dry", help_heading = "Store Options")]
    pub dry: bool,

    /// Write attempts per record, including the first
    #[arg(long = "attempts", default_value_t = 10, help_heading = "Store Options")]
    pub attempts: u32,

    /// Pause between write attempts
    #[arg(
        long = "retry-delay",
        default_value = "1s",
        value_parser = humantime::parse_duration,
        help_heading = "Store Options"
    )]
    pub retry_delay: Duration,

    /// Connect, read and write timeout for shard connections (0 disables)
    #[arg(
        long = "io-timeout",
        default_value = "5s",
        value_parser = humantime::parse_duration,
        help_heading = "Store Options"
    )]
    pub io_timeout: Duration,

    /// Number of worker threads per batch
    #[arg(short = 'w', long = "workers", default_value_t = 4, help_heading = "Performance Options")]
    pub workers: usize,

    /// Progress tick every N successful writes per worker (0 disables)
    #[arg(
        long = "progress-every",
        default_value_t = 1000,
        help_heading = "Performance Options"
    )]
    pub progress_every: u64,

    /// Largest acceptable errors/processed ratio for a healthy batch
    #[arg(
        long = "error-threshold",
        default_value = "0.01",
        value_parser = parse_ratio,
        help_heading = "Completion Options"
    )]
    pub error_threshold: f64,

    /// What to do with a batch that is not healthy
    #[arg(
        long = "on-unhealthy",
        value_enum,
        default_value_t = CompletionPolicy::Always,
        help_heading = "Completion Options",
        help = "What to do with a batch that is not healthy.\n\narchive: rename it like any other processed batch\nkeep:    leave it in place for the next run"
    )]
    pub on_unhealthy: CompletionPolicy,

    /// Log file (stderr when omitted)
    #[arg(short = 'l', long = "log", help_heading = "Output Options")]
    pub log: Option<PathBuf>,

    /// Print run statistics at exit
    #[arg(short = 's', long = "stats", help_heading = "Output Options")]
    pub stats: bool,

    /// Disable run statistics explicitly (default: off)
    #[arg(long = "no-stats", help_heading = "Output Options", overrides_with = "stats")]
    pub no_stats: bool,

    /// Run statistics format
    #[arg(
        long = "stats-format",
        value_enum,
        default_value_t = StatsFormat::Table,
        help_heading = "Output Options"
    )]
    pub stats_format: StatsFormat,

    /// Run the payload round-trip self test and exit
    #[arg(short = 't', long = "test")]
    pub test: bool,

    /// Specify custom configuration file path
    #[arg(long = "config-file", help_heading = "Configuration Options")]
    pub config_file: Option<String>,

    /// Ignore configuration file
    #[arg(long = "ignore-config", help_heading = "Configuration Options")]
    pub ignore_config: bool,

    /// Show configuration file and exit
    #[arg(long = "show-config", help_heading = "Configuration Options")]
    pub show_config: bool,
}

impl Cli {
    /// Resolve inverted boolean flags to their actual values
    pub fn resolve_boolean_flags(&mut self) {
        if self.no_stats {
            self.stats = false;
        }
    }
}
