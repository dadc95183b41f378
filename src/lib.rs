// Core library for the memcload batch loader

pub mod cli;
pub mod completion;
pub mod config;
pub mod config_file;
pub mod decompression;
pub mod discovery;
pub mod loader;
pub mod logging;
pub mod payload;
pub mod platform;
pub mod pool;
pub mod record;
pub mod stats;
pub mod store;

pub use completion::{BatchResult, CompletionPolicy, Health};
pub use config::{LoaderConfig, ShardMap};
pub use loader::Loader;
pub use payload::{decode, encode, EncodedPayload, UserApps};
pub use record::{parse_line, AppsInstalled};
pub use stats::RunStats;
