//! Per-shard store clients
//!
//! Each worker owns one [`StoreClient`] per shard. A client starts
//! disconnected, connects on first use and drops its connection after any
//! failed write so the next attempt reconnects from scratch.
//!
//! # Module Structure
//!
//! - `retry`: bounded retry combinator with a fixed delay
//! - `memcache`: memcached text protocol over TCP

pub mod memcache;
pub mod retry;

use log::debug;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use memcache::MemcacheConnector;
pub use retry::RetryPolicy;

use retry::retry;

/// Longest key memcached accepts
pub const MAX_KEY_LEN: usize = 250;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("i/o error on {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("{addr} rejected write: {reply}")]
    Rejected { addr: String, reply: String },
    #[error("{addr} closed the connection")]
    Closed { addr: String },
}

/// An open link to one shard
pub trait Connection: Send {
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// Opens connections to shard addresses
pub trait Connector: Send + Sync {
    fn connect(&self, addr: &str) -> Result<Box<dyn Connection>, StoreError>;
}

/// Sleep function used between retry attempts
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

fn thread_sleeper() -> Sleeper {
    Arc::new(std::thread::sleep)
}

/// Outcome of a single `set` call
#[derive(Debug)]
pub enum SetOutcome {
    Stored { attempts: u32 },
    DryRun,
    Failed { attempts: u32, error: StoreError },
}

impl SetOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, SetOutcome::Failed { .. })
    }
}

enum ConnState {
    Disconnected,
    Connected(Box<dyn Connection>),
}

enum Mode {
    Live(Arc<dyn Connector>),
    DryRun,
}

/// Retrying client for one shard address
pub struct StoreClient {
    addr: String,
    mode: Mode,
    state: ConnState,
    policy: RetryPolicy,
    sleep: Sleeper,
}

impl StoreClient {
    pub fn new(addr: &str, connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        Self {
            addr: addr.to_string(),
            mode: Mode::Live(connector),
            state: ConnState::Disconnected,
            policy,
            sleep: thread_sleeper(),
        }
    }

    /// A client that logs writes instead of sending them.
    pub fn dry_run(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            mode: Mode::DryRun,
            state: ConnState::Disconnected,
            policy: RetryPolicy::default(),
            sleep: thread_sleeper(),
        }
    }

    pub fn with_sleeper(mut self, sleep: Sleeper) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnState::Connected(_))
    }

    /// Write `value` under `key`, retrying per the client's policy.
    pub fn set(&mut self, key: &str, value: &[u8]) -> SetOutcome {
        let connector = match &self.mode {
            Mode::DryRun => {
                debug!("{} - {} -> {}", self.addr, key, value.escape_ascii());
                return SetOutcome::DryRun;
            }
            Mode::Live(connector) => Arc::clone(connector),
        };

        if let Err(error) = validate_key(key) {
            return SetOutcome::Failed { attempts: 0, error };
        }

        let policy = self.policy;
        let sleep = Arc::clone(&self.sleep);
        match retry(
            &policy,
            |_| self.try_set(connector.as_ref(), key, value),
            |delay| sleep(delay),
        ) {
            Ok(done) => SetOutcome::Stored {
                attempts: done.attempts,
            },
            Err(exhausted) => SetOutcome::Failed {
                attempts: exhausted.attempts,
                error: exhausted.last_error,
            },
        }
    }

    fn try_set(&mut self, connector: &dyn Connector, key: &str, value: &[u8]) -> Result<(), StoreError> {
        // Stays Disconnected unless the write goes through
        let mut conn = match std::mem::replace(&mut self.state, ConnState::Disconnected) {
            ConnState::Connected(conn) => conn,
            ConnState::Disconnected => connector.connect(&self.addr)?,
        };
        conn.set(key, value)?;
        self.state = ConnState::Connected(conn);
        Ok(())
    }
}

impl std::fmt::Display for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// Check a key against memcached's key rules.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let reason = if key.is_empty() {
        Some("empty key")
    } else if key.len() > MAX_KEY_LEN {
        Some("longer than 250 bytes")
    } else if key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        Some("contains whitespace or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Everything a worker needs to build its per-shard clients
#[derive(Clone)]
pub struct StoreSettings {
    pub dry_run: bool,
    pub retry: RetryPolicy,
    pub connector: Arc<dyn Connector>,
    pub sleep: Sleeper,
}

impl StoreSettings {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            dry_run: false,
            retry: RetryPolicy::default(),
            connector,
            sleep: thread_sleeper(),
        }
    }

    pub fn client_for(&self, addr: &str) -> StoreClient {
        if self.dry_run {
            StoreClient::dry_run(addr)
        } else {
            StoreClient::new(addr, Arc::clone(&self.connector), self.retry)
                .with_sleeper(Arc::clone(&self.sleep))
        }
    }
}
