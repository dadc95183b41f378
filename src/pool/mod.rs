//! Worker pool for one batch file
//!
//! Every batch gets a fresh set of worker threads. The dispatcher feeds
//! them round-robin over per-worker rendezvous channels, and each worker
//! returns its own tally when it sees the `Quit` sentinel.
//!
//! # Module Structure
//!
//! - `types`: pool configuration, channel messages and tallies
//! - `worker`: worker thread that parses, encodes and stores lines
//! - `dispatcher`: reads the batch, fans lines out and joins the pool

mod dispatcher;
mod types;
mod worker;

pub use dispatcher::dispatch;
pub use types::{PoolConfig, RecordOutcome, WorkMessage, WorkerTally};
pub use worker::Worker;
