//! Worker thread for the batch pool
//!
//! A worker owns one store client per shard and its own tally. Workers
//! never talk to each other; the dispatcher sums their tallies after join.

use crossbeam_channel::Receiver;
use is_terminal::IsTerminal;
use log::{debug, error};
use std::collections::HashMap;
use std::io::Write;

use crate::config::ShardMap;
use crate::payload;
use crate::record::{log_corrections, parse_record};
use crate::store::{SetOutcome, StoreClient, StoreSettings};

use super::types::{RecordOutcome, WorkMessage, WorkerTally};

/// Progress ticks: a dot on an interactive stderr, a debug line otherwise
struct Progress {
    every: u64,
    interactive: bool,
}

impl Progress {
    fn new(every: u64) -> Self {
        Self {
            every,
            interactive: std::io::stderr().is_terminal(),
        }
    }

    fn tick(&self, worker_id: usize, stored: u64) {
        if self.every == 0 || stored % self.every != 0 {
            return;
        }
        if self.interactive {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(b".");
            let _ = stderr.flush();
        } else {
            debug!("Worker {} stored {} records", worker_id, stored);
        }
    }
}

pub struct Worker {
    id: usize,
    clients: HashMap<String, StoreClient>,
    tally: WorkerTally,
    progress: Progress,
}

impl Worker {
    pub fn new(id: usize, shards: &ShardMap, settings: &StoreSettings, progress_every: u64) -> Self {
        let clients = shards
            .iter()
            .map(|(dev_type, addr)| (dev_type.to_string(), settings.client_for(addr)))
            .collect();
        Self {
            id,
            clients,
            tally: WorkerTally::default(),
            progress: Progress::new(progress_every),
        }
    }

    pub fn tally(&self) -> WorkerTally {
        self.tally
    }

    /// Parse, encode and store one line, updating the tally.
    pub fn handle_line(&mut self, line: &str) -> RecordOutcome {
        let outcome = self.store_line(line);
        self.tally.record(&outcome);
        if matches!(outcome, RecordOutcome::Stored) {
            self.progress.tick(self.id, self.tally.processed);
        }
        outcome
    }

    fn store_line(&mut self, line: &str) -> RecordOutcome {
        let parsed = match parse_record(line) {
            Ok(parsed) => parsed,
            Err(reason) => {
                debug!("Skipping line ({}): `{}`", reason, line);
                return RecordOutcome::Dropped(reason);
            }
        };
        log_corrections(line, &parsed.corrections);

        let record = parsed.record;
        let Some(client) = self.clients.get_mut(&record.dev_type) else {
            error!("Unknown device type: {}", record.dev_type);
            return RecordOutcome::UnknownType(record.dev_type);
        };

        let encoded = payload::encode(&record);
        match client.set(&encoded.key, &encoded.bytes) {
            SetOutcome::Stored { .. } | SetOutcome::DryRun => RecordOutcome::Stored,
            SetOutcome::Failed { attempts, error } => {
                error!(
                    "Cannot write to memc {} after {} attempts: {}",
                    client, attempts, error
                );
                RecordOutcome::WriteFailed
            }
        }
    }

    /// Drain `receiver` until `Quit` (or a closed channel), returning the tally.
    pub fn run(mut self, receiver: Receiver<WorkMessage>) -> WorkerTally {
        while let Ok(message) = receiver.recv() {
            match message {
                WorkMessage::Line(line) => {
                    self.handle_line(&line);
                }
                WorkMessage::Quit => break,
            }
        }
        debug!("Worker {} done: {:?}", self.id, self.tally);
        self.tally
    }
}

/// Worker thread entry point
pub(crate) fn worker_thread(
    worker_id: usize,
    receiver: Receiver<WorkMessage>,
    shards: &ShardMap,
    settings: &StoreSettings,
    progress_every: u64,
) -> WorkerTally {
    Worker::new(worker_id, shards, settings, progress_every).run(receiver)
}
