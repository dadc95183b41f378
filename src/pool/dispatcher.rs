//! Batch dispatcher
//!
//! Streams one batch round-robin over a fresh set of workers, then sends
//! every worker the `Quit` sentinel and joins them.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Sender};
use log::debug;
use std::io::BufRead;
use std::thread;

use crate::config::ShardMap;
use crate::record::trim_line;
use crate::store::StoreSettings;

use super::types::{PoolConfig, WorkMessage, WorkerTally};
use super::worker::worker_thread;

/// Process every line of `reader` and return the summed worker tallies.
///
/// A read error still shuts the pool down cleanly before it is returned.
pub fn dispatch<R: BufRead>(
    reader: R,
    shards: &ShardMap,
    settings: &StoreSettings,
    pool: &PoolConfig,
) -> Result<WorkerTally> {
    let num_workers = pool.num_workers.max(1);

    thread::scope(|scope| -> Result<WorkerTally> {
        let mut senders = Vec::with_capacity(num_workers);
        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let (sender, receiver) = bounded(pool.queue_depth);
            let handle = thread::Builder::new()
                .name(format!("memcload-worker-{}", worker_id))
                .spawn_scoped(scope, move || {
                    worker_thread(worker_id, receiver, shards, settings, pool.progress_every)
                })
                .context("Failed to spawn worker thread")?;
            senders.push(sender);
            handles.push(handle);
        }

        let fed = feed(reader, &senders);
        for sender in &senders {
            // A worker that already exited has dropped its receiver
            let _ = sender.send(WorkMessage::Quit);
        }
        drop(senders);

        let mut total = WorkerTally::default();
        let mut panicked = Vec::new();
        for (worker_id, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(tally) => total += tally,
                Err(_) => panicked.push(worker_id),
            }
        }

        if let Some(worker_id) = panicked.first() {
            return Err(anyhow!("Worker thread {} panicked", worker_id));
        }
        let lines = fed?;
        debug!("Dispatched {} lines to {} workers", lines, num_workers);
        Ok(total)
    })
}

/// Send each non-empty line, stripped of spaces and line endings, to worker `i mod W`.
fn feed<R: BufRead>(mut reader: R, senders: &[Sender<WorkMessage>]) -> Result<u64> {
    let mut buf = Vec::new();
    let mut sent: u64 = 0;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .context("Failed to read batch")?;
        if read == 0 {
            return Ok(sent);
        }

        let line = String::from_utf8_lossy(&buf);
        let line = trim_line(&line);
        if line.is_empty() {
            continue;
        }

        let worker_id = (sent % senders.len() as u64) as usize;
        senders[worker_id]
            .send(WorkMessage::Line(line.to_string()))
            .map_err(|_| anyhow!("Worker {} stopped before the batch ended", worker_id))?;
        sent += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Connection, Connector, StoreError};
    use std::io::{BufReader, Cursor, Read};
    use std::sync::{Arc, Mutex};

    /// Remembers which worker thread stored which key
    #[derive(Default)]
    struct ThreadRecorder {
        writes: Arc<Mutex<Vec<(String, String)>>>,
    }

    struct ThreadRecorderConnection {
        writes: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl Connection for ThreadRecorderConnection {
        fn set(&mut self, key: &str, _value: &[u8]) -> Result<(), StoreError> {
            if key.ends_with(":boom") {
                panic!("connection exploded");
            }
            let thread = thread::current().name().unwrap_or("?").to_string();
            self.writes.lock().unwrap().push((key.to_string(), thread));
            Ok(())
        }
    }

    impl Connector for ThreadRecorder {
        fn connect(&self, _addr: &str) -> Result<Box<dyn Connection>, StoreError> {
            Ok(Box::new(ThreadRecorderConnection {
                writes: Arc::clone(&self.writes),
            }))
        }
    }

    fn pool(num_workers: usize) -> PoolConfig {
        PoolConfig {
            num_workers,
            progress_every: 0,
            ..PoolConfig::default()
        }
    }

    /// Yields `data`, then fails.
    struct FailingReader {
        data: Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt deflate stream")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_four_line_batch() {
        let input = "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23\n\
                     gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424\n\
                     wat\tx\t1\t2\t3\n\
                     idfa\tbroken\t1\n";
        let mut settings = StoreSettings::new(Arc::new(ThreadRecorder::default()));
        settings.dry_run = true;

        let tally = dispatch(Cursor::new(input), &ShardMap::with_defaults(), &settings, &pool(2)).unwrap();
        assert_eq!(tally.processed, 2);
        assert_eq!(tally.errors, 1);
        assert_eq!(tally.unknown_type, 1);
        assert_eq!(tally.dropped, 1);
    }

    #[test]
    fn test_round_robin_skips_empty_lines() {
        let input = "idfa\ta\t1\t2\t3\n\n   \ngaid\tb\t1\t2\t3\r\nadid\tc\t1\t2\t3\n\ndvid\td\t1\t2\t3";
        let connector = Arc::new(ThreadRecorder::default());
        let writes = Arc::clone(&connector.writes);
        let settings = StoreSettings::new(connector);

        let tally = dispatch(Cursor::new(input), &ShardMap::with_defaults(), &settings, &pool(3)).unwrap();
        assert_eq!(tally.processed, 4);

        let mut writes = writes.lock().unwrap().clone();
        writes.sort();
        assert_eq!(
            writes,
            vec![
                ("adid:c".to_string(), "memcload-worker-2".to_string()),
                ("dvid:d".to_string(), "memcload-worker-0".to_string()),
                ("gaid:b".to_string(), "memcload-worker-1".to_string()),
                ("idfa:a".to_string(), "memcload-worker-0".to_string()),
            ]
        );
    }

    #[test]
    fn test_leading_tab_survives_dispatch() {
        let input = "\tidfa\t1.0\t2.0\t3\textra\nadid\tc\t1\t2\t\n";
        let connector = Arc::new(ThreadRecorder::default());
        let writes = Arc::clone(&connector.writes);
        let settings = StoreSettings::new(connector);

        let tally = dispatch(Cursor::new(input), &ShardMap::with_defaults(), &settings, &pool(2)).unwrap();
        assert_eq!(tally.dropped, 1);
        assert_eq!(tally.processed, 1);
        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "adid:c");
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let input: &[u8] = b"idfa\tdev\xff\t1\t2\t3\n";
        let connector = Arc::new(ThreadRecorder::default());
        let writes = Arc::clone(&connector.writes);
        let settings = StoreSettings::new(connector);

        let tally = dispatch(input, &ShardMap::with_defaults(), &settings, &pool(1)).unwrap();
        assert_eq!(tally.processed, 1);
        assert_eq!(writes.lock().unwrap()[0].0, "idfa:dev\u{FFFD}");
    }

    #[test]
    fn test_empty_input() {
        let mut settings = StoreSettings::new(Arc::new(ThreadRecorder::default()));
        settings.dry_run = true;
        let tally = dispatch(Cursor::new(""), &ShardMap::with_defaults(), &settings, &pool(4)).unwrap();
        assert_eq!(tally, WorkerTally::default());
    }

    #[test]
    fn test_read_error_after_join() {
        let reader = BufReader::new(FailingReader {
            data: Cursor::new(b"idfa\ta\t1\t2\t3\ngaid\tb\t1\t2\t3\n".to_vec()),
        });
        let connector = Arc::new(ThreadRecorder::default());
        let writes = Arc::clone(&connector.writes);
        let settings = StoreSettings::new(connector);

        let err = dispatch(reader, &ShardMap::with_defaults(), &settings, &pool(2)).unwrap_err();
        assert!(format!("{:#}", err).contains("corrupt deflate stream"));
        // Lines read before the failure were still handled
        assert_eq!(writes.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let input = "idfa\ta\t1\t2\t3\nidfa\tboom\t1\t2\t3\nidfa\tc\t1\t2\t3\nidfa\td\t1\t2\t3\n";
        let settings = StoreSettings::new(Arc::new(ThreadRecorder::default()));

        let err = dispatch(Cursor::new(input), &ShardMap::with_defaults(), &settings, &pool(2)).unwrap_err();
        assert!(err.to_string().contains("Worker thread 1 panicked"));
    }
}
