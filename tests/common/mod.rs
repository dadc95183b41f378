// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// The four-line batch: two valid records, one unknown device type, one malformed line
pub const MIXED_BATCH: &str = "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23\n\
gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424\n\
wat\tx\t1\t2\t3\n\
idfa\tbroken\t1\n";

/// Run the memcload binary with the given arguments, ignoring any user config file
pub fn run_memcload(args: &[&str]) -> (String, String, i32) {
    run_memcload_in(args, None)
}

/// Run the memcload binary from `cwd`
pub fn run_memcload_in(args: &[&str], cwd: Option<&Path>) -> (String, String, i32) {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_memcload"));
    cmd.args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().expect("Failed to execute memcload");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

/// Write `content` gzip-compressed to `dir/name`
pub fn write_gzip(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

/// Glob pattern string for `dir/glob`
pub fn pattern_in(dir: &Path, glob: &str) -> String {
    dir.join(glob).to_string_lossy().to_string()
}

/// Minimal memcached speaking only `set`, keeping values in memory.
pub struct FakeMemcached {
    pub addr: String,
    pub values: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    /// Remaining `set` commands to answer with a server error
    pub reject: Arc<AtomicU32>,
    pub sets: Arc<AtomicU32>,
}

impl FakeMemcached {
    pub fn start() -> Self {
        Self::start_rejecting(0)
    }

    /// Answer the first `reject` sets with `SERVER_ERROR`
    pub fn start_rejecting(reject: u32) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let values = Arc::new(Mutex::new(HashMap::new()));
        let reject = Arc::new(AtomicU32::new(reject));
        let sets = Arc::new(AtomicU32::new(0));

        {
            let values = Arc::clone(&values);
            let reject = Arc::clone(&reject);
            let sets = Arc::clone(&sets);
            thread::spawn(move || {
                for stream in listener.incoming().flatten() {
                    let values = Arc::clone(&values);
                    let reject = Arc::clone(&reject);
                    let sets = Arc::clone(&sets);
                    thread::spawn(move || serve(stream, values, reject, sets));
                }
            });
        }

        Self {
            addr,
            values,
            reject,
            sets,
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.lock().unwrap().len()
    }

    pub fn set_count(&self) -> u32 {
        self.sets.load(Ordering::SeqCst)
    }
}

fn serve(
    stream: TcpStream,
    values: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    reject: Arc<AtomicU32>,
    sets: Arc<AtomicU32>,
) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    loop {
        let mut header = String::new();
        match reader.read_line(&mut header) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let parts: Vec<&str> = header.split_whitespace().collect();
        if parts.len() != 5 || parts[0] != "set" {
            let _ = writer.write_all(b"ERROR\r\n");
            continue;
        }
        let len: usize = parts[4].parse().unwrap();
        let mut data = vec![0u8; len + 2];
        if reader.read_exact(&mut data).is_err() {
            return;
        }
        data.truncate(len);
        sets.fetch_add(1, Ordering::SeqCst);

        let rejected = reject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let reply: &[u8] = if rejected {
            b"SERVER_ERROR out of memory storing object\r\n"
        } else {
            values.lock().unwrap().insert(parts[1].to_string(), data);
            b"STORED\r\n"
        };
        if writer.write_all(reply).is_err() {
            return;
        }
    }
}

/// An address nothing listens on
pub fn dead_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}
