//! Batch file discovery
//!
//! Wildcards never match a leading `.`, so batches already marked as
//! processed (renamed to `.name`) drop out of every later expansion.

use anyhow::{Context, Result};
use glob::MatchOptions;
use log::warn;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::config::FileOrder;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: true,
};

/// Expand `pattern` into the list of batch files to process
pub fn discover(pattern: &str, order: FileOrder) -> Result<Vec<PathBuf>> {
    let entries = glob::glob_with(pattern, MATCH_OPTIONS)
        .with_context(|| format!("Invalid file pattern: {}", pattern))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable path {}: {}", e.path().display(), e.error()),
        }
    }

    sort_files(&mut files, order);
    Ok(files)
}

/// Sort files according to the requested order
pub fn sort_files(files: &mut [PathBuf], order: FileOrder) {
    match order {
        FileOrder::Glob => {}
        FileOrder::Name => files.sort(),
        FileOrder::Mtime => {
            // Oldest first
            files.sort_by_key(|path| {
                fs::metadata(path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH)
            });
        }
    }
}
