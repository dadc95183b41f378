use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Once;

/// First letter of the level name, as in `[2024.01.31 12:00:00] I Processing ...`
fn level_letter(level: log::Level) -> char {
    match level {
        log::Level::Error => 'E',
        log::Level::Warn => 'W',
        log::Level::Info => 'I',
        log::Level::Debug => 'D',
        log::Level::Trace => 'T',
    }
}

/// Init log. Writes to `log_file` (appending) or stderr.
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_log(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} {}",
                chrono::Local::now().format("%Y.%m.%d %H:%M:%S"),
                level_letter(record.level()),
                record.args()
            )
        })
        .filter_level(level)
        .parse_default_env();

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Logger already initialized")?;
    Ok(())
}

/// Level used for a run: debug in dry-run mode, info otherwise
pub fn run_level(dry_run: bool) -> LevelFilter {
    if dry_run {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

static INIT_LOG: Once = Once::new();

/// Setup logging for tests.
pub fn setup_log() {
    INIT_LOG.call_once(|| {
        let _ = env_logger::builder().is_test(true).filter_level(LevelFilter::Debug).try_init();
    });
}
