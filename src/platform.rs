use anyhow::Result;
use log::warn;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;

#[cfg(unix)]
use signal_hook::{consts::SIGINT, consts::SIGTERM, iterator::Signals};

#[cfg(windows)]
use signal_hook::{consts::SIGINT, flag};

/// Standard Unix exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,
    SignalInt = 130,  // 128 + SIGINT (2)
    SignalTerm = 143, // 128 + SIGTERM (15)
}

impl ExitCode {
    pub fn exit(self) -> ! {
        process::exit(self as i32)
    }
}

/// Global termination flag, checked by the loader between batch files
pub static SHOULD_TERMINATE: AtomicBool = AtomicBool::new(false);

/// Exit code matching the first signal received, 0 when none
static TERMINATION_CODE: AtomicI32 = AtomicI32::new(0);

fn request_termination(code: ExitCode) {
    let _ = TERMINATION_CODE.compare_exchange(0, code as i32, Ordering::SeqCst, Ordering::SeqCst);
    SHOULD_TERMINATE.store(true, Ordering::SeqCst);
}

/// Exit code to use when the run was stopped by a signal
pub fn termination_exit_code() -> Option<ExitCode> {
    match TERMINATION_CODE.load(Ordering::SeqCst) {
        130 => Some(ExitCode::SignalInt),
        143 => Some(ExitCode::SignalTerm),
        _ => None,
    }
}

/// Signal handler for graceful shutdown.
///
/// The first SIGINT/SIGTERM lets the current batch finish and stops the run
/// before the next one. A second signal exits immediately.
pub struct SignalHandler {
    _handle: thread::JoinHandle<()>,
}

impl SignalHandler {
    pub fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            let mut signals = Signals::new([SIGINT, SIGTERM])?;

            let handle = thread::spawn(move || {
                let mut shutdown_count = 0;
                for sig in signals.forever() {
                    let code = match sig {
                        SIGINT => ExitCode::SignalInt,
                        SIGTERM => ExitCode::SignalTerm,
                        _ => continue,
                    };
                    shutdown_count += 1;
                    if shutdown_count > 1 {
                        code.exit();
                    }
                    warn!("Received signal {}, stopping after the current batch", sig);
                    request_termination(code);
                }
            });

            Ok(SignalHandler { _handle: handle })
        }

        #[cfg(windows)]
        {
            let term_flag = std::sync::Arc::new(AtomicBool::new(false));
            flag::register(SIGINT, std::sync::Arc::clone(&term_flag))?;

            let handle = thread::spawn(move || {
                let mut shutdown_count = 0;
                loop {
                    thread::sleep(std::time::Duration::from_millis(100));
                    if term_flag.swap(false, Ordering::Relaxed) {
                        shutdown_count += 1;
                        if shutdown_count > 1 {
                            ExitCode::SignalInt.exit();
                        }
                        warn!("Received Ctrl-C, stopping after the current batch");
                        request_termination(ExitCode::SignalInt);
                    }
                }
            });

            Ok(SignalHandler { _handle: handle })
        }
    }
}
