//! Crash log for `gcdemu`.
//!
//! The applet is normally started by the session without a terminal, so a
//! panic is also appended to `crash.log` in the data directory and sent to
//! the tracing log.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use std::path::PathBuf;

use crate::config::Config;

const CRASH_LOG: &str = "crash.log";

/// What is known about one panic.
struct CrashReport {
    time: String,
    thread: String,
    location: String,
    message: String,
    backtrace: String,
}

impl CrashReport {
    fn capture(info: &PanicHookInfo) -> Self {
        let thread = std::thread::current();
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());

        Self {
            time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            thread: thread.name().unwrap_or("unnamed").to_string(),
            location: info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_else(|| "unknown".to_string()),
            message,
            backtrace: std::backtrace::Backtrace::force_capture().to_string(),
        }
    }
}

impl fmt::Display for CrashReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "gcdemu {} crashed at {}", env!("CARGO_PKG_VERSION"), self.time)?;
        writeln!(f, "thread '{}' panicked at {}: {}", self.thread, self.location, self.message)?;
        writeln!(f)?;
        writeln!(f, "{}", self.backtrace.trim_end())
    }
}

/// Install the panic hook. Call first thing in `main()`.
pub fn install() {
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        std::env::set_var("RUST_BACKTRACE", "1");
    }
    panic::set_hook(Box::new(|info| {
        let report = CrashReport::capture(info);
        tracing::error!(
            "Panic in thread '{}' at {}: {}",
            report.thread,
            report.location,
            report.message
        );
        eprintln!("{}", report);
        if let Some(path) = append(&report) {
            eprintln!("Crash report written to {}", path.display());
        }
    }));
}

fn crash_log_path() -> Option<PathBuf> {
    Config::data_dir().ok().map(|dir| dir.join(CRASH_LOG))
}

/// Append to the crash log; errors are ignored while panicking.
fn append(report: &CrashReport) -> Option<PathBuf> {
    let path = crash_log_path()?;
    fs::create_dir_all(path.parent()?).ok()?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;
    writeln!(file, "{}", report).ok()?;
    Some(path)
}
