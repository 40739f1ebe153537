//! File logging for the hook CLI.
//!
//! The hook runs for a few milliseconds per event and its stdout is reserved
//! for query results, so logs go to a daily-rolling file under
//! `~/.lockwatch/logs`. Logging is best effort: if the directory cannot be
//! created the hook runs without a subscriber.

use std::env;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "hook.log";

/// Returns the appender guard; dropping it flushes buffered lines.
pub fn init() -> Option<WorkerGuard> {
    let dir = log_dir()?;
    if fs_err::create_dir_all(&dir).is_err() {
        return None;
    }

    let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;

    Some(guard)
}

fn filter() -> EnvFilter {
    let debug_enabled = env::var("LOCKWATCH_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn log_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".lockwatch").join("logs"))
}
