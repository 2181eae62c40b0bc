//! File logging for the `gambit` binary.
//!
//! Logs go to a daily rolling file under `<storage root>/logs/` so stdout
//! stays reserved for command output. `GAMBIT_LOG` (or `RUST_LOG`) sets the
//! filter; `GAMBIT_DEBUG_LOG=1` forces debug.

use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "gambit.log";
const FILTER_ENV: &str = "GAMBIT_LOG";
const DEBUG_ENV: &str = "GAMBIT_DEBUG_LOG";

/// Installs the global subscriber. Keep the returned guard alive until exit;
/// dropping it flushes the writer. Returns `None` when the log directory
/// cannot be created, in which case logging is disabled.
pub fn init(log_dir: &Path) -> Option<WorkerGuard> {
    if let Err(err) = fs_err::create_dir_all(log_dir) {
        eprintln!("gambit: logging disabled: {}", err);
        return None;
    }

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    let installed = tracing_subscriber::registry()
        .with(filter())
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        return None;
    }
    Some(guard)
}

fn filter() -> EnvFilter {
    if debug_enabled(env::var(DEBUG_ENV).ok().as_deref()) {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn debug_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}
