//! Tracing subscriber setup shared by the server and the batch tools.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{Error, Result};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "teleharvest=info,tower_http=info";

/// Rotated log files kept on disk.
pub const MAX_LOG_FILES: usize = 5;

/// `LOG_FORMAT=json` switches console output to one JSON object per line.
fn json_console() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into())
}

/// Console logging only.
pub fn init(default_filter: &str) {
    // A subscriber may already be installed (tests, repeated init)
    let json = json_console();
    let _ = tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init();
}

/// Console logging plus a daily rolling file `<log_dir>/<file_name>`.
///
/// The returned guard flushes the file writer on drop and must be held
/// for the lifetime of the program.
pub fn init_with_file(default_filter: &str, log_dir: &Path, file_name: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(file_name)
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
        .map_err(|e| Error::Config(format!("Cannot create log file in {}: {}", log_dir.display(), e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let json = json_console();
    let _ = tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init();

    Ok(guard)
}
