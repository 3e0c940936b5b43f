//! Tracing subscriber setup shared by the binary and embedding applications.

use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

const LOG_FILE_NAME: &str = "switchboard.log";

/// Build the env filter: `RUST_LOG` wins, otherwise the configured level.
pub fn build_filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},switchboard={}", cfg.level, cfg.level)))
}

/// Check that `dir` exists (or can be created) and accepts writes.
///
/// `tracing_appender::rolling::daily` panics when it cannot create the
/// initial file, so this runs before the appender is built.
fn log_dir_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".switchboard_write_test");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)
    {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(cfg: &LoggingConfig) {
    let filter = build_filter(cfg);

    let console_layer = if cfg.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let file_layer = match cfg.dir.as_deref() {
        Some(dir) if log_dir_writable(Path::new(dir)) => {
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Keep the guard alive for the rest of the process
            Box::leak(Box::new(guard));

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed(),
            )
        }
        Some(dir) => {
            eprintln!(
                "Warning: Could not write to log directory {}, file logging disabled",
                dir
            );
            None
        }
        None => None,
    };

    let file_logging_enabled = file_layer.is_some();
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed && file_logging_enabled {
        if let Some(dir) = cfg.dir.as_deref() {
            eprintln!("Logging to: {}/{}", dir, LOG_FILE_NAME);
        }
    }
}
