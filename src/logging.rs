//! Tracing setup for the `docflow` binary.
//!
//! Every event goes to stdout in compact form and is appended to the configured log file
//! through a non-blocking writer. Without `RUST_LOG` the filter shows this crate's pipeline,
//! source, and router events at `info` and keeps dependencies at `warn`.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "docflow=info,warn";

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file (or its directory) could not be opened for appending.
    #[error("failed to open log file '{path}': {source}")]
    LogFile {
        /// Configured log file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A global subscriber was already installed.
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Keeps the file writer's background thread alive. Dropping it flushes pending lines.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Filter from `RUST_LOG`, or the crate default when it is unset or malformed.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the stdout and file layers. Hold the returned guard until the process exits.
pub fn init_tracing(log_file: &Path) -> Result<LogGuard, LoggingError> {
    let (file_writer, worker) = open_log_file(log_file)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false).compact())
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .compact(),
        )
        .try_init()
        .map_err(|error| LoggingError::AlreadyInstalled(error.to_string()))?;

    Ok(LogGuard { _worker: worker })
}

fn open_log_file(path: &Path) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let log_file_error = |source| LoggingError::LogFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(log_file_error)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_file_error)?;
    Ok(tracing_appender::non_blocking(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn log_file_is_appended_across_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("docflow.log");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "earlier run\n").expect("seed");

        let (mut writer, worker) = open_log_file(&path).expect("open");
        writer.write_all(b"this run\n").expect("write");
        drop(worker);

        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "earlier run\nthis run\n"
        );
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("logs").join("deep").join("docflow.log");

        let (_writer, _worker) = open_log_file(&path).expect("open");

        assert!(path.is_file());
    }

    #[test]
    fn unwritable_log_path_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("logs"), "a file, not a directory").expect("write");

        let error = open_log_file(&dir.path().join("logs").join("docflow.log")).unwrap_err();

        assert!(matches!(error, LoggingError::LogFile { .. }));
    }
}
