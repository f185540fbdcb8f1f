//! Experiment tracking: scoped runs that group the parameters and metrics of one unit of work.
//!
//! The shipped tracker appends JSON lines to `<dir>/<experiment>/runs.jsonl`, one line per event
//! (`start`, `params`, `metrics`, `end`). A run dropped without an explicit `finish` records a
//! `KILLED` end event, so every started run is closed in the log.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Errors raised by experiment trackers.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Writing to the run log failed.
    #[error("tracking I/O failed for '{path}': {source}")]
    Io {
        /// Log file or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// An event could not be serialized.
    #[error("failed to serialize tracking event: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The tracking backend is unavailable.
    #[error("tracking backend unavailable: {0}")]
    Unavailable(String),
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// The unit of work completed.
    Finished,
    /// The unit of work failed.
    Failed,
    /// The run was abandoned without an explicit status.
    Killed,
}

/// Factory for scoped runs.
pub trait ExperimentTracker: Send + Sync {
    /// Open a run named `run_name`.
    fn start_run(&self, run_name: &str) -> Result<Box<dyn ScopedRun>, TrackingError>;
}

/// An open run. Dropping it without [`ScopedRun::finish`] is allowed.
pub trait ScopedRun: Send {
    /// Identifier assigned to this run.
    fn run_id(&self) -> &str;
    /// Record configuration parameters.
    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<(), TrackingError>;
    /// Record numeric results.
    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<(), TrackingError>;
    /// Close the run with `status`.
    fn finish(self: Box<Self>, status: RunStatus) -> Result<(), TrackingError>;
}

/// Tracker writing runs as JSON lines.
#[derive(Debug, Clone)]
pub struct JsonlExperimentTracker {
    experiment: String,
    log_path: PathBuf,
}

impl JsonlExperimentTracker {
    /// Create the experiment directory under `dir` and return a tracker for it.
    pub fn new(dir: impl Into<PathBuf>, experiment: impl Into<String>) -> Result<Self, TrackingError> {
        let experiment = experiment.into();
        let experiment_dir = dir.into().join(&experiment);
        std::fs::create_dir_all(&experiment_dir).map_err(|source| TrackingError::Io {
            path: experiment_dir.clone(),
            source,
        })?;
        tracing::debug!(experiment = %experiment, dir = %experiment_dir.display(), "Experiment tracker ready");
        Ok(Self {
            experiment,
            log_path: experiment_dir.join("runs.jsonl"),
        })
    }

    /// File receiving run events.
    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }
}

impl ExperimentTracker for JsonlExperimentTracker {
    fn start_run(&self, run_name: &str) -> Result<Box<dyn ScopedRun>, TrackingError> {
        let run = JsonlRun {
            run_id: Uuid::new_v4().simple().to_string(),
            run_name: run_name.to_string(),
            experiment: self.experiment.clone(),
            log_path: self.log_path.clone(),
            finished: false,
        };
        run.append(RunEventKind::Start)?;
        Ok(Box::new(run))
    }
}

struct JsonlRun {
    run_id: String,
    run_name: String,
    experiment: String,
    log_path: PathBuf,
    finished: bool,
}

#[derive(Serialize)]
struct RunEvent<'a> {
    run_id: &'a str,
    run_name: &'a str,
    experiment: &'a str,
    timestamp: String,
    #[serde(flatten)]
    kind: RunEventKind<'a>,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum RunEventKind<'a> {
    Start,
    Params {
        params: &'a BTreeMap<String, String>,
    },
    Metrics {
        metrics: &'a BTreeMap<String, f64>,
    },
    End {
        status: RunStatus,
    },
}

impl JsonlRun {
    fn append(&self, kind: RunEventKind<'_>) -> Result<(), TrackingError> {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let event = RunEvent {
            run_id: &self.run_id,
            run_name: &self.run_name,
            experiment: &self.experiment,
            timestamp,
            kind,
        };
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');

        let io_error = |source| TrackingError::Io {
            path: self.log_path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(io_error)?;
        file.write_all(&line).map_err(io_error)
    }
}

impl ScopedRun for JsonlRun {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<(), TrackingError> {
        self.append(RunEventKind::Params { params })
    }

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f64>) -> Result<(), TrackingError> {
        self.append(RunEventKind::Metrics { metrics })
    }

    fn finish(mut self: Box<Self>, status: RunStatus) -> Result<(), TrackingError> {
        self.finished = true;
        self.append(RunEventKind::End { status })
    }
}

impl Drop for JsonlRun {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            if let Err(error) = self.append(RunEventKind::End {
                status: RunStatus::Killed,
            }) {
                tracing::warn!(run_id = %self.run_id, error = %error, "Failed to close tracking run");
            }
        }
    }
}
