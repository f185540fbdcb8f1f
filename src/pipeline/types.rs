//! Work items and error types shared by the ingestion pipeline.

use crate::processing::{ParseError, ProcessingError};
use crate::sources::SourceError;
use crate::storage::{ObjectStoreError, VectorIndexError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// A document waiting to be processed: where it came from and where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Label of the source handler that discovered the document (`folder`, `api`, ...).
    pub source: String,
    /// Local filesystem path of the document.
    pub path: PathBuf,
}

impl DocumentRef {
    /// Build a reference for `path` discovered by `source`.
    pub fn new(source: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
        }
    }

    /// Base name of the document, lossily converted for logs and metadata.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Failure of one document's processing routine. Always routes the document to `error/`.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The document bytes could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        /// Document path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Archiving the raw document failed.
    #[error("upload failed: {0}")]
    Upload(#[from] ObjectStoreError),
    /// The parser rejected the document.
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    /// Chunking or embedding failed.
    #[error("processing failed: {0}")]
    Processing(#[from] ProcessingError),
    /// Processing produced no chunks.
    #[error("document '{path}' produced no chunks")]
    EmptyDocument {
        /// Document path.
        path: PathBuf,
    },
    /// The vector index refused the batch.
    #[error("vector index upsert failed: {0}")]
    Index(#[from] VectorIndexError),
    /// The processing routine panicked.
    #[error("processing routine panicked: {0}")]
    Panicked(String),
}

/// Errors surfaced by [`crate::pipeline::DocumentIngestionPipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline cannot run as assembled.
    #[error("pipeline misconfigured: {0}")]
    Configuration(String),
    /// A handler with this name is already registered.
    #[error("a source handler named '{0}' is already registered")]
    DuplicateHandler(String),
    /// A source handler failed to start.
    #[error("source handler '{name}' failed to start: {source}")]
    HandlerStart {
        /// Registered handler name.
        name: String,
        /// Handler error.
        #[source]
        source: SourceError,
    },
    /// The pipeline was already stopped.
    #[error("pipeline has been stopped")]
    Stopped,
    /// Installing the interrupt listener failed.
    #[error("failed to listen for interrupt: {0}")]
    Signal(#[source] std::io::Error),
    /// The processing worker ended while the pipeline was still running.
    #[error("processing worker exited unexpectedly")]
    WorkerExited,
}

/// Problems observed while shutting down. Logged as warnings; shutdown always proceeds.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// A handler's stop call returned an error.
    #[error("source handler '{name}' failed to stop: {source}")]
    Handler {
        /// Registered handler name.
        name: String,
        /// Handler error.
        #[source]
        source: SourceError,
    },
    /// A handler did not stop within the shutdown timeout.
    #[error("source handler '{name}' did not stop within {timeout:?}")]
    HandlerTimeout {
        /// Registered handler name.
        name: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The worker did not finish its current document within the shutdown timeout.
    #[error("processing worker did not stop within {0:?}")]
    WorkerTimeout(Duration),
    /// The worker task panicked.
    #[error("processing worker panicked: {0}")]
    WorkerPanicked(String),
}
