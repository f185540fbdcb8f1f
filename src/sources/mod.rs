//! Source handlers: producers that discover documents and push them onto the processing queue.
//!
//! Two kinds ship with the crate. [`FolderSourceHandler`] watches a directory and
//! [`ApiSourceHandler`] polls a [`DocumentFetcher`]. Both honor the same contract: `start` fails
//! with [`SourceError::QueueNotConfigured`] until a queue has been injected, and once `stop`
//! returns the handler enqueues nothing further.

mod api;
mod folder;

pub use api::{ApiSourceHandler, DocumentFetcher, HttpDocumentFetcher, SourceFetchError};
pub use folder::FolderSourceHandler;

use crate::config::Config;
use crate::pipeline::ProcessingQueue;
use crate::sync::lock;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by source handlers.
#[derive(Debug, Error)]
pub enum SourceError {
    /// `start` was called before a processing queue was injected.
    #[error("processing queue not set")]
    QueueNotConfigured,
    /// `start` was called on a handler that is already running.
    #[error("source handler is already running")]
    AlreadyRunning,
    /// The watched directory does not exist.
    #[error("watch directory '{0}' does not exist")]
    MissingDirectory(PathBuf),
    /// The filesystem watcher could not be installed.
    #[error("filesystem watch failed: {0}")]
    Watch(#[from] notify::Error),
    /// Scanning the watched directory failed.
    #[error("directory scan failed: {0}")]
    Scan(#[from] walkdir::Error),
    /// The fetcher could not be constructed.
    #[error("document fetcher unavailable: {0}")]
    Fetch(#[from] SourceFetchError),
    /// The background poll task ended abnormally.
    #[error("source task failed: {0}")]
    Task(String),
}

/// A producer of [`crate::pipeline::DocumentRef`]s.
#[async_trait]
pub trait SourceHandler: Send + Sync {
    /// Short label for logs (`folder`, `api`, ...).
    fn kind(&self) -> &'static str;

    /// Inject the queue documents are pushed onto. Called by the pipeline at registration.
    fn set_processing_queue(&self, queue: ProcessingQueue);

    /// Begin producing documents.
    async fn start(&self) -> Result<(), SourceError>;

    /// Stop producing documents. After this returns nothing more is enqueued.
    async fn stop(&self) -> Result<(), SourceError>;
}

/// Declarative description of a source, used to build handlers from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// Watch a directory for new files.
    Folder {
        /// Directory to watch.
        directory: PathBuf,
        /// Lower-cased extensions (without dot) to accept.
        supported_formats: Vec<String>,
    },
    /// Poll an HTTP endpoint for new document paths.
    Api {
        /// Endpoint returning the documents to ingest.
        endpoint: String,
        /// Seconds between polls.
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
    },
}

fn default_poll_interval_secs() -> u64 {
    60
}

/// Sources described by `config`, keyed by the name they are registered under.
///
/// The folder source is always present; the API source only when an endpoint is configured.
pub fn source_specs(config: &Config) -> Vec<(String, SourceSpec)> {
    let mut specs = vec![(
        "folder".to_string(),
        SourceSpec::Folder {
            directory: config.watch_directory.clone(),
            supported_formats: config.supported_formats.clone(),
        },
    )];
    if let Some(endpoint) = &config.api_endpoint {
        specs.push((
            "api".to_string(),
            SourceSpec::Api {
                endpoint: endpoint.clone(),
                poll_interval_secs: config.api_poll_interval.as_secs(),
            },
        ));
    }
    specs
}

/// Instantiate the handler described by `spec`.
pub fn build_source_handler(spec: &SourceSpec) -> Result<Arc<dyn SourceHandler>, SourceError> {
    let handler: Arc<dyn SourceHandler> = match spec {
        SourceSpec::Folder {
            directory,
            supported_formats,
        } => Arc::new(FolderSourceHandler::new(
            directory.clone(),
            supported_formats.iter().cloned(),
        )),
        SourceSpec::Api {
            endpoint,
            poll_interval_secs,
        } => {
            let fetcher = HttpDocumentFetcher::new(endpoint.clone())?;
            Arc::new(ApiSourceHandler::new(
                Arc::new(fetcher),
                Duration::from_secs((*poll_interval_secs).max(1)),
            ))
        }
    };
    Ok(handler)
}

/// Queue slot shared by a handler and its background producers.
///
/// Producers push while holding the slot lock and [`QueueSlot::close`] clears it under the same
/// lock, so once `close` returns no producer can enqueue.
#[derive(Default)]
pub(crate) struct QueueSlot {
    queue: Mutex<Option<ProcessingQueue>>,
}

impl QueueSlot {
    pub(crate) fn new(queue: Option<ProcessingQueue>) -> Self {
        Self {
            queue: Mutex::new(queue),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ProcessingQueue>> {
        lock(&self.queue)
    }

    pub(crate) fn set(&self, queue: ProcessingQueue) {
        *self.guard() = Some(queue);
    }

    pub(crate) fn get(&self) -> Result<ProcessingQueue, SourceError> {
        self.guard().clone().ok_or(SourceError::QueueNotConfigured)
    }

    /// Push `document` unless the slot is closed. Returns whether it was queued.
    pub(crate) fn push(&self, document: crate::pipeline::DocumentRef) -> bool {
        match self.guard().as_ref() {
            Some(queue) => {
                queue.push(document);
                true
            }
            None => false,
        }
    }

    pub(crate) fn close(&self) {
        self.guard().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_specs_deserialize_from_tagged_json() {
        let specs: Vec<SourceSpec> = serde_json::from_str(
            r#"[
                {"kind": "folder", "directory": "/data/in", "supported_formats": ["txt"]},
                {"kind": "api", "endpoint": "http://feed.local/new"}
            ]"#,
        )
        .expect("specs");

        assert_eq!(
            specs,
            vec![
                SourceSpec::Folder {
                    directory: "/data/in".into(),
                    supported_formats: vec!["txt".into()],
                },
                SourceSpec::Api {
                    endpoint: "http://feed.local/new".into(),
                    poll_interval_secs: 60,
                },
            ]
        );
    }

    #[test]
    fn build_source_handler_picks_kind() {
        let folder = build_source_handler(&SourceSpec::Folder {
            directory: "/data/in".into(),
            supported_formats: vec!["txt".into()],
        })
        .expect("folder");
        let api = build_source_handler(&SourceSpec::Api {
            endpoint: "http://feed.local/new".into(),
            poll_interval_secs: 5,
        })
        .expect("api");

        assert_eq!(folder.kind(), "folder");
        assert_eq!(api.kind(), "api");
    }

    #[test]
    fn closed_slot_refuses_pushes() {
        let queue = ProcessingQueue::new();
        let slot = QueueSlot::new(Some(queue.clone()));
        assert!(slot.push(crate::pipeline::DocumentRef::new("folder", "/a.txt")));
        slot.close();
        assert!(!slot.push(crate::pipeline::DocumentRef::new("folder", "/b.txt")));
        assert_eq!(queue.unfinished(), 1);
        assert!(matches!(slot.get(), Err(SourceError::QueueNotConfigured)));
    }
}
