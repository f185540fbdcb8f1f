//! Polling source backed by a remote listing of new documents.

use super::{QueueSlot, SourceError, SourceHandler};
use crate::pipeline::{DocumentRef, ProcessingQueue};
use crate::sync::lock;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const SOURCE_LABEL: &str = "api";

/// Errors raised while fetching the list of new documents.
#[derive(Debug, Error)]
pub enum SourceFetchError {
    /// The request could not be sent or the body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("unexpected response ({status}): {body}")]
    UnexpectedStatus {
        /// Status returned by the endpoint.
        status: StatusCode,
        /// Response body.
        body: String,
    },
    /// The response body was not a document listing.
    #[error("invalid document listing: {0}")]
    InvalidResponse(String),
}

/// Remote collaborator answering "which documents are new?".
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Return the documents that appeared since the previous call.
    async fn fetch_new_documents(&self) -> Result<Vec<DocumentRef>, SourceFetchError>;
}

/// [`DocumentFetcher`] that issues `GET <endpoint>` and expects JSON of the form
/// `[{"path": "..."}]` or `{"documents": [{"path": "..."}]}`.
pub struct HttpDocumentFetcher {
    client: Client,
    endpoint: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentListing {
    Bare(Vec<ListedDocument>),
    Wrapped { documents: Vec<ListedDocument> },
}

#[derive(Deserialize)]
struct ListedDocument {
    path: PathBuf,
}

impl HttpDocumentFetcher {
    /// Build a fetcher for `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SourceFetchError> {
        let client = Client::builder()
            .user_agent("docflow/0.1")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl DocumentFetcher for HttpDocumentFetcher {
    async fn fetch_new_documents(&self) -> Result<Vec<DocumentRef>, SourceFetchError> {
        let response = self.client.get(&self.endpoint).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SourceFetchError::UnexpectedStatus { status, body });
        }

        let listing: DocumentListing = serde_json::from_str(&body)
            .map_err(|error| SourceFetchError::InvalidResponse(error.to_string()))?;
        let documents = match listing {
            DocumentListing::Bare(documents) | DocumentListing::Wrapped { documents } => documents,
        };
        Ok(documents
            .into_iter()
            .map(|document| DocumentRef::new(SOURCE_LABEL, document.path))
            .collect())
    }
}

/// Polls a [`DocumentFetcher`] on a fixed interval and enqueues whatever it returns.
///
/// The first poll happens immediately on start. A failed poll is logged and the loop carries
/// on with the next tick. Results of a fetch still in flight when `stop` is called are dropped.
pub struct ApiSourceHandler {
    fetcher: Arc<dyn DocumentFetcher>,
    poll_interval: Duration,
    queue: QueueSlot,
    poller: Mutex<Option<Poller>>,
}

struct Poller {
    slot: Arc<QueueSlot>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ApiSourceHandler {
    /// Poll `fetcher` every `poll_interval`.
    pub fn new(fetcher: Arc<dyn DocumentFetcher>, poll_interval: Duration) -> Self {
        Self {
            fetcher,
            poll_interval,
            queue: QueueSlot::default(),
            poller: Mutex::new(None),
        }
    }
}

async fn poll_once(fetcher: &dyn DocumentFetcher, slot: &QueueSlot) {
    match fetcher.fetch_new_documents().await {
        Ok(documents) => {
            if !documents.is_empty() {
                tracing::info!(count = documents.len(), "Fetched new documents from API");
            }
            for document in documents {
                if !slot.push(document) {
                    tracing::debug!("Dropping fetched documents after stop");
                    break;
                }
            }
        }
        Err(error) => tracing::error!(error = %error, "Error fetching documents from API"),
    }
}

#[async_trait]
impl SourceHandler for ApiSourceHandler {
    fn kind(&self) -> &'static str {
        SOURCE_LABEL
    }

    fn set_processing_queue(&self, queue: ProcessingQueue) {
        self.queue.set(queue);
    }

    async fn start(&self) -> Result<(), SourceError> {
        let queue = self.queue.get()?;
        let mut poller = lock(&self.poller);
        if poller.is_some() {
            return Err(SourceError::AlreadyRunning);
        }

        let slot = Arc::new(QueueSlot::new(Some(queue)));
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let fetcher = Arc::clone(&self.fetcher);
        let task_slot = Arc::clone(&slot);
        let poll_interval = self.poll_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => poll_once(fetcher.as_ref(), &task_slot).await,
                }
            }
        });
        tracing::info!(interval_secs = poll_interval.as_secs_f64(), "Started API polling");

        *poller = Some(Poller {
            slot,
            shutdown,
            task,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), SourceError> {
        let poller = lock(&self.poller).take();
        if let Some(Poller {
            slot,
            shutdown,
            task,
        }) = poller
        {
            slot.close();
            // A send error means the loop already ended.
            let _ = shutdown.send(true);
            task.await
                .map_err(|error| SourceError::Task(error.to_string()))?;
            tracing::info!("Stopped API polling");
        }
        Ok(())
    }
}
