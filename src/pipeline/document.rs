//! The per-document routine: archive, parse, embed, index, track, then route.

use super::router::{Disposition, route_document};
use super::types::{DocumentError, DocumentRef};
use crate::metrics::PipelineMetrics;
use crate::processing::{ChunkEmbedder, ChunkRecord, DocumentParser, ExtraInfo};
use crate::storage::{ObjectStore, VectorIndex};
use crate::tracking::{ExperimentTracker, RunStatus, ScopedRun};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Collaborators the pipeline drives for every document.
#[derive(Clone)]
pub struct PipelineComponents {
    /// Turns raw bytes into text.
    pub parser: Arc<dyn DocumentParser>,
    /// Chunks and embeds text.
    pub processor: Arc<dyn ChunkEmbedder>,
    /// Receives the embedded chunks.
    pub vector_index: Arc<dyn VectorIndex>,
    /// Archives the raw document.
    pub object_store: Arc<dyn ObjectStore>,
    /// Records one run per document.
    pub tracker: Arc<dyn ExperimentTracker>,
    /// Process-wide counters.
    pub metrics: Arc<PipelineMetrics>,
}

/// What happened to a dequeued document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// The document was processed and now lives at the given path under `processed/`.
    Processed(PathBuf),
    /// Processing or the move into `processed/` failed. Holds the path under `error/` when
    /// that move succeeded.
    Failed(Option<PathBuf>),
    /// The file vanished before processing started.
    Skipped,
}

#[derive(Debug)]
struct DocumentReport {
    object_name: String,
    chunk_count: usize,
    processing_time: Duration,
}

pub(crate) struct DocumentTask {
    components: PipelineComponents,
}

impl DocumentTask {
    pub(crate) fn new(components: PipelineComponents) -> Self {
        Self { components }
    }

    /// Run the full routine for `document`. Never returns an error: every failure is logged,
    /// counted, and routes the document to `error/`.
    pub(crate) async fn handle(&self, document: &DocumentRef) -> DocumentOutcome {
        let path = document.path();
        let file_name = document.file_name();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::warn!(path = %path.display(), source = %document.source, "Document disappeared before processing");
            return DocumentOutcome::Skipped;
        }

        let mut run = self.open_run(document, &file_name);
        let report = match self.process(document, &file_name, &mut run).await {
            Ok(report) => report,
            Err(error) => {
                tracing::error!(
                    path = %path.display(),
                    file_name = %file_name,
                    source = %document.source,
                    error = %error,
                    "Failed to process document"
                );
                return self.fail(path, run).await;
            }
        };

        match route_document(path, Disposition::Processed).await {
            Ok(target) => {
                close_run(run, RunStatus::Finished);
                tracing::info!(
                    path = %path.display(),
                    file_name = %file_name,
                    source = %document.source,
                    object = %report.object_name,
                    chunks = report.chunk_count,
                    elapsed_secs = report.processing_time.as_secs_f64(),
                    "Document processed"
                );
                DocumentOutcome::Processed(target)
            }
            Err(error) => {
                tracing::error!(
                    path = %path.display(),
                    file_name = %file_name,
                    error = %error,
                    "Failed to move processed document"
                );
                self.fail(path, run).await
            }
        }
    }

    async fn fail(&self, path: &Path, run: Option<Box<dyn ScopedRun>>) -> DocumentOutcome {
        self.components.metrics.record_document_failed();
        close_run(run, RunStatus::Failed);
        DocumentOutcome::Failed(self.route_failed(path).await)
    }

    /// Bookkeeping for a routine that panicked before it could route its document.
    pub(crate) async fn recover(&self, document: &DocumentRef, error: &DocumentError) -> DocumentOutcome {
        let path = document.path();
        tracing::error!(
            path = %path.display(),
            file_name = %document.file_name(),
            source = %document.source,
            error = %error,
            "Failed to process document"
        );
        self.components.metrics.record_document_failed();
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return DocumentOutcome::Failed(None);
        }
        DocumentOutcome::Failed(self.route_failed(path).await)
    }

    async fn route_failed(&self, path: &Path) -> Option<PathBuf> {
        match route_document(path, Disposition::Failed).await {
            Ok(target) => Some(target),
            Err(error) => {
                tracing::error!(path = %path.display(), error = %error, "Failed to move document to error directory");
                None
            }
        }
    }

    fn open_run(&self, document: &DocumentRef, file_name: &str) -> Option<Box<dyn ScopedRun>> {
        match self
            .components
            .tracker
            .start_run(&format!("process_{file_name}"))
        {
            Ok(run) => Some(run),
            Err(error) => {
                tracing::warn!(path = %document.path.display(), error = %error, "Experiment tracking unavailable for document");
                None
            }
        }
    }

    async fn process(
        &self,
        document: &DocumentRef,
        file_name: &str,
        run: &mut Option<Box<dyn ScopedRun>>,
    ) -> Result<DocumentReport, DocumentError> {
        let components = &self.components;
        if let Some(run) = run.as_mut() {
            let settings = components.processor.settings();
            let params = BTreeMap::from([
                ("chunk_size".to_string(), settings.chunk_size.to_string()),
                ("chunk_overlap".to_string(), settings.chunk_overlap.to_string()),
                ("model_name".to_string(), settings.model_name),
                ("source".to_string(), document.source.clone()),
            ]);
            if let Err(error) = run.log_params(&params) {
                tracing::warn!(run_id = %run.run_id(), error = %error, "Failed to log run parameters");
            }
        }

        let object_name = components.object_store.upload(document.path()).await?;

        let started = Instant::now();
        let embedded = self.parse_and_embed(document, file_name).await;
        let processing_time = started.elapsed();
        components.metrics.observe_processing_time(processing_time);
        let mut records = embedded?;

        if records.is_empty() {
            return Err(DocumentError::EmptyDocument {
                path: document.path.clone(),
            });
        }
        for record in &mut records {
            record.metadata.source = Some(document.source.clone());
            record.metadata.file_name = Some(file_name.to_string());
        }
        components.vector_index.upsert(&records).await?;

        if let Some(run) = run.as_mut() {
            let metrics = BTreeMap::from([
                ("processing_time".to_string(), processing_time.as_secs_f64()),
                ("num_chunks".to_string(), records.len() as f64),
                ("avg_chunk_length".to_string(), average_chunk_length(&records)),
            ]);
            if let Err(error) = run.log_metrics(&metrics) {
                tracing::warn!(run_id = %run.run_id(), error = %error, "Failed to log run metrics");
            }
        }
        components.metrics.record_document_processed();
        components.metrics.record_vector_store_operation("insert");

        Ok(DocumentReport {
            object_name,
            chunk_count: records.len(),
            processing_time,
        })
    }

    async fn parse_and_embed(
        &self,
        document: &DocumentRef,
        file_name: &str,
    ) -> Result<Vec<ChunkRecord>, DocumentError> {
        let bytes = tokio::fs::read(document.path())
            .await
            .map_err(|source| DocumentError::Read {
                path: document.path.clone(),
                source,
            })?;
        let info = ExtraInfo {
            file_name: file_name.to_string(),
            source: document.source.clone(),
        };
        let text = self.components.parser.parse(&bytes, &info)?;
        Ok(self.components.processor.process(&text).await?)
    }
}

fn close_run(run: Option<Box<dyn ScopedRun>>, status: RunStatus) {
    if let Some(run) = run {
        let run_id = run.run_id().to_string();
        if let Err(error) = run.finish(status) {
            tracing::warn!(run_id = %run_id, error = %error, "Failed to close tracking run");
        }
    }
}

/// Mean chunk length in characters. Zero for an empty batch.
fn average_chunk_length(records: &[ChunkRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let total: usize = records
        .iter()
        .map(|record| record.content.chars().count())
        .sum();
    total as f64 / records.len() as f64
}
