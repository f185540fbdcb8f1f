//! In-memory collaborators for pipeline unit tests.

use super::document::PipelineComponents;
use crate::embedding::HashingEmbeddingClient;
use crate::metrics::PipelineMetrics;
use crate::processing::{
    ChunkRecord, DocumentParser, DocumentProcessor, ExtraInfo, ParseError, TextParser,
};
use crate::storage::{LocalObjectStore, VectorIndex, VectorIndexError};
use crate::tracking::{ExperimentTracker, JsonlExperimentTracker, ScopedRun, TrackingError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub(crate) struct RecordingIndex {
    pub(crate) batches: Mutex<Vec<Vec<ChunkRecord>>>,
}

impl RecordingIndex {
    pub(crate) fn batches(&self) -> Vec<Vec<ChunkRecord>> {
        self.batches.lock().expect("batches").clone()
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<(), VectorIndexError> {
        self.batches.lock().expect("batches").push(records.to_vec());
        Ok(())
    }
}

pub(crate) struct RejectingIndex;

#[async_trait]
impl VectorIndex for RejectingIndex {
    async fn upsert(&self, _records: &[ChunkRecord]) -> Result<(), VectorIndexError> {
        Err(VectorIndexError::Rejected("read-only collection".into()))
    }
}

/// Fails on documents whose text contains `poison`, parses everything else as text.
pub(crate) struct PoisonParser;

impl DocumentParser for PoisonParser {
    fn parse(&self, bytes: &[u8], info: &ExtraInfo) -> Result<String, ParseError> {
        let text = TextParser.parse(bytes, info)?;
        if text.contains("poison") {
            return Err(ParseError::Unsupported(info.file_name.clone()));
        }
        Ok(text)
    }
}

pub(crate) struct PanickingParser;

impl DocumentParser for PanickingParser {
    fn parse(&self, _bytes: &[u8], _info: &ExtraInfo) -> Result<String, ParseError> {
        panic!("parser exploded");
    }
}

pub(crate) struct OfflineTracker;

impl ExperimentTracker for OfflineTracker {
    fn start_run(&self, _run_name: &str) -> Result<Box<dyn ScopedRun>, TrackingError> {
        Err(TrackingError::Unavailable("tracking server offline".into()))
    }
}

pub(crate) struct Harness {
    pub(crate) components: PipelineComponents,
    pub(crate) index: Arc<RecordingIndex>,
    pub(crate) tracker: Arc<JsonlExperimentTracker>,
    pub(crate) metrics: Arc<PipelineMetrics>,
}

pub(crate) fn harness(workdir: &Path, parser: Arc<dyn DocumentParser>) -> Harness {
    let index = Arc::new(RecordingIndex::default());
    let tracker = Arc::new(
        JsonlExperimentTracker::new(workdir.join("runs"), "ingest").expect("tracker"),
    );
    let metrics = Arc::new(PipelineMetrics::new());
    let processor = DocumentProcessor::new(Box::new(HashingEmbeddingClient::new(8)), 5, 1, "hashing")
        .expect("processor");
    let components = PipelineComponents {
        parser,
        processor: Arc::new(processor),
        vector_index: index.clone(),
        object_store: Arc::new(LocalObjectStore::new(workdir.join("objects"), "documents")),
        tracker: tracker.clone(),
        metrics: metrics.clone(),
    };
    Harness {
        components,
        index,
        tracker,
        metrics,
    }
}
