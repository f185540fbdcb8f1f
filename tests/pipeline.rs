use async_trait::async_trait;
use docflow::embedding::HashingEmbeddingClient;
use docflow::metrics::PipelineMetrics;
use docflow::pipeline::{DocumentIngestionPipeline, PipelineComponents, PipelineError, PipelineOptions};
use docflow::processing::{ChunkRecord, DocumentProcessor, TextParser};
use docflow::sources::{ApiSourceHandler, FolderSourceHandler, HttpDocumentFetcher};
use docflow::storage::{LocalObjectStore, VectorIndex, VectorIndexError};
use docflow::tracking::JsonlExperimentTracker;
use httpmock::{Method::GET, MockServer};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Default)]
struct RecordingIndex {
    batches: Mutex<Vec<Vec<ChunkRecord>>>,
}

impl RecordingIndex {
    fn files_in_order(&self) -> Vec<String> {
        self.batches
            .lock()
            .expect("batches")
            .iter()
            .map(|batch| batch[0].metadata.file_name.clone().expect("file name"))
            .collect()
    }
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<(), VectorIndexError> {
        self.batches.lock().expect("batches").push(records.to_vec());
        Ok(())
    }
}

struct Running {
    pipeline: DocumentIngestionPipeline,
    task: JoinHandle<Result<(), PipelineError>>,
    index: Arc<RecordingIndex>,
    metrics: Arc<PipelineMetrics>,
    _workdir: tempfile::TempDir,
}

impl Running {
    async fn shutdown(self) {
        self.pipeline.stop().await;
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("run returns after stop")
            .expect("run task")
            .expect("run result");
    }
}

fn build_pipeline(index: Arc<RecordingIndex>, metrics: Arc<PipelineMetrics>, workdir: &Path) -> DocumentIngestionPipeline {
    let processor = DocumentProcessor::new(Box::new(HashingEmbeddingClient::new(16)), 4, 1, "hashing")
        .expect("processor");
    let components = PipelineComponents {
        parser: Arc::new(TextParser),
        processor: Arc::new(processor),
        vector_index: index,
        object_store: Arc::new(LocalObjectStore::new(workdir.join("objects"), "documents")),
        tracker: Arc::new(JsonlExperimentTracker::new(workdir.join("runs"), "it").expect("tracker")),
        metrics,
    };
    DocumentIngestionPipeline::new(
        components,
        PipelineOptions {
            control_poll_interval: Duration::from_millis(20),
            queue_poll_timeout: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(2),
            handle_interrupt: false,
        },
    )
}

fn start_folder_pipeline(watch: &Path) -> Running {
    let workdir = tempfile::tempdir().expect("workdir");
    let index = Arc::new(RecordingIndex::default());
    let metrics = Arc::new(PipelineMetrics::new());
    let pipeline = build_pipeline(index.clone(), metrics.clone(), workdir.path());
    pipeline
        .add_source_handler(
            "folder",
            Arc::new(FolderSourceHandler::new(watch, ["txt".to_string(), "md".to_string()])),
        )
        .expect("register folder");
    let task = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run().await })
    };
    Running {
        pipeline,
        task,
        index,
        metrics,
        _workdir: workdir,
    }
}

/// Write under an unsupported name, then rename into place so the watcher sees a complete file.
fn drop_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let staging = dir.join(format!(".{name}.partial"));
    std::fs::write(&staging, contents).expect("write");
    let target = dir.join(name);
    std::fs::rename(&staging, &target).expect("rename");
    target
}

async fn wait_for(path: &Path) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !path.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", path.display()));
}

fn assert_routed_exactly_once(watch: &Path, name: &str) {
    let processed = watch.join("processed").join(name).exists();
    let failed = watch.join("error").join(name).exists();
    assert!(!watch.join(name).exists(), "{name} left in the watch directory");
    assert!(processed ^ failed, "{name} must land in exactly one terminal directory");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn existing_file_is_ingested_on_startup() {
    let watch = tempfile::tempdir().expect("watch");
    std::fs::write(
        watch.path().join("a.txt"),
        "the quick brown fox jumps over the lazy dog",
    )
    .expect("write");

    let running = start_folder_pipeline(watch.path());
    wait_for(&watch.path().join("processed").join("a.txt")).await;

    let batches = running.index.batches.lock().expect("batches").clone();
    assert_eq!(batches.len(), 1);
    let chunks = &batches[0];
    assert_eq!(chunks.len(), 3);
    for (position, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.metadata.chunk_id, position);
        assert_eq!(chunk.metadata.source.as_deref(), Some("folder"));
        assert_eq!(chunk.metadata.file_name.as_deref(), Some("a.txt"));
        assert_eq!(chunk.embedding.len(), 16);
    }
    assert_eq!(running.metrics.snapshot().documents_processed, 1);

    running.shutdown().await;
    assert_routed_exactly_once(watch.path(), "a.txt");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undecodable_file_goes_to_error_without_upsert() {
    let watch = tempfile::tempdir().expect("watch");
    let running = start_folder_pipeline(watch.path());

    drop_file(watch.path(), "broken.txt", &[0x66, 0x6f, 0xff, 0xfe, 0x6f]);
    wait_for(&watch.path().join("error").join("broken.txt")).await;

    assert!(running.index.files_in_order().is_empty());
    assert_eq!(running.metrics.snapshot().documents_failed, 1);
    running.shutdown().await;
    assert_routed_exactly_once(watch.path(), "broken.txt");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn files_are_processed_in_arrival_order() {
    let watch = tempfile::tempdir().expect("watch");
    let running = start_folder_pipeline(watch.path());
    tokio::time::sleep(Duration::from_millis(100)).await;

    drop_file(watch.path(), "b.txt", b"bravo content");
    drop_file(watch.path(), "c.md", b"charlie content");
    wait_for(&watch.path().join("processed").join("b.txt")).await;
    wait_for(&watch.path().join("processed").join("c.md")).await;

    assert_eq!(running.index.files_in_order(), vec!["b.txt", "c.md"]);
    running.shutdown().await;
    assert_routed_exactly_once(watch.path(), "b.txt");
    assert_routed_exactly_once(watch.path(), "c.md");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blank_file_is_routed_to_error() {
    let watch = tempfile::tempdir().expect("watch");
    std::fs::write(watch.path().join("blank.txt"), "  \n  ").expect("write");

    let running = start_folder_pipeline(watch.path());
    wait_for(&watch.path().join("error").join("blank.txt")).await;

    assert!(running.index.files_in_order().is_empty());
    running.shutdown().await;
    assert_routed_exactly_once(watch.path(), "blank.txt");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsupported_files_are_left_alone() {
    let watch = tempfile::tempdir().expect("watch");
    std::fs::write(watch.path().join("image.png"), [0u8, 1, 2]).expect("write");
    std::fs::write(watch.path().join("note.txt"), "keep me").expect("write");

    let running = start_folder_pipeline(watch.path());
    wait_for(&watch.path().join("processed").join("note.txt")).await;
    running.shutdown().await;

    assert!(watch.path().join("image.png").exists());
    assert!(!watch.path().join("processed").join("image.png").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_is_idempotent_and_final() {
    let watch = tempfile::tempdir().expect("watch");
    let running = start_folder_pipeline(watch.path());
    tokio::time::sleep(Duration::from_millis(100)).await;

    running.pipeline.stop().await;
    running.pipeline.stop().await;
    assert!(running.pipeline.is_stopped());

    drop_file(watch.path(), "late.txt", b"arrived after stop");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(watch.path().join("late.txt").exists(), "no processing after stop");

    let pipeline = running.pipeline.clone();
    running.shutdown().await;
    assert!(matches!(pipeline.run().await, Err(PipelineError::Stopped)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_watch_directory_fails_run() {
    let workdir = tempfile::tempdir().expect("workdir");
    let pipeline = build_pipeline(
        Arc::new(RecordingIndex::default()),
        Arc::new(PipelineMetrics::new()),
        workdir.path(),
    );
    pipeline
        .add_source_handler(
            "folder",
            Arc::new(FolderSourceHandler::new(
                workdir.path().join("absent"),
                ["txt".to_string()],
            )),
        )
        .expect("register");

    let error = pipeline.run().await.unwrap_err();

    assert!(matches!(error, PipelineError::HandlerStart { ref name, .. } if name == "folder"));
    assert!(pipeline.is_stopped());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn api_documents_are_ingested_next_to_their_path() {
    let inbox = tempfile::tempdir().expect("inbox");
    let remote = inbox.path().join("remote.txt");
    std::fs::write(&remote, "fetched from the api").expect("write");

    let server = MockServer::start_async().await;
    let listing = server
        .mock_async(|when, then| {
            when.method(GET).path("/documents/new");
            then.status(200)
                .json_body(json!({ "documents": [{ "path": remote }] }));
        })
        .await;

    let workdir = tempfile::tempdir().expect("workdir");
    let index = Arc::new(RecordingIndex::default());
    let pipeline = build_pipeline(index.clone(), Arc::new(PipelineMetrics::new()), workdir.path());
    let fetcher = HttpDocumentFetcher::new(server.url("/documents/new")).expect("fetcher");
    pipeline
        .add_source_handler(
            "api",
            Arc::new(ApiSourceHandler::new(Arc::new(fetcher), Duration::from_secs(60))),
        )
        .expect("register api");
    let task = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.run().await })
    };

    wait_for(&inbox.path().join("processed").join("remote.txt")).await;
    pipeline.stop().await;
    task.await.expect("run task").expect("run result");

    listing.assert_async().await;
    let batches = index.batches.lock().expect("batches").clone();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][0].metadata.source.as_deref(), Some("api"));
}
