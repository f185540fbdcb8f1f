use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Upper bounds (seconds) of the processing-time histogram, matching the Prometheus defaults.
pub const PROCESSING_SECONDS_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Process-wide counters and histograms describing ingestion activity.
///
/// Constructed once at startup and shared through an `Arc`.
pub struct PipelineMetrics {
    documents_processed: AtomicU64,
    documents_failed: AtomicU64,
    vector_store_operations: Mutex<BTreeMap<String, u64>>,
    processing_seconds: Mutex<Histogram>,
}

struct Histogram {
    buckets: [u64; PROCESSING_SECONDS_BUCKETS.len()],
    count: u64,
    sum: f64,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create an empty metrics registry.
    pub fn new() -> Self {
        Self {
            documents_processed: AtomicU64::new(0),
            documents_failed: AtomicU64::new(0),
            vector_store_operations: Mutex::new(BTreeMap::new()),
            processing_seconds: Mutex::new(Histogram {
                buckets: [0; PROCESSING_SECONDS_BUCKETS.len()],
                count: 0,
                sum: 0.0,
            }),
        }
    }

    /// Count a document that reached the `processed/` directory.
    pub fn record_document_processed(&self) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a document routed to `error/`.
    pub fn record_document_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a vector store call labelled by its operation type (e.g. `insert`).
    pub fn record_vector_store_operation(&self, operation_type: &str) {
        let mut operations = self
            .vector_store_operations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *operations.entry(operation_type.to_string()).or_insert(0) += 1;
    }

    /// Observe the wall-clock time spent parsing, chunking, and embedding one document.
    pub fn observe_processing_time(&self, elapsed: Duration) {
        let seconds = elapsed.as_secs_f64();
        let mut histogram = self
            .processing_seconds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (bucket, upper) in histogram
            .buckets
            .iter_mut()
            .zip(PROCESSING_SECONDS_BUCKETS.iter())
        {
            if seconds <= *upper {
                *bucket += 1;
            }
        }
        histogram.count += 1;
        histogram.sum += seconds;
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let histogram = self
            .processing_seconds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            vector_store_operations: self
                .vector_store_operations
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
            processing_seconds_count: histogram.count,
            processing_seconds_sum: histogram.sum,
            processing_seconds_buckets: histogram.buckets.to_vec(),
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "# HELP documents_processed_total Number of documents processed"
        );
        let _ = writeln!(out, "# TYPE documents_processed_total counter");
        let _ = writeln!(
            out,
            "documents_processed_total {}",
            snapshot.documents_processed
        );

        let _ = writeln!(
            out,
            "# HELP documents_failed_total Number of documents routed to the error directory"
        );
        let _ = writeln!(out, "# TYPE documents_failed_total counter");
        let _ = writeln!(out, "documents_failed_total {}", snapshot.documents_failed);

        let _ = writeln!(
            out,
            "# HELP vector_store_operations_total Number of vector store operations"
        );
        let _ = writeln!(out, "# TYPE vector_store_operations_total counter");
        for (operation, count) in &snapshot.vector_store_operations {
            let _ = writeln!(
                out,
                "vector_store_operations_total{{operation_type=\"{operation}\"}} {count}"
            );
        }

        let _ = writeln!(
            out,
            "# HELP document_processing_seconds Time spent processing documents"
        );
        let _ = writeln!(out, "# TYPE document_processing_seconds histogram");
        for (upper, count) in PROCESSING_SECONDS_BUCKETS
            .iter()
            .zip(snapshot.processing_seconds_buckets.iter())
        {
            let _ = writeln!(
                out,
                "document_processing_seconds_bucket{{le=\"{upper}\"}} {count}"
            );
        }
        let _ = writeln!(
            out,
            "document_processing_seconds_bucket{{le=\"+Inf\"}} {}",
            snapshot.processing_seconds_count
        );
        let _ = writeln!(
            out,
            "document_processing_seconds_sum {}",
            snapshot.processing_seconds_sum
        );
        let _ = writeln!(
            out,
            "document_processing_seconds_count {}",
            snapshot.processing_seconds_count
        );

        out
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Documents that completed every processing step since startup.
    pub documents_processed: u64,
    /// Documents moved to `error/` since startup.
    pub documents_failed: u64,
    /// Vector store calls keyed by operation type.
    pub vector_store_operations: BTreeMap<String, u64>,
    /// Number of processing-time observations.
    pub processing_seconds_count: u64,
    /// Sum of all processing-time observations in seconds.
    pub processing_seconds_sum: f64,
    /// Cumulative bucket counts aligned with [`PROCESSING_SECONDS_BUCKETS`].
    pub processing_seconds_buckets: Vec<u64>,
}
