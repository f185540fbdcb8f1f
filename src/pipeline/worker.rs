//! Single consumer draining the processing queue.

use super::document::{DocumentOutcome, DocumentTask};
use super::queue::ProcessingQueue;
use super::types::{DocumentError, DocumentRef};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Pops documents one at a time and runs the document routine on each.
///
/// The stop flag is checked between documents, so a document that has been popped is always
/// routed before the worker exits. Documents still queued at that point stay where they are on
/// disk.
pub(crate) struct ProcessingWorker {
    queue: ProcessingQueue,
    task: Arc<DocumentTask>,
    should_stop: Arc<AtomicBool>,
    poll_timeout: Duration,
}

impl ProcessingWorker {
    pub(crate) fn new(
        queue: ProcessingQueue,
        task: Arc<DocumentTask>,
        should_stop: Arc<AtomicBool>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            task,
            should_stop,
            poll_timeout,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        tracing::info!("Processing worker started");
        while !self.should_stop.load(Ordering::SeqCst) {
            let Some(document) = self.queue.pop(self.poll_timeout).await else {
                continue;
            };
            let outcome = self.process_one(document).await;
            tracing::debug!(?outcome, "Document finished");
            self.queue.task_done();
        }
        tracing::info!(
            unfinished = self.queue.unfinished(),
            "Processing worker stopped"
        );
    }

    /// Run the routine in its own task so a panic fails only this document.
    async fn process_one(&self, document: DocumentRef) -> DocumentOutcome {
        let task = Arc::clone(&self.task);
        let routine_document = document.clone();
        let routine = tokio::spawn(async move { task.handle(&routine_document).await });
        match routine.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                let error = DocumentError::Panicked(join_error.to_string());
                self.task.recover(&document, &error).await
            }
        }
    }
}
