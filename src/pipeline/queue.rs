//! Unbounded FIFO of [`DocumentRef`]s shared by source handlers and the worker.

use super::types::DocumentRef;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};

/// Multi-producer, single-consumer work queue.
///
/// `push` never blocks and may be called from any thread, including non-runtime threads such as
/// filesystem watcher callbacks. Every pushed item counts as unfinished until the consumer calls
/// [`ProcessingQueue::task_done`] for it, which is what [`ProcessingQueue::join`] waits on.
#[derive(Clone)]
pub struct ProcessingQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    sender: mpsc::UnboundedSender<DocumentRef>,
    receiver: Mutex<mpsc::UnboundedReceiver<DocumentRef>>,
    unfinished: AtomicUsize,
    all_done: Notify,
}

impl Default for ProcessingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(QueueInner {
                sender,
                receiver: Mutex::new(receiver),
                unfinished: AtomicUsize::new(0),
                all_done: Notify::new(),
            }),
        }
    }

    /// Append `document` to the tail of the queue.
    pub fn push(&self, document: DocumentRef) {
        self.inner.unfinished.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(path = %document.path.display(), source = %document.source, "Document queued");
        // The receiver lives as long as `inner`, so sending cannot fail while `self` exists.
        if self.inner.sender.send(document).is_err() {
            self.task_done();
        }
    }

    /// Remove the head of the queue, waiting at most `timeout` for one to arrive.
    pub async fn pop(&self, timeout: Duration) -> Option<DocumentRef> {
        let mut receiver = self.inner.receiver.lock().await;
        tokio::time::timeout(timeout, receiver.recv())
            .await
            .ok()
            .flatten()
    }

    /// Mark one previously popped document as fully handled.
    pub fn task_done(&self) {
        let previous = self
            .inner
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            });
        match previous {
            Ok(1) => self.inner.all_done.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!("task_done called more times than documents were queued"),
        }
    }

    /// Wait until every pushed document has been marked done.
    pub async fn join(&self) {
        loop {
            let notified = self.inner.all_done.notified();
            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Documents pushed but not yet marked done, including the one being processed.
    pub fn unfinished(&self) -> usize {
        self.inner.unfinished.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> DocumentRef {
        DocumentRef::new("folder", format!("/watch/{name}"))
    }

    #[tokio::test]
    async fn pops_in_push_order() {
        let queue = ProcessingQueue::new();
        queue.push(doc("a.txt"));
        queue.push(doc("b.txt"));

        let first = queue.pop(Duration::from_millis(10)).await.expect("first");
        let second = queue.pop(Duration::from_millis(10)).await.expect("second");

        assert_eq!(first.file_name(), "a.txt");
        assert_eq!(second.file_name(), "b.txt");
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let queue = ProcessingQueue::new();
        assert!(queue.pop(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn push_from_plain_thread_is_visible() {
        let queue = ProcessingQueue::new();
        let producer = queue.clone();
        std::thread::spawn(move || producer.push(doc("threaded.txt")))
            .join()
            .expect("producer thread");

        let popped = queue.pop(Duration::from_millis(100)).await.expect("doc");
        assert_eq!(popped.file_name(), "threaded.txt");
    }

    #[tokio::test]
    async fn join_waits_for_task_done() {
        let queue = ProcessingQueue::new();
        queue.push(doc("a.txt"));
        assert_eq!(queue.unfinished(), 1);

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.join().await })
        };
        queue.pop(Duration::from_millis(10)).await.expect("doc");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "join must wait while work is unfinished");

        queue.task_done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("join resolves")
            .expect("join task");
        assert_eq!(queue.unfinished(), 0);
    }

    #[tokio::test]
    async fn extra_task_done_does_not_underflow() {
        let queue = ProcessingQueue::new();
        queue.task_done();
        assert_eq!(queue.unfinished(), 0);
        queue.join().await;
    }
}
