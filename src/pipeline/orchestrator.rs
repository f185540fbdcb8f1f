//! The ingestion pipeline: owns the queue, the source handlers, and the worker.

use super::document::{DocumentTask, PipelineComponents};
use super::queue::ProcessingQueue;
use super::types::{PipelineError, ShutdownError};
use super::worker::ProcessingWorker;
use crate::sources::SourceHandler;
use crate::sync::lock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Timing and signal behavior of a [`DocumentIngestionPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// How often the control loop checks the stop flag and the worker.
    pub control_poll_interval: Duration,
    /// How long the worker waits on an empty queue before re-checking the stop flag.
    pub queue_poll_timeout: Duration,
    /// Upper bound for each handler stop and for the worker to finish its current document.
    pub shutdown_timeout: Duration,
    /// Stop on Ctrl-C while [`DocumentIngestionPipeline::run`] is waiting.
    pub handle_interrupt: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            control_poll_interval: Duration::from_secs(1),
            queue_poll_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
            handle_interrupt: true,
        }
    }
}

/// Multi-source document ingestion pipeline.
///
/// Handlers are registered before [`run`](Self::run); `run` starts them in registration order,
/// spawns the single processing worker, and then blocks until [`stop`](Self::stop) is called,
/// an interrupt arrives, or the worker dies. Cloning yields another handle to the same pipeline,
/// which is how callers stop a pipeline that is running on another task.
#[derive(Clone)]
pub struct DocumentIngestionPipeline {
    inner: Arc<PipelineInner>,
}

type RegisteredHandler = (String, Arc<dyn SourceHandler>);

struct PipelineInner {
    options: PipelineOptions,
    queue: ProcessingQueue,
    task: Arc<DocumentTask>,
    should_stop: Arc<AtomicBool>,
    running: AtomicBool,
    handlers: Mutex<Vec<RegisteredHandler>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    // Serializes handler start-up against shutdown.
    lifecycle: tokio::sync::Mutex<()>,
}

enum ControlExit {
    Stopped,
    Interrupted,
}

impl DocumentIngestionPipeline {
    /// Assemble a pipeline around `components`. Nothing starts until [`run`](Self::run).
    pub fn new(components: PipelineComponents, options: PipelineOptions) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                options,
                queue: ProcessingQueue::new(),
                task: Arc::new(DocumentTask::new(components)),
                should_stop: Arc::new(AtomicBool::new(false)),
                running: AtomicBool::new(false),
                handlers: Mutex::new(Vec::new()),
                worker: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Register `handler` under `name` and hand it the pipeline's queue.
    ///
    /// Names are unique. Registration is only possible before `run` and before `stop`.
    pub fn add_source_handler(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn SourceHandler>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if self.is_stopped() {
            return Err(PipelineError::Stopped);
        }
        if self.inner.running.load(Ordering::SeqCst) {
            return Err(PipelineError::Configuration(format!(
                "cannot register '{name}' while the pipeline is running"
            )));
        }

        let mut handlers = lock(&self.inner.handlers);
        if handlers.iter().any(|(existing, _)| *existing == name) {
            return Err(PipelineError::DuplicateHandler(name));
        }
        handler.set_processing_queue(self.inner.queue.clone());
        tracing::info!(handler = %name, kind = handler.kind(), "Registered source handler");
        handlers.push((name, handler));
        Ok(())
    }

    /// Start every handler and the worker, then block until the pipeline stops.
    ///
    /// A handler that fails to start stops the pipeline and is reported as
    /// [`PipelineError::HandlerStart`]. An interrupt (when enabled) stops the pipeline and
    /// returns `Ok`.
    pub async fn run(&self) -> Result<(), PipelineError> {
        if self.is_stopped() {
            return Err(PipelineError::Stopped);
        }
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::Configuration(
                "pipeline is already running".into(),
            ));
        }

        if let Err(error) = self.start().await {
            tracing::error!(error = %error, "Pipeline failed to start");
            self.stop().await;
            return Err(error);
        }
        tracing::info!(
            handlers = ?self.handler_names(),
            "Document ingestion pipeline running"
        );

        match self.wait_for_stop().await {
            Ok(ControlExit::Stopped) => Ok(()),
            Ok(ControlExit::Interrupted) => {
                tracing::info!("Received interrupt, shutting down");
                self.stop().await;
                Ok(())
            }
            Err(error) => {
                tracing::error!(error = %error, "Error in pipeline");
                self.stop().await;
                Err(error)
            }
        }
    }

    /// Stop the handlers, then let the worker finish its current document.
    ///
    /// Only the first call does anything. Each handler and the worker get
    /// [`PipelineOptions::shutdown_timeout`]; overruns and handler errors are logged as warnings.
    pub async fn stop(&self) {
        if self
            .inner
            .should_stop
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Pipeline stop already requested");
            return;
        }
        tracing::info!("Stopping document ingestion pipeline");
        let _lifecycle = self.inner.lifecycle.lock().await;
        let timeout = self.inner.options.shutdown_timeout;

        let handlers = lock(&self.inner.handlers).clone();
        for (name, handler) in handlers {
            let problem = match tokio::time::timeout(timeout, handler.stop()).await {
                Ok(Ok(())) => {
                    tracing::info!(handler = %name, "Source handler stopped");
                    None
                }
                Ok(Err(source)) => Some(ShutdownError::Handler { name, source }),
                Err(_) => Some(ShutdownError::HandlerTimeout { name, timeout }),
            };
            if let Some(problem) = problem {
                tracing::warn!(error = %problem, "Error during shutdown");
            }
        }

        let worker = lock(&self.inner.worker).take();
        if let Some(worker) = worker {
            let problem = match tokio::time::timeout(timeout, worker).await {
                Ok(Ok(())) => None,
                Ok(Err(join_error)) => Some(ShutdownError::WorkerPanicked(join_error.to_string())),
                Err(_) => Some(ShutdownError::WorkerTimeout(timeout)),
            };
            if let Some(problem) = problem {
                tracing::warn!(error = %problem, "Error during shutdown");
            }
        }

        let unfinished = self.inner.queue.unfinished();
        if unfinished > 0 {
            tracing::info!(
                unfinished,
                "Documents left queued; they remain in place for the next run"
            );
        }
        tracing::info!("Pipeline stopped");
    }

    /// Whether [`stop`](Self::stop) has been requested.
    pub fn is_stopped(&self) -> bool {
        self.inner.should_stop.load(Ordering::SeqCst)
    }

    /// Queue shared with every registered handler.
    pub fn queue(&self) -> &ProcessingQueue {
        &self.inner.queue
    }

    /// Registered handler names in registration order.
    pub fn handler_names(&self) -> Vec<String> {
        lock(&self.inner.handlers)
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    async fn start(&self) -> Result<(), PipelineError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.is_stopped() {
            return Err(PipelineError::Stopped);
        }

        let handlers = lock(&self.inner.handlers).clone();
        if handlers.is_empty() {
            return Err(PipelineError::Configuration(
                "no source handlers registered".into(),
            ));
        }
        for (name, handler) in handlers {
            handler
                .start()
                .await
                .map_err(|source| PipelineError::HandlerStart {
                    name: name.clone(),
                    source,
                })?;
            tracing::info!(handler = %name, kind = handler.kind(), "Source handler started");
        }

        let worker = ProcessingWorker::new(
            self.inner.queue.clone(),
            Arc::clone(&self.inner.task),
            Arc::clone(&self.inner.should_stop),
            self.inner.options.queue_poll_timeout,
        )
        .spawn();
        *lock(&self.inner.worker) = Some(worker);
        Ok(())
    }

    async fn wait_for_stop(&self) -> Result<ControlExit, PipelineError> {
        let handle_interrupt = self.inner.options.handle_interrupt;
        let interrupt = async move {
            if handle_interrupt {
                tokio::signal::ctrl_c().await
            } else {
                std::future::pending::<std::io::Result<()>>().await
            }
        };
        tokio::pin!(interrupt);

        loop {
            if self.is_stopped() {
                return Ok(ControlExit::Stopped);
            }
            if self.worker_finished() && !self.is_stopped() {
                return Err(PipelineError::WorkerExited);
            }
            tokio::select! {
                signal = &mut interrupt => {
                    return signal
                        .map(|()| ControlExit::Interrupted)
                        .map_err(PipelineError::Signal);
                }
                _ = tokio::time::sleep(self.inner.options.control_poll_interval) => {}
            }
        }
    }

    fn worker_finished(&self) -> bool {
        lock(&self.inner.worker)
            .as_ref()
            .is_some_and(|worker| worker.is_finished())
    }
}
