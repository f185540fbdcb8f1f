//! Ingestion pipeline: a shared FIFO fed by source handlers and drained by one worker that
//! archives, parses, embeds, and indexes each document before filing it under `processed/` or
//! `error/`.

mod document;
mod orchestrator;
mod queue;
mod router;
mod types;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use document::{DocumentOutcome, PipelineComponents};
pub use orchestrator::{DocumentIngestionPipeline, PipelineOptions};
pub use queue::ProcessingQueue;
pub use router::{Disposition, RouteError, route_document, terminal_directory};
pub use types::{DocumentError, DocumentRef, PipelineError, ShutdownError};
