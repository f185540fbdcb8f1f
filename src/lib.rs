#![deny(missing_docs)]

//! Core library for the docflow document ingestion pipeline.
//!
//! Source handlers discover documents (a watched folder, a polled API) and push them onto a
//! shared queue. A single worker archives each document, parses and chunks it, embeds the
//! chunks, upserts them into Qdrant, records a tracking run, and files the document under
//! `processed/` or `error/`.

/// Observability HTTP endpoints.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics.
pub mod metrics;
/// Queue, worker, and orchestration of document ingestion.
pub mod pipeline;
/// Parsing, chunking, and embedding of document text.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Document source handlers.
pub mod sources;
/// Vector index and object store abstractions.
pub mod storage;
mod sync;
/// Experiment run tracking.
pub mod tracking;
