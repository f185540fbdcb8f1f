//! Core data types and error definitions for document processing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while splitting text into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Ingestion configured an impossible chunk budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for at least one new word per chunk.
    #[error("chunk overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidOverlap {
        /// Configured chunk size in words.
        chunk_size: usize,
        /// Configured overlap in words.
        overlap: usize,
    },
}

/// Errors emitted while chunking and embedding a document.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the input text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingClientError),
    /// Provider returned a different number of vectors than chunks requested.
    #[error("Embedding count mismatch: {chunks} chunks, {embeddings} embeddings")]
    EmbeddingCountMismatch {
        /// Number of chunks sent to the provider.
        chunks: usize,
        /// Number of vectors returned.
        embeddings: usize,
    },
}

/// Errors raised while turning raw bytes into text.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document bytes are not valid UTF-8.
    #[error("document '{file_name}' is not valid UTF-8: {source}")]
    InvalidEncoding {
        /// Name of the offending file.
        file_name: String,
        /// Decoder error with the failing byte offset.
        #[source]
        source: std::str::Utf8Error,
    },
    /// The document is not something the parser handles, such as binary content.
    #[error("unsupported document '{0}'")]
    Unsupported(String),
}

/// Per-chunk metadata persisted with each vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Zero-based position of the chunk within its document.
    pub chunk_id: usize,
    /// Source handler that produced the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Base name of the originating file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// A chunk of document text together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Chunk text.
    pub content: String,
    /// Embedding vector for `content`.
    pub embedding: Vec<f32>,
    /// Position and provenance of the chunk.
    pub metadata: ChunkMetadata,
}

/// Context handed to parsers alongside the raw bytes.
#[derive(Debug, Clone, Default)]
pub struct ExtraInfo {
    /// Base name of the document.
    pub file_name: String,
    /// Source handler that produced the document.
    pub source: String,
}

/// Chunking parameters reported into each tracking run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared by neighbouring chunks.
    pub chunk_overlap: usize,
    /// Embedding model name.
    pub model_name: String,
}
