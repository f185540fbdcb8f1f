//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// A chunk's vector does not match the collection's vector size.
    #[error("Vector dimension mismatch for chunk {chunk_id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Offending chunk.
        chunk_id: usize,
        /// Collection vector size.
        expected: usize,
        /// Vector length supplied.
        actual: usize,
    },
}
