//! Storage seams: the vector index that receives chunks and the object store that archives raw
//! documents.

mod object_store;

pub use object_store::{LocalObjectStore, ObjectStore, ObjectStoreError};

use crate::processing::ChunkRecord;
use crate::qdrant::QdrantError;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by vector index backends.
#[derive(Debug, Error)]
pub enum VectorIndexError {
    /// Qdrant rejected or failed the request.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Backend refused the batch for a reason of its own.
    #[error("Vector index rejected batch: {0}")]
    Rejected(String),
}

/// Destination for embedded chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace all `records` of one document in a single batch.
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<(), VectorIndexError>;
}
