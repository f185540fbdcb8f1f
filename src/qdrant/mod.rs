//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantVectorIndex;
pub use payload::{compute_chunk_hash, stable_point_id};
pub use types::QdrantError;
