//! Chunking plus embedding, producing ordered [`ChunkRecord`]s.

use super::chunking::{chunk_text, validate_window};
use super::types::{ChunkMetadata, ChunkRecord, ChunkingError, ProcessingError, ProcessorSettings};
use crate::embedding::EmbeddingClient;
use async_trait::async_trait;

/// Turns document text into embedded chunks.
///
/// Implementations must keep chunk order and must not drop chunks: the record at index `i`
/// carries `chunk_id == i`.
#[async_trait]
pub trait ChunkEmbedder: Send + Sync {
    /// Chunk and embed `text`.
    async fn process(&self, text: &str) -> Result<Vec<ChunkRecord>, ProcessingError>;

    /// Parameters logged with every tracking run.
    fn settings(&self) -> ProcessorSettings;
}

/// Default [`ChunkEmbedder`]: word windows embedded in a single batch.
pub struct DocumentProcessor {
    embedding_client: Box<dyn EmbeddingClient>,
    chunk_size: usize,
    chunk_overlap: usize,
    model_name: String,
}

impl DocumentProcessor {
    /// Build a processor, rejecting chunk windows that cannot advance.
    pub fn new(
        embedding_client: Box<dyn EmbeddingClient>,
        chunk_size: usize,
        chunk_overlap: usize,
        model_name: impl Into<String>,
    ) -> Result<Self, ChunkingError> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self {
            embedding_client,
            chunk_size,
            chunk_overlap,
            model_name: model_name.into(),
        })
    }
}

#[async_trait]
impl ChunkEmbedder for DocumentProcessor {
    async fn process(&self, text: &str) -> Result<Vec<ChunkRecord>, ProcessingError> {
        let chunks = chunk_text(text, self.chunk_size, self.chunk_overlap)?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .embedding_client
            .generate_embeddings(chunks.clone())
            .await?;
        if embeddings.len() != chunks.len() {
            return Err(ProcessingError::EmbeddingCountMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        tracing::debug!(
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            overlap = self.chunk_overlap,
            "Document chunked and embedded"
        );

        Ok(chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_id, (content, embedding))| ChunkRecord {
                content,
                embedding,
                metadata: ChunkMetadata {
                    chunk_id,
                    source: None,
                    file_name: None,
                },
            })
            .collect())
    }

    fn settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            model_name: self.model_name.clone(),
        }
    }
}
