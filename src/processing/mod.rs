//! Document processing: parsing, chunking, and embedding.

pub mod chunking;
pub mod parser;
mod processor;
pub mod types;

pub use parser::{DocumentParser, TextParser};
pub use processor::{ChunkEmbedder, DocumentProcessor};
pub use types::{
    ChunkMetadata, ChunkRecord, ChunkingError, ExtraInfo, ParseError, ProcessingError,
    ProcessorSettings,
};
