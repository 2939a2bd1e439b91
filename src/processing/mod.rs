//! Document processing pipeline: path resolution, extraction, chunking, encoding, summaries.

pub mod chunking;
mod service;
pub mod types;

pub use chunking::{Chunk, chunk_text};
pub use service::{Pipeline, PipelineSettings};
pub use types::{ChunkingError, ProcessedFile, ProcessingError};
