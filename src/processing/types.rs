//! Core data types and error definitions for the processing pipeline.

use crate::embedding::EncoderError;
use crate::jobs::{EmbeddingRecord, Outcome};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while splitting text into windows.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible window size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would keep the window from advancing.
    #[error("chunk overlap {overlap} must be smaller than chunk size {size}")]
    InvalidOverlap {
        /// Configured window size.
        size: usize,
        /// Configured overlap.
        overlap: usize,
    },
}

/// Per-record failures. Each one finalizes the record as `error`; none stops the worker.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The record's path does not exist.
    #[error("File not found: {0}")]
    MissingFile(PathBuf),
    /// Extraction produced no usable text.
    #[error("No text could be extracted")]
    NoText,
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Encoder failed to produce vectors for the input text.
    #[error("Failed to encode document: {0}")]
    Encoding(#[from] EncoderError),
    /// A backend panicked while the record was being processed.
    #[error("Processing task aborted: {0}")]
    Panicked(String),
}

/// Everything produced for one record, ready to be finalized as `ready`.
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    /// Leading slice of the extracted text.
    pub text_preview: String,
    /// Summary, absent when disabled or when summarization failed.
    pub summary: Option<String>,
    /// One record per chunk, or a single whole-document record.
    pub embeddings: Vec<EmbeddingRecord>,
}

impl ProcessedFile {
    /// Convert into the store outcome.
    pub fn into_outcome(self) -> Outcome {
        Outcome::Ready {
            text_preview: self.text_preview,
            summary: self.summary,
            embeddings: self.embeddings,
        }
    }
}
