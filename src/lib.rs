#![deny(missing_docs)]

//! Core library for the document ingestion worker.

/// Environment-driven configuration management.
pub mod config;
/// Vector encoder abstraction and strategies.
pub mod embedding;
/// Type-dispatched text extraction.
pub mod extraction;
/// Shared job store and claim protocol.
pub mod jobs;
/// Structured logging and tracing setup.
pub mod logging;
/// Worker activity counters.
pub mod metrics;
/// Per-file processing pipeline.
pub mod processing;
/// Query-time encoding against stored vectors.
pub mod query;
/// Optional document summaries.
pub mod summarization;
/// Polling worker loop.
pub mod worker;
