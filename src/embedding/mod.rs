//! Vector encoders.
//!
//! One encoder is chosen per process from configuration and shared by the worker pool and the
//! query entrypoint. Every encoder carries an identifier; vectors are only comparable when their
//! identifiers match.

mod hashing;
mod ollama;
mod openai;
pub mod tfidf;

pub use hashing::HashingEncoder;
pub use ollama::OllamaEncoder;
pub use openai::OpenAiEncoder;
pub use tfidf::{TfIdfEncoder, TfIdfModel};

use crate::config::{EncoderConfig, EncoderStrategy};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors raised by encoders.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider returned vectors of an unexpected length.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the encoder is configured for.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },
    /// Provider returned a different number of vectors than inputs.
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch {
        /// Number of input texts.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// Persisted encoder state could not be read, written, or fitted.
    #[error("Encoder state error: {0}")]
    State(String),
    /// Configuration does not describe a usable encoder.
    #[error("Encoder misconfigured: {0}")]
    Misconfigured(String),
}

/// Whether an encoder stores one vector per chunk or one per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Text is split into overlapping windows; one vector per window.
    Chunked,
    /// One vector for the whole document.
    WholeDocument,
}

/// Interface implemented by encoding strategies.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Identifier stored alongside every vector this encoder produces.
    fn encoder_id(&self) -> &str;

    /// Length of every produced vector.
    fn dimension(&self) -> usize;

    /// Storage granularity used at ingestion time.
    fn granularity(&self) -> Granularity;

    /// Produce one vector per supplied text, in order.
    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EncoderError>;
}

/// Build the encoder selected by configuration.
///
/// Called once at startup; the result is injected into the pipeline and the query encoder.
pub fn build_encoder(config: &EncoderConfig) -> Result<Arc<dyn Encoder>, EncoderError> {
    let encoder: Arc<dyn Encoder> = match config.strategy {
        EncoderStrategy::Hashing => Arc::new(HashingEncoder::new(config.dimension)?),
        EncoderStrategy::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Arc::new(OllamaEncoder::new(
                base_url,
                config.model.clone(),
                config.dimension,
            )?)
        }
        EncoderStrategy::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                EncoderError::Misconfigured("OPENAI_API_KEY is required".to_string())
            })?;
            Arc::new(OpenAiEncoder::new(
                config.openai_base_url.clone(),
                api_key,
                config.model.clone(),
                config.dimension,
            )?)
        }
        EncoderStrategy::TfIdf => {
            let encoder = TfIdfEncoder::load(&config.state_path)?;
            if config.dimension != 0 && config.dimension != encoder.dimension() {
                return Err(EncoderError::DimensionMismatch {
                    expected: config.dimension,
                    actual: encoder.dimension(),
                });
            }
            Arc::new(encoder)
        }
    };

    tracing::info!(
        encoder = encoder.encoder_id(),
        dimension = encoder.dimension(),
        granularity = ?encoder.granularity(),
        "Encoder initialized"
    );
    Ok(encoder)
}

/// Validate a provider response against the request size and the configured dimension.
pub(crate) fn check_batch(
    vectors: Vec<Vec<f32>>,
    expected_count: usize,
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>, EncoderError> {
    if vectors.len() != expected_count {
        return Err(EncoderError::CountMismatch {
            expected: expected_count,
            actual: vectors.len(),
        });
    }
    if let Some(bad) = vectors
        .iter()
        .find(|vector| vector.len() != expected_dimension)
    {
        return Err(EncoderError::DimensionMismatch {
            expected: expected_dimension,
            actual: bad.len(),
        });
    }
    Ok(vectors)
}
