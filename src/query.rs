//! Query-time encoding.
//!
//! Queries go through the same frozen encoder instance the worker uses, so a query vector lives
//! in the same coordinate space as the stored vectors it is compared with.

use crate::embedding::{Encoder, EncoderError};
use crate::jobs::EmbeddingRecord;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while encoding a query or comparing it with stored vectors.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Query text was empty or whitespace.
    #[error("Query text must not be empty")]
    EmptyQuery,
    /// The caller asked for an encoder other than the active one.
    #[error("Encoder '{requested}' is not active (active encoder is '{active}')")]
    EncoderMismatch {
        /// Identifier requested by the caller or carried by a stored record.
        requested: String,
        /// Identifier of the active encoder.
        active: String,
    },
    /// Vector lengths differ.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Length of the query vector.
        expected: usize,
        /// Length of the other vector.
        actual: usize,
    },
    /// Encoder failed to produce a vector.
    #[error(transparent)]
    Encoding(#[from] EncoderError),
}

/// A query vector tagged with the encoder that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryVector {
    /// Identifier of the producing encoder.
    pub encoder_id: String,
    /// Vector components.
    pub vector: Vec<f32>,
}

impl QueryVector {
    /// Reject stored records that were not produced by the same encoder in the same space.
    pub fn ensure_comparable(&self, record: &EmbeddingRecord) -> Result<(), QueryError> {
        if record.model != self.encoder_id {
            return Err(QueryError::EncoderMismatch {
                requested: record.model.clone(),
                active: self.encoder_id.clone(),
            });
        }
        if record.vector.len() != self.vector.len() {
            return Err(QueryError::DimensionMismatch {
                expected: self.vector.len(),
                actual: record.vector.len(),
            });
        }
        Ok(())
    }

    /// Cosine similarity against a comparable stored record.
    pub fn similarity(&self, record: &EmbeddingRecord) -> Result<f32, QueryError> {
        self.ensure_comparable(record)?;
        let dot: f32 = self
            .vector
            .iter()
            .zip(&record.vector)
            .map(|(a, b)| a * b)
            .sum();
        let norm = |values: &[f32]| values.iter().map(|v| v * v).sum::<f32>().sqrt();
        let denominator = norm(&self.vector) * norm(&record.vector);
        Ok(if denominator > 0.0 { dot / denominator } else { 0.0 })
    }
}

/// Encodes ad-hoc query text with the active encoder.
#[derive(Clone)]
pub struct QueryEncoder {
    encoder: Arc<dyn Encoder>,
}

impl QueryEncoder {
    /// Wrap the process-wide encoder.
    pub fn new(encoder: Arc<dyn Encoder>) -> Self {
        Self { encoder }
    }

    /// Identifier of the active encoder.
    pub fn encoder_id(&self) -> &str {
        self.encoder.encoder_id()
    }

    /// Encode `text`. When `encoder_id` is given it must name the active encoder.
    pub async fn encode_query(
        &self,
        text: &str,
        encoder_id: Option<&str>,
    ) -> Result<QueryVector, QueryError> {
        if let Some(requested) = encoder_id.filter(|id| *id != self.encoder.encoder_id()) {
            return Err(QueryError::EncoderMismatch {
                requested: requested.to_string(),
                active: self.encoder.encoder_id().to_string(),
            });
        }
        if text.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let mut vectors = self.encoder.encode(vec![text.to_string()]).await?;
        let vector = vectors.pop().ok_or(EncoderError::CountMismatch {
            expected: 1,
            actual: 0,
        })?;
        if vector.len() != self.encoder.dimension() {
            return Err(QueryError::DimensionMismatch {
                expected: self.encoder.dimension(),
                actual: vector.len(),
            });
        }

        tracing::debug!(
            encoder = self.encoder.encoder_id(),
            dimension = vector.len(),
            "Encoded query"
        );
        Ok(QueryVector {
            encoder_id: self.encoder.encoder_id().to_string(),
            vector,
        })
    }
}
