use super::{Encoder, EncoderError, Granularity};
use async_trait::async_trait;

/// Deterministic whole-document encoder that hashes bytes into a fixed-size vector.
///
/// Carries no fitted state, so identical text yields bit-identical vectors across calls,
/// workers, and processes.
pub struct HashingEncoder {
    dimension: usize,
    id: String,
}

impl HashingEncoder {
    /// Construct an encoder producing vectors of `dimension` components.
    pub fn new(dimension: usize) -> Result<Self, EncoderError> {
        if dimension == 0 {
            return Err(EncoderError::Misconfigured(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            id: format!("hashing-{dimension}"),
        })
    }

    fn encode_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % self.dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl Encoder for HashingEncoder {
    fn encoder_id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn granularity(&self) -> Granularity {
        Granularity::WholeDocument
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Err(EncoderError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(
            encoder = %self.id,
            inputs = texts.len(),
            "Generating embeddings"
        );
        Ok(texts.iter().map(|text| self.encode_one(text)).collect())
    }
}
