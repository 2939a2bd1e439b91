use super::{Encoder, EncoderError, Granularity, check_batch};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Pretrained encoder backed by a local Ollama runtime (`/api/embed`).
pub struct OllamaEncoder {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
    id: String,
}

impl OllamaEncoder {
    /// Construct a client for `model`, expecting vectors of `dimension` components.
    pub fn new(base_url: String, model: String, dimension: usize) -> Result<Self, EncoderError> {
        if dimension == 0 {
            return Err(EncoderError::Misconfigured(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        let http = Client::builder()
            .user_agent("doc-ingest/embed")
            .build()
            .map_err(|error| {
                EncoderError::Misconfigured(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            http,
            base_url,
            id: format!("ollama:{model}"),
            model,
            dimension,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Encoder for OllamaEncoder {
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
        let expected = texts.len();
        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EncoderError::GenerationFailed(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(EncoderError::GenerationFailed(format!(
                "Ollama endpoint {} returned 404 (is model '{}' pulled?)",
                self.endpoint(),
                self.model
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EncoderError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(|error| {
            EncoderError::GenerationFailed(format!("failed to decode Ollama response: {error}"))
        })?;

        check_batch(body.embeddings, expected, self.dimension)
    }
}
