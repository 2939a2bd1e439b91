use super::{Encoder, EncoderError, Granularity, check_batch};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

/// Pretrained encoder backed by an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEncoder {
    http: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    id: String,
}

impl OpenAiEncoder {
    /// Construct a client for `model`, expecting vectors of `dimension` components.
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        dimension: usize,
    ) -> Result<Self, EncoderError> {
        if api_key.trim().is_empty() {
            return Err(EncoderError::Misconfigured("missing OpenAI API key".into()));
        }
        if dimension == 0 {
            return Err(EncoderError::Misconfigured(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| EncoderError::Misconfigured("invalid OpenAI API key".into()))?;
        headers.insert(AUTHORIZATION, auth);
        let http = Client::builder()
            .user_agent("doc-ingest/embed")
            .default_headers(headers)
            .build()
            .map_err(|error| {
                EncoderError::Misconfigured(format!("failed to build HTTP client: {error}"))
            })?;

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            id: format!("openai:{model}"),
            model,
            dimension,
        })
    }

    // Only the v3 family accepts a requested output size.
    fn requested_dimensions(&self) -> Option<usize> {
        self.model
            .starts_with("text-embedding-3")
            .then_some(self.dimension)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl Encoder for OpenAiEncoder {
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

        let request = EmbeddingRequest {
            model: &self.model,
            input: &texts,
            dimensions: self.requested_dimensions(),
        };
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                EncoderError::GenerationFailed(format!("OpenAI request failed: {error}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EncoderError::GenerationFailed(format!(
                "OpenAI embeddings request failed ({status}): {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|error| {
            EncoderError::GenerationFailed(format!("failed to parse OpenAI response: {error}"))
        })?;
        parsed.data.sort_by_key(|entry| entry.index);
        let vectors = parsed.data.into_iter().map(|entry| entry.embedding).collect();
        check_batch(vectors, texts.len(), self.dimension)
    }
}
