//! Best-effort document summaries.
//!
//! Summaries never affect a record's terminal status: any provider failure is logged and yields
//! an empty summary. Input is truncated before it reaches a provider. The Ollama-backed client
//! mirrors the embedding adapter by issuing HTTP requests directly to the runtime; the extractive
//! provider keeps leading sentences and needs no model.

use crate::config::{Config, SummarizationProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors surfaced while attempting summarization.
#[derive(Debug, Error)]
pub enum SummarizationError {
    /// Provider was explicitly disabled or unreachable.
    #[error("Summarization provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate summary: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Configuration does not describe a usable provider.
    #[error("Summarization misconfigured: {0}")]
    Misconfigured(String),
}

/// Request payload passed to the summarization provider.
#[derive(Debug, Clone)]
pub struct SummarizationRequest {
    /// Fully qualified model identifier understood by the provider.
    pub model: String,
    /// Prompt assembled from the document text.
    pub prompt: String,
    /// Maximum word budget requested by the caller.
    pub max_words: usize,
}

/// Interface implemented by abstractive summarization providers.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    /// Generate a concise summary using the configured model.
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationError>;
}

enum Backend {
    Disabled,
    Extractive,
    Abstractive {
        client: Arc<dyn SummarizationClient>,
        model: String,
    },
}

/// Summarizer selected once from configuration.
pub struct Summarizer {
    backend: Backend,
    max_input_chars: usize,
    max_words: usize,
}

impl Summarizer {
    /// Summarizer that always returns an empty summary.
    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
            max_input_chars: 0,
            max_words: 0,
        }
    }

    /// Extractive summarizer keeping leading sentences within `max_words`.
    pub fn extractive(max_input_chars: usize, max_words: usize) -> Self {
        Self {
            backend: Backend::Extractive,
            max_input_chars,
            max_words,
        }
    }

    /// Abstractive summarizer over an arbitrary client.
    pub fn abstractive(
        client: Arc<dyn SummarizationClient>,
        model: String,
        max_input_chars: usize,
        max_words: usize,
    ) -> Self {
        Self {
            backend: Backend::Abstractive { client, model },
            max_input_chars,
            max_words,
        }
    }

    /// Build the summarizer selected by configuration.
    pub fn from_config(config: &Config) -> Result<Self, SummarizationError> {
        let summarizer = match config.summarization_provider {
            SummarizationProvider::None => Self::disabled(),
            SummarizationProvider::Extractive => {
                Self::extractive(config.summary_max_input_chars, config.summary_max_words)
            }
            SummarizationProvider::Ollama => {
                let model = config.summarization_model.clone().ok_or_else(|| {
                    SummarizationError::Misconfigured(
                        "SUMMARIZATION_MODEL is required for the ollama provider".into(),
                    )
                })?;
                let base_url = config
                    .ollama_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
                Self::abstractive(
                    Arc::new(OllamaSummarizationClient::new(base_url)?),
                    model,
                    config.summary_max_input_chars,
                    config.summary_max_words,
                )
            }
        };
        Ok(summarizer)
    }

    /// Whether this summarizer ever produces output.
    pub fn is_enabled(&self) -> bool {
        !matches!(self.backend, Backend::Disabled)
    }

    /// Summarize `text`. Returns an empty string when disabled or on any failure.
    pub async fn summarize(&self, text: &str) -> String {
        let input = truncate_chars(text.trim(), self.max_input_chars);
        if input.is_empty() {
            return String::new();
        }

        match &self.backend {
            Backend::Disabled => String::new(),
            Backend::Extractive => build_extractive_summary(input, self.max_words),
            Backend::Abstractive { client, model } => {
                let request = SummarizationRequest {
                    model: model.clone(),
                    prompt: build_prompt(input, self.max_words),
                    max_words: self.max_words,
                };
                match client.generate_summary(request).await {
                    Ok(summary) => summary,
                    Err(error) => {
                        tracing::warn!(%error, model = %model, "Summarization failed; storing empty summary");
                        String::new()
                    }
                }
            }
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

fn build_prompt(text: &str, max_words: usize) -> String {
    format!(
        "System: You summarize documents into a concise, factual paragraph. Avoid speculation. Return at most {max_words} words.\n\nSummarize the following document:\n\n{text}\n"
    )
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
}

/// Build a deterministic extractive summary bounded by a word budget.
pub(crate) fn build_extractive_summary(text: &str, max_words: usize) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut used_words = 0usize;

    for sentence in sentences(text) {
        let words = count_words(sentence);
        if used_words + words > max_words {
            break;
        }
        used_words += words;
        kept.push(sentence);
    }

    if kept.is_empty() {
        // Opening sentence alone exceeds the budget.
        return text
            .split_whitespace()
            .take(max_words)
            .collect::<Vec<_>>()
            .join(" ");
    }

    kept.join(" ")
}

struct OllamaSummarizationClient {
    http: Client,
    base_url: String,
}

impl OllamaSummarizationClient {
    fn new(base_url: String) -> Result<Self, SummarizationError> {
        let http = Client::builder()
            .user_agent("doc-ingest/summary")
            .build()
            .map_err(|error| {
                SummarizationError::Misconfigured(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl SummarizationClient for OllamaSummarizationClient {
    async fn generate_summary(
        &self,
        request: SummarizationRequest,
    ) -> Result<String, SummarizationError> {
        let payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                SummarizationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SummarizationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            SummarizationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(SummarizationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}
