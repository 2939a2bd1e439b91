//! Corpus-fit TF-IDF encoder with frozen, persisted state.
//!
//! The vocabulary and inverse document frequencies are fitted once from a reference corpus
//! (`fit-encoder`), written to disk, and loaded unchanged by every worker and every query. The
//! encoder identifier embeds a hash of the persisted state, so vectors from transforms fitted on
//! different corpora never share an identifier.
//!
//! Tokens are lowercased runs of two or more word characters. Weights use the smoothed inverse
//! document frequency `ln((1 + n) / (1 + df)) + 1` and every vector is L2-normalized.

use super::{Encoder, EncoderError, Granularity};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

const STATE_FORMAT_VERSION: u32 = 1;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is valid"));

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    TOKEN_PATTERN
        .find_iter(text)
        .map(|token| token.as_str().to_lowercase())
}

/// Fitted vocabulary and weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfModel {
    format_version: u32,
    documents: usize,
    vocabulary: Vec<String>,
    idf: Vec<f32>,
}

impl TfIdfModel {
    /// Fit a model on `corpus`, one entry per document.
    pub fn fit<S: AsRef<str>>(corpus: &[S]) -> Result<Self, EncoderError> {
        if corpus.is_empty() {
            return Err(EncoderError::State("reference corpus is empty".into()));
        }

        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for document in corpus {
            let mut seen: Vec<String> = tokenize(document.as_ref()).collect();
            seen.sort_unstable();
            seen.dedup();
            for token in seen {
                *document_frequency.entry(token).or_default() += 1;
            }
        }

        if document_frequency.is_empty() {
            return Err(EncoderError::State(
                "reference corpus contains no tokens".into(),
            ));
        }

        let documents = corpus.len();
        let (vocabulary, idf) = document_frequency
            .into_iter()
            .map(|(token, df)| {
                let weight = ((1.0 + documents as f64) / (1.0 + df as f64)).ln() + 1.0;
                (token, weight as f32)
            })
            .unzip();

        Ok(Self {
            format_version: STATE_FORMAT_VERSION,
            documents,
            vocabulary,
            idf,
        })
    }

    /// Number of vocabulary terms, which is also the vector length.
    pub fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    /// Number of documents the model was fitted on.
    pub fn documents(&self) -> usize {
        self.documents
    }

    /// Stable identifier derived from the serialized state.
    pub fn fingerprint(&self) -> Result<String, EncoderError> {
        let bytes = serde_json::to_vec(self)
            .map_err(|error| EncoderError::State(format!("failed to serialize model: {error}")))?;
        let digest = Sha256::digest(&bytes);
        Ok(hex::encode(&digest[..8]))
    }

    /// Write the model as JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), EncoderError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| {
                EncoderError::State(format!("failed to create {}: {error}", parent.display()))
            })?;
        }
        let bytes = serde_json::to_vec(self)
            .map_err(|error| EncoderError::State(format!("failed to serialize model: {error}")))?;
        std::fs::write(path, bytes).map_err(|error| {
            EncoderError::State(format!("failed to write {}: {error}", path.display()))
        })
    }

    /// Read a model previously written by [`TfIdfModel::save`].
    pub fn load(path: &Path) -> Result<Self, EncoderError> {
        let bytes = std::fs::read(path).map_err(|error| {
            EncoderError::State(format!(
                "failed to read encoder state {}: {error} (run fit-encoder first)",
                path.display()
            ))
        })?;
        let model: Self = serde_json::from_slice(&bytes).map_err(|error| {
            EncoderError::State(format!("invalid encoder state {}: {error}", path.display()))
        })?;
        if model.format_version != STATE_FORMAT_VERSION {
            return Err(EncoderError::State(format!(
                "unsupported encoder state version {}",
                model.format_version
            )));
        }
        if model.vocabulary.len() != model.idf.len() {
            return Err(EncoderError::State(
                "vocabulary and weights differ in length".into(),
            ));
        }
        Ok(model)
    }
}

/// Encoder applying a frozen [`TfIdfModel`].
pub struct TfIdfEncoder {
    model: TfIdfModel,
    index: HashMap<String, usize>,
    id: String,
}

impl TfIdfEncoder {
    /// Wrap a fitted model.
    pub fn new(model: TfIdfModel) -> Result<Self, EncoderError> {
        let id = format!("tf-idf:{}", model.fingerprint()?);
        let index = model
            .vocabulary
            .iter()
            .enumerate()
            .map(|(position, token)| (token.clone(), position))
            .collect();
        Ok(Self { model, index, id })
    }

    /// Load persisted state and wrap it.
    pub fn load(path: &Path) -> Result<Self, EncoderError> {
        Self::new(TfIdfModel::load(path)?)
    }

    /// Access the frozen model.
    pub fn model(&self) -> &TfIdfModel {
        &self.model
    }

    /// Encode one text. Terms outside the vocabulary are ignored; text with no known terms
    /// yields the zero vector.
    pub fn transform(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.model.dimension()];
        for token in tokenize(text) {
            if let Some(&position) = self.index.get(&token) {
                vector[position] += 1.0;
            }
        }
        for (value, weight) in vector.iter_mut().zip(&self.model.idf) {
            *value *= weight;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Encoder for TfIdfEncoder {
    fn encoder_id(&self) -> &str {
        &self.id
    }

    fn dimension(&self) -> usize {
        self.model.dimension()
    }

    fn granularity(&self) -> Granularity {
        Granularity::Chunked
    }

    async fn encode(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Err(EncoderError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        Ok(texts.iter().map(|text| self.transform(text)).collect())
    }
}
