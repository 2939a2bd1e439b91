//! Processing service turning one claimed file into embeddings, a preview, and a summary.

use crate::{
    config::Config,
    embedding::{Encoder, EncoderError, Granularity},
    extraction::TextExtractor,
    jobs::{EmbeddingRecord, FileRecord, text_preview},
    processing::{
        chunking::chunk_text,
        types::{ProcessedFile, ProcessingError},
    },
    summarization::Summarizer,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;

/// Tunables applied to every record.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Root that relative record paths are resolved against.
    pub upload_dir: PathBuf,
    /// Window size, in characters, for chunked encoders.
    pub chunk_size: usize,
    /// Overlap, in characters, between consecutive windows.
    pub chunk_overlap: usize,
    /// Maximum number of characters kept in the preview.
    pub text_preview_chars: usize,
}

impl PipelineSettings {
    /// Copy the relevant values out of the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            text_preview_chars: config.text_preview_chars,
        }
    }
}

/// Coordinates extraction, encoding, and summarization for one record at a time.
///
/// Holds long-lived handles built once at startup; share it between worker tasks through an
/// `Arc`. Processing never touches the job store, so the caller decides how to finalize.
pub struct Pipeline {
    extractor: TextExtractor,
    encoder: Arc<dyn Encoder>,
    summarizer: Arc<Summarizer>,
    settings: PipelineSettings,
}

impl Pipeline {
    /// Assemble a pipeline from already-built components.
    pub fn new(
        extractor: TextExtractor,
        encoder: Arc<dyn Encoder>,
        summarizer: Arc<Summarizer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extractor,
            encoder,
            summarizer,
            settings,
        }
    }

    /// Encoder shared with the query entrypoint.
    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    /// Resolve a stored path, treating relative paths as relative to the upload directory.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.settings.upload_dir.join(path)
        }
    }

    /// Process one claimed record.
    pub async fn process(&self, record: &FileRecord) -> Result<ProcessedFile, ProcessingError> {
        let path = self.resolve_path(&record.path);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ProcessingError::MissingFile(path));
        }

        let text = self
            .extractor
            .extract(&path, record.mime_type.as_deref())
            .await;
        if text.trim().is_empty() {
            return Err(ProcessingError::NoText);
        }

        let embeddings = self.encode(record, &text).await?;
        tracing::debug!(
            file_id = %record.id,
            encoder = self.encoder.encoder_id(),
            chunks = embeddings.len(),
            "Encoded document"
        );

        let summary = if self.summarizer.is_enabled() {
            let summary = self.summarizer.summarize(&text).await;
            if summary.is_empty() {
                tracing::debug!(file_id = %record.id, "No summary produced");
            }
            Some(summary).filter(|summary| !summary.is_empty())
        } else {
            None
        };

        Ok(ProcessedFile {
            text_preview: text_preview(&text, self.settings.text_preview_chars),
            summary,
            embeddings,
        })
    }

    async fn encode(
        &self,
        record: &FileRecord,
        text: &str,
    ) -> Result<Vec<EmbeddingRecord>, ProcessingError> {
        let model = self.encoder.encoder_id().to_string();
        let created_at = OffsetDateTime::now_utc();

        let pieces: Vec<(Option<u32>, String)> = match self.encoder.granularity() {
            Granularity::WholeDocument => vec![(None, text.to_string())],
            Granularity::Chunked => chunk_text(
                text,
                self.settings.chunk_size,
                self.settings.chunk_overlap,
            )?
            .into_iter()
            .map(|chunk| (Some(chunk.index), chunk.text))
            .collect(),
        };
        if pieces.is_empty() {
            return Err(ProcessingError::NoText);
        }

        let inputs: Vec<String> = pieces.iter().map(|(_, text)| text.clone()).collect();
        let vectors = self.encoder.encode(inputs).await?;
        if vectors.len() != pieces.len() {
            return Err(EncoderError::CountMismatch {
                expected: pieces.len(),
                actual: vectors.len(),
            }
            .into());
        }

        Ok(pieces
            .into_iter()
            .zip(vectors)
            .map(|((chunk_index, chunk_text), vector)| EmbeddingRecord {
                file_id: record.id,
                version_number: record.version,
                chunk_index,
                chunk_text: chunk_index.map(|_| chunk_text),
                vector,
                model: model.clone(),
                created_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashingEncoder, TfIdfEncoder, TfIdfModel};
    use crate::extraction::{LopdfPages, TesseractOcr};
    use crate::jobs::NewFile;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct FailingEncoder;

    #[async_trait]
    impl Encoder for FailingEncoder {
        fn encoder_id(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> usize {
            4
        }

        fn granularity(&self) -> Granularity {
            Granularity::WholeDocument
        }

        async fn encode(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>, EncoderError> {
            Err(EncoderError::GenerationFailed("model offline".into()))
        }
    }

    fn pipeline(upload_dir: &Path, encoder: Arc<dyn Encoder>, summarizer: Summarizer) -> Pipeline {
        Pipeline::new(
            TextExtractor::new(
                Arc::new(LopdfPages),
                Arc::new(TesseractOcr::new("tesseract".into())),
            ),
            encoder,
            Arc::new(summarizer),
            PipelineSettings {
                upload_dir: upload_dir.to_path_buf(),
                chunk_size: 20,
                chunk_overlap: 5,
                text_preview_chars: 8,
            },
        )
    }

    fn record(path: &str) -> FileRecord {
        NewFile::new(path).into_record(Uuid::new_v4())
    }

    #[tokio::test]
    async fn whole_document_encoder_writes_single_record() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello world").unwrap();
        let pipeline = pipeline(
            dir.path(),
            Arc::new(HashingEncoder::new(384).unwrap()),
            Summarizer::disabled(),
        );

        let file = record("hello.txt");
        let processed = pipeline.process(&file).await.unwrap();
        assert_eq!(processed.embeddings.len(), 1);
        let embedding = &processed.embeddings[0];
        assert_eq!(embedding.vector.len(), 384);
        assert_eq!(embedding.chunk_index, None);
        assert_eq!(embedding.chunk_text, None);
        assert_eq!(embedding.model, "hashing-384");
        assert_eq!(embedding.file_id, file.id);
        assert_eq!(processed.text_preview, "hello wo...");
        assert_eq!(processed.summary, None);
    }

    #[tokio::test]
    async fn chunked_encoder_stores_windows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let text = "rivers carry water to the sea while mountains hold snow all winter long";
        std::fs::write(dir.path().join("doc.md"), text).unwrap();
        let encoder = Arc::new(TfIdfEncoder::new(TfIdfModel::fit(&[text]).unwrap()).unwrap());
        let pipeline = pipeline(dir.path(), encoder.clone(), Summarizer::disabled());

        let processed = pipeline.process(&record("doc.md")).await.unwrap();
        assert!(processed.embeddings.len() > 1);
        for (position, embedding) in processed.embeddings.iter().enumerate() {
            assert_eq!(embedding.chunk_index, Some(position as u32));
            let chunk = embedding.chunk_text.as_deref().unwrap();
            assert_eq!(embedding.vector, encoder.transform(chunk));
            assert_eq!(embedding.model, encoder.encoder_id());
        }
    }

    #[tokio::test]
    async fn missing_file_fails_before_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            Arc::new(HashingEncoder::new(8).unwrap()),
            Summarizer::disabled(),
        );

        let error = pipeline.process(&record("absent.txt")).await.unwrap_err();
        assert!(matches!(error, ProcessingError::MissingFile(path) if path.ends_with("absent.txt")));
    }

    #[tokio::test]
    async fn empty_text_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blank.txt"), "  \n\t ").unwrap();
        let pipeline = pipeline(
            dir.path(),
            Arc::new(HashingEncoder::new(8).unwrap()),
            Summarizer::disabled(),
        );

        let error = pipeline.process(&record("blank.txt")).await.unwrap_err();
        assert!(matches!(error, ProcessingError::NoText));
    }

    #[tokio::test]
    async fn encoder_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "some words").unwrap();
        let pipeline = pipeline(dir.path(), Arc::new(FailingEncoder), Summarizer::disabled());

        let error = pipeline.process(&record("a.txt")).await.unwrap_err();
        assert!(matches!(error, ProcessingError::Encoding(_)));
    }

    #[tokio::test]
    async fn absolute_paths_bypass_upload_dir_and_summary_is_kept() {
        let uploads = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let path = elsewhere.path().join("note.txt");
        std::fs::write(&path, "Short note. Another sentence follows here.").unwrap();
        let pipeline = pipeline(
            uploads.path(),
            Arc::new(HashingEncoder::new(8).unwrap()),
            Summarizer::extractive(4000, 3),
        );

        let processed = pipeline
            .process(&record(path.to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(processed.summary.as_deref(), Some("Short note."));
    }
}
