//! Type-dispatched text extraction.
//!
//! A record's declared media type and path suffix select one strategy, in priority order: plain
//! text, PDF pages, image OCR, then a best-effort UTF-8 read. Extraction never fails outright;
//! backend errors are logged and produce empty text, which the pipeline treats as a failed
//! record.

mod ocr;
mod pdf;

pub use ocr::TesseractOcr;
pub use pdf::LopdfPages;

use crate::config::Config;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const TEXT_SUFFIXES: &[&str] = &[
    "txt", "text", "md", "markdown", "csv", "tsv", "json", "log", "xml", "html", "htm", "yaml",
    "yml", "rst",
];
const IMAGE_SUFFIXES: &[&str] = &[
    "png", "jpg", "jpeg", "tif", "tiff", "bmp", "gif", "webp",
];

/// Errors raised by extraction backends. They never escape [`TextExtractor::extract`].
#[derive(Debug, Error)]
pub enum ExtractError {
    /// File could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// PDF document could not be parsed.
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    /// OCR engine failed or is not installed.
    #[error("OCR failed: {0}")]
    Ocr(String),
    /// Blocking extraction task panicked or was cancelled.
    #[error("Extraction task failed: {0}")]
    Join(String),
}

/// Source of per-page text for PDF documents.
#[async_trait]
pub trait PdfTextSource: Send + Sync {
    /// Text of each page, in page order.
    async fn page_texts(&self, path: &Path) -> Result<Vec<String>, ExtractError>;
}

/// Optical character recognition over a whole image.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognized text of the image at `path`.
    async fn recognize(&self, path: &Path) -> Result<String, ExtractError>;
}

/// Extraction strategy chosen for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Decoded as UTF-8, invalid sequences replaced.
    PlainText,
    /// Per-page text joined by newlines.
    Pdf,
    /// Run through OCR.
    Image,
    /// Strict UTF-8 read, empty on failure.
    Unknown,
}

impl DocumentKind {
    /// Classify a file from its declared media type and path suffix.
    pub fn classify(path: &Path, mime_type: Option<&str>) -> Self {
        let mime = mime_type
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let suffix = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if mime.starts_with("text/") || TEXT_SUFFIXES.contains(&suffix.as_str()) {
            Self::PlainText
        } else if mime == "application/pdf" || suffix == "pdf" {
            Self::Pdf
        } else if mime.starts_with("image/") || IMAGE_SUFFIXES.contains(&suffix.as_str()) {
            Self::Image
        } else {
            Self::Unknown
        }
    }
}

/// Dispatches files to the matching extraction backend.
#[derive(Clone)]
pub struct TextExtractor {
    pdf: Arc<dyn PdfTextSource>,
    ocr: Arc<dyn OcrEngine>,
}

impl TextExtractor {
    /// Build an extractor over explicit backends.
    pub fn new(pdf: Arc<dyn PdfTextSource>, ocr: Arc<dyn OcrEngine>) -> Self {
        Self { pdf, ocr }
    }

    /// Build an extractor with the default `lopdf` and `tesseract` backends.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(LopdfPages),
            Arc::new(TesseractOcr::new(config.ocr_command.clone())),
        )
    }

    /// Extract plain text from `path`. Returns an empty string when nothing can be read.
    pub async fn extract(&self, path: &Path, mime_type: Option<&str>) -> String {
        let kind = DocumentKind::classify(path, mime_type);
        tracing::debug!(path = %path.display(), ?kind, "Extracting text");

        let result = match kind {
            DocumentKind::PlainText => tokio::fs::read(path)
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .map_err(ExtractError::from),
            DocumentKind::Pdf => self
                .pdf
                .page_texts(path)
                .await
                .map(|pages| pages.join("\n")),
            DocumentKind::Image => self.ocr.recognize(path).await,
            DocumentKind::Unknown => read_strict_utf8(path).await,
        };

        match result {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(path = %path.display(), ?kind, %error, "Text extraction failed");
                String::new()
            }
        }
    }
}

async fn read_strict_utf8(path: &Path) -> Result<String, ExtractError> {
    let bytes = tokio::fs::read(path).await?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(_) => {
            tracing::debug!(path = %path.display(), "Unrecognized binary file");
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingPdf {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl PdfTextSource for CountingPdf {
        async fn page_texts(&self, _path: &Path) -> Result<Vec<String>, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExtractError::Pdf("corrupt".into()));
            }
            Ok(vec!["page one".into(), "page two".into()])
        }
    }

    #[derive(Default)]
    struct CountingOcr {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for CountingOcr {
        async fn recognize(&self, _path: &Path) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("scanned words".into())
        }
    }

    fn extractor(pdf: &Arc<CountingPdf>, ocr: &Arc<CountingOcr>) -> TextExtractor {
        TextExtractor::new(pdf.clone(), ocr.clone())
    }

    #[test]
    fn classify_prefers_text_then_pdf_then_image() {
        let path = Path::new("notes.pdf");
        assert_eq!(
            DocumentKind::classify(path, Some("text/plain")),
            DocumentKind::PlainText
        );
        assert_eq!(DocumentKind::classify(path, None), DocumentKind::Pdf);
        assert_eq!(
            DocumentKind::classify(Path::new("scan.PNG"), None),
            DocumentKind::Image
        );
        assert_eq!(
            DocumentKind::classify(Path::new("blob"), Some("image/jpeg")),
            DocumentKind::Image
        );
        assert_eq!(
            DocumentKind::classify(Path::new("archive.bin"), None),
            DocumentKind::Unknown
        );
    }

    #[tokio::test]
    async fn pdf_suffix_invokes_only_pdf_backend() {
        let pdf = Arc::new(CountingPdf::default());
        let ocr = Arc::new(CountingOcr::default());
        let text = extractor(&pdf, &ocr)
            .extract(Path::new("/does/not/matter/report.pdf"), None)
            .await;

        assert_eq!(text, "page one\npage two");
        assert_eq!(pdf.calls.load(Ordering::SeqCst), 1);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn image_suffix_invokes_only_ocr() {
        let pdf = Arc::new(CountingPdf::default());
        let ocr = Arc::new(CountingOcr::default());
        let text = extractor(&pdf, &ocr)
            .extract(Path::new("/does/not/matter/photo.jpg"), None)
            .await;

        assert_eq!(text, "scanned words");
        assert_eq!(pdf.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn plain_text_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, [b'h', b'i', 0xFF]).unwrap();

        let pdf = Arc::new(CountingPdf::default());
        let ocr = Arc::new(CountingOcr::default());
        let text = extractor(&pdf, &ocr).extract(&path, None).await;
        assert_eq!(text, "hi\u{FFFD}");
        assert_eq!(pdf.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_binary_yields_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("blob.bin");
        std::fs::write(&binary, [0xC3, 0x28, 0x00]).unwrap();
        let readable = dir.path().join("README");
        std::fs::write(&readable, "plain words").unwrap();

        let pdf = Arc::new(CountingPdf::default());
        let ocr = Arc::new(CountingOcr::default());
        let extractor = extractor(&pdf, &ocr);
        assert_eq!(extractor.extract(&binary, None).await, "");
        assert_eq!(extractor.extract(&readable, None).await, "plain words");
    }

    #[tokio::test]
    async fn backend_errors_become_empty_text() {
        let pdf = Arc::new(CountingPdf {
            fail: true,
            ..CountingPdf::default()
        });
        let ocr = Arc::new(CountingOcr::default());
        let extractor = extractor(&pdf, &ocr);

        assert_eq!(extractor.extract(Path::new("broken.pdf"), None).await, "");
        assert_eq!(
            extractor
                .extract(Path::new("/missing/file.txt"), Some("text/plain"))
                .await,
            ""
        );
    }
}
