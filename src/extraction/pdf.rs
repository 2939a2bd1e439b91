use super::{ExtractError, PdfTextSource};
use async_trait::async_trait;
use lopdf::Document;
use std::path::{Path, PathBuf};

/// PDF page text via `lopdf`, parsed on a blocking thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfPages;

fn read_pages(path: &Path) -> Result<Vec<String>, ExtractError> {
    let document = Document::load(path).map_err(|error| ExtractError::Pdf(error.to_string()))?;
    let mut pages = Vec::new();
    // get_pages is keyed by 1-based page number, so iteration is in page order.
    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => pages.push(text.trim_end().to_string()),
            Err(error) => {
                tracing::debug!(page = page_number, %error, "Skipping unreadable PDF page");
                pages.push(String::new());
            }
        }
    }
    Ok(pages)
}

#[async_trait]
impl PdfTextSource for LopdfPages {
    async fn page_texts(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_pages(&path))
            .await
            .map_err(|error| ExtractError::Join(error.to_string()))?
    }
}
