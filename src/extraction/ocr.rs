use super::{ExtractError, OcrEngine};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

/// OCR through the `tesseract` command-line tool, writing recognized text to stdout.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    command: String,
}

impl TesseractOcr {
    /// Use `command` as the tesseract executable.
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, path: &Path) -> Result<String, ExtractError> {
        let output = Command::new(&self.command)
            .arg(path)
            .arg("stdout")
            .output()
            .await
            .map_err(|error| {
                ExtractError::Ocr(format!("failed to run {}: {error}", self.command))
            })?;

        if !output.status.success() {
            return Err(ExtractError::Ocr(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
