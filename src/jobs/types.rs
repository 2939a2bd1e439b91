//! Records and outcomes exchanged with the job store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Identifier of an uploaded file.
pub type FileId = Uuid;

/// Processing state of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    /// Waiting for a worker to claim it.
    Pending,
    /// Claimed by a worker and not yet finalized.
    Processing,
    /// Text, embeddings, and derived fields were stored.
    Ready,
    /// Processing failed; left for operator recovery.
    Error,
}

impl ProcessingStatus {
    /// Storage representation of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a stored status string is not one of the known states.
#[derive(Debug, Error)]
#[error("unknown processing status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ProcessingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One uploaded file as tracked by the job store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    /// Store-assigned identifier.
    pub id: FileId,
    /// Storage path, absolute or relative to the upload directory.
    pub path: String,
    /// Media type declared at upload time.
    pub mime_type: Option<String>,
    /// Upload timestamp; claims are served oldest first.
    #[serde(with = "time::serde::rfc3339")]
    pub upload_date: OffsetDateTime,
    /// Version number of the file contents.
    pub version: i32,
    /// Current processing state.
    pub status: ProcessingStatus,
    /// Leading slice of the extracted text, set when `ready`.
    pub text_preview: Option<String>,
    /// Optional summary, set when `ready`.
    pub summary: Option<String>,
    /// When the record last entered `processing`.
    #[serde(with = "time::serde::rfc3339::option")]
    pub processing_started_at: Option<OffsetDateTime>,
}

/// A file to register as `pending`.
#[derive(Debug, Clone)]
pub struct NewFile {
    /// Storage path, absolute or relative to the upload directory.
    pub path: String,
    /// Declared media type.
    pub mime_type: Option<String>,
    /// Upload timestamp; defaults to now.
    pub upload_date: Option<OffsetDateTime>,
    /// Version number; defaults to 1.
    pub version: Option<i32>,
}

impl NewFile {
    /// Describe a file by path with no declared media type.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mime_type: None,
            upload_date: None,
            version: None,
        }
    }

    /// Attach a declared media type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Override the upload timestamp.
    pub fn uploaded_at(mut self, upload_date: OffsetDateTime) -> Self {
        self.upload_date = Some(upload_date);
        self
    }

    /// Override the version number.
    pub fn with_version(mut self, version: i32) -> Self {
        self.version = Some(version);
        self
    }

    pub(crate) fn into_record(self, id: FileId) -> FileRecord {
        FileRecord {
            id,
            path: self.path,
            mime_type: self.mime_type,
            upload_date: self.upload_date.unwrap_or_else(OffsetDateTime::now_utc),
            version: self.version.unwrap_or(1),
            status: ProcessingStatus::Pending,
            text_preview: None,
            summary: None,
            processing_started_at: None,
        }
    }
}

/// Append-only vector record tied to a file version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingRecord {
    /// Owning file.
    pub file_id: FileId,
    /// File version at the time of encoding.
    pub version_number: i32,
    /// Position of the chunk inside the document; `None` for whole-document vectors.
    pub chunk_index: Option<u32>,
    /// Chunk text for chunked encoders.
    pub chunk_text: Option<String>,
    /// Encoded vector.
    pub vector: Vec<f32>,
    /// Identifier of the encoder that produced `vector`.
    pub model: String,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Terminal result handed to [`crate::jobs::JobStore::finalize`].
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Store the embeddings and mark the file `ready`.
    Ready {
        /// Leading slice of the extracted text.
        text_preview: String,
        /// Summary, when one was produced.
        summary: Option<String>,
        /// Embedding records written together with the status change.
        embeddings: Vec<EmbeddingRecord>,
    },
    /// Mark the file `error`; nothing else is written.
    Failed {
        /// Diagnostic kept in the logs.
        reason: String,
    },
}

impl Outcome {
    /// Status the record will carry once this outcome is applied.
    pub const fn status(&self) -> ProcessingStatus {
        match self {
            Self::Ready { .. } => ProcessingStatus::Ready,
            Self::Failed { .. } => ProcessingStatus::Error,
        }
    }
}

/// How the store applied a finalize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalized {
    /// The record moved out of `processing`.
    Applied,
    /// The record was no longer `processing` (for example requeued by a sweep); nothing was written.
    Stale,
}

/// Build the preview stored on a `ready` record, truncating on a character boundary.
pub fn text_preview(text: &str, max_chars: usize) -> String {
    let mut preview: String = text.chars().take(max_chars).collect();
    if text.chars().nth(max_chars).is_some() {
        preview.push_str("...");
    }
    preview
}
