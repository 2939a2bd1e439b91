//! Shared job store and the claim protocol.
//!
//! Files move `pending -> processing -> {ready | error}`. Every transition is a single atomic
//! operation against the store: [`JobStore::claim_next`] hands the oldest pending file to exactly
//! one caller, and [`JobStore::finalize`] writes the terminal status together with any embedding
//! records. Nothing here retries `error` records; [`JobStore::requeue`] and
//! [`JobStore::requeue_stale`] exist for operators.

mod memory;
mod postgres;
pub mod types;

pub use memory::MemoryJobStore;
pub use postgres::PostgresJobStore;
pub use types::{
    EmbeddingRecord, FileId, FileRecord, Finalized, NewFile, Outcome, ProcessingStatus,
    text_preview,
};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by job store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The PostgreSQL driver reported a failure.
    #[error("Postgres request failed: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    /// No file exists with the given identifier.
    #[error("File {0} not found")]
    NotFound(FileId),
    /// The requested transition is not allowed from the record's current status.
    #[error("File {id} is {current}; cannot move it to {requested}")]
    InvalidTransition {
        /// File the transition was requested for.
        id: FileId,
        /// Status currently stored.
        current: ProcessingStatus,
        /// Status that was requested.
        requested: ProcessingStatus,
    },
    /// A row could not be encoded for, or decoded from, the store.
    #[error("Corrupt job store row: {0}")]
    Corrupt(String),
    /// The configured connection string names no supported backend.
    #[error("Unsupported job store URL: {0}")]
    UnsupportedUrl(String),
}

/// Atomic operations over the `files` and `embeddings` collections.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Move the oldest `pending` file to `processing` and return it, or `None` when the queue is
    /// empty. Concurrent callers never receive the same file.
    async fn claim_next(&self) -> Result<Option<FileRecord>, StoreError>;

    /// Apply a terminal outcome to a file currently in `processing`.
    async fn finalize(&self, id: FileId, outcome: Outcome) -> Result<Finalized, StoreError>;

    /// Register a new `pending` file.
    async fn enqueue(&self, file: NewFile) -> Result<FileRecord, StoreError>;

    /// Fetch a file by identifier.
    async fn get(&self, id: FileId) -> Result<Option<FileRecord>, StoreError>;

    /// List the embedding records stored for a file, oldest first.
    async fn embeddings_for(&self, id: FileId) -> Result<Vec<EmbeddingRecord>, StoreError>;

    /// Move an `error` file back to `pending`.
    async fn requeue(&self, id: FileId) -> Result<(), StoreError>;

    /// Move `processing` files claimed longer than `older_than` ago back to `pending`.
    /// Returns how many files were moved.
    async fn requeue_stale(&self, older_than: Duration) -> Result<u64, StoreError>;
}

/// Open the job store named by `url`.
///
/// `memory://` yields a process-local store; `postgres://` and `postgresql://` connect to
/// PostgreSQL, using `database` when the URL does not name one, and create the tables if missing.
pub async fn connect_store(url: &str, database: &str) -> Result<Arc<dyn JobStore>, StoreError> {
    let scheme = url.split("://").next().unwrap_or_default().to_lowercase();
    match scheme.as_str() {
        "memory" => {
            tracing::warn!("Using in-memory job store; state is lost on exit");
            Ok(Arc::new(MemoryJobStore::new()))
        }
        "postgres" | "postgresql" => {
            let store = PostgresJobStore::connect(url, database).await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        _ => Err(StoreError::UnsupportedUrl(redact_url(url))),
    }
}

/// Strip credentials from a connection string before it is logged or reported.
pub(crate) fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
