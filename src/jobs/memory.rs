//! Process-local job store.
//!
//! All state sits behind one mutex, so every operation observes and mutates the collections
//! atomically. Used by tests and by `JOB_STORE_URL=memory://` for local runs.

use super::types::{
    EmbeddingRecord, FileId, FileRecord, Finalized, NewFile, Outcome, ProcessingStatus,
};
use super::{JobStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    files: HashMap<FileId, FileRecord>,
    embeddings: Vec<EmbeddingRecord>,
}

/// In-memory implementation of [`JobStore`].
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, bypassing the `pending` default. Useful for seeding fixtures.
    pub async fn insert_record(&self, record: FileRecord) {
        let mut state = self.state.lock().await;
        state.files.insert(record.id, record);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn claim_next(&self) -> Result<Option<FileRecord>, StoreError> {
        let mut state = self.state.lock().await;
        let next_id = state
            .files
            .values()
            .filter(|record| record.status == ProcessingStatus::Pending)
            .min_by_key(|record| (record.upload_date, record.id))
            .map(|record| record.id);

        let Some(id) = next_id else {
            return Ok(None);
        };
        let record = state.files.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.status = ProcessingStatus::Processing;
        record.processing_started_at = Some(OffsetDateTime::now_utc());
        Ok(Some(record.clone()))
    }

    async fn finalize(&self, id: FileId, outcome: Outcome) -> Result<Finalized, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let record = state.files.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if record.status != ProcessingStatus::Processing {
            return Ok(Finalized::Stale);
        }

        match outcome {
            Outcome::Ready {
                text_preview,
                summary,
                embeddings,
            } => {
                record.status = ProcessingStatus::Ready;
                record.text_preview = Some(text_preview);
                record.summary = summary;
                state.embeddings.extend(embeddings);
            }
            Outcome::Failed { .. } => {
                record.status = ProcessingStatus::Error;
            }
        }
        Ok(Finalized::Applied)
    }

    async fn enqueue(&self, file: NewFile) -> Result<FileRecord, StoreError> {
        let record = file.into_record(Uuid::new_v4());
        let mut state = self.state.lock().await;
        state.files.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: FileId) -> Result<Option<FileRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.files.get(&id).cloned())
    }

    async fn embeddings_for(&self, id: FileId) -> Result<Vec<EmbeddingRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .embeddings
            .iter()
            .filter(|embedding| embedding.file_id == id)
            .cloned()
            .collect())
    }

    async fn requeue(&self, id: FileId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let record = state.files.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if record.status != ProcessingStatus::Error {
            return Err(StoreError::InvalidTransition {
                id,
                current: record.status,
                requested: ProcessingStatus::Pending,
            });
        }
        record.status = ProcessingStatus::Pending;
        record.processing_started_at = None;
        Ok(())
    }

    async fn requeue_stale(&self, older_than: Duration) -> Result<u64, StoreError> {
        let cutoff = OffsetDateTime::now_utc() - older_than;
        let mut state = self.state.lock().await;
        let mut moved = 0;
        for record in state.files.values_mut() {
            let abandoned = record.status == ProcessingStatus::Processing
                && record
                    .processing_started_at
                    .is_none_or(|started| started <= cutoff);
            if abandoned {
                record.status = ProcessingStatus::Pending;
                record.processing_started_at = None;
                moved += 1;
            }
        }
        Ok(moved)
    }
}
