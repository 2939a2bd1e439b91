//! PostgreSQL-backed job store.
//!
//! The claim is one `UPDATE ... WHERE id = (SELECT ... FOR UPDATE SKIP LOCKED LIMIT 1)`
//! statement: concurrent workers skip rows another transaction already locked, so each pending
//! file is claimed once. Finalize runs in a transaction so the status change and the embedding
//! rows land together.

use super::types::{
    EmbeddingRecord, FileId, FileRecord, Finalized, NewFile, Outcome, ProcessingStatus,
};
use super::{JobStore, StoreError, redact_url};
use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id UUID PRIMARY KEY,
    path TEXT NOT NULL,
    mime_type TEXT,
    upload_date TIMESTAMPTZ NOT NULL DEFAULT now(),
    version INTEGER NOT NULL DEFAULT 1,
    ai_processed TEXT NOT NULL DEFAULT 'pending'
        CHECK (ai_processed IN ('pending', 'processing', 'ready', 'error')),
    text_preview TEXT,
    summary TEXT,
    processing_started_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS files_pending_idx
    ON files (upload_date, id) WHERE ai_processed = 'pending';
CREATE TABLE IF NOT EXISTS embeddings (
    id BIGSERIAL PRIMARY KEY,
    file_id UUID NOT NULL REFERENCES files (id),
    version_number INTEGER NOT NULL,
    chunk_index INTEGER,
    chunk_text TEXT,
    vector REAL[] NOT NULL,
    model TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS embeddings_file_idx ON embeddings (file_id, version_number);
"#;

const FILE_COLUMNS: &str = "id, path, mime_type, upload_date, version, ai_processed, \
     text_preview, summary, processing_started_at";

/// [`JobStore`] over a PostgreSQL database.
pub struct PostgresJobStore {
    client: Mutex<Client>,
}

impl PostgresJobStore {
    /// Connect to PostgreSQL, falling back to `database` when the URL names none.
    pub async fn connect(url: &str, database: &str) -> Result<Self, StoreError> {
        let mut config = tokio_postgres::Config::from_str(url)?;
        if config.get_dbname().is_none() {
            config.dbname(database);
        }

        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::error!(error = %error, "Postgres connection error");
            }
        });
        tracing::debug!(url = %redact_url(url), "Connected to Postgres job store");

        Ok(Self {
            client: Mutex::new(client),
        })
    }

    /// Create the `files` and `embeddings` tables when missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let client = self.client.lock().await;
        client.batch_execute(SCHEMA).await?;
        tracing::debug!("Job store schema ensured");
        Ok(())
    }

    async fn current_status(&self, id: FileId) -> Result<ProcessingStatus, StoreError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt("SELECT ai_processed FROM files WHERE id = $1", &[&id])
            .await?
            .ok_or(StoreError::NotFound(id))?;
        parse_status(row.try_get("ai_processed")?)
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn claim_next(&self) -> Result<Option<FileRecord>, StoreError> {
        let statement = format!(
            "UPDATE files \
             SET ai_processed = 'processing', processing_started_at = now() \
             WHERE ai_processed = 'pending' AND id = ( \
                 SELECT id FROM files \
                 WHERE ai_processed = 'pending' \
                 ORDER BY upload_date ASC, id ASC \
                 FOR UPDATE SKIP LOCKED \
                 LIMIT 1 \
             ) \
             RETURNING {FILE_COLUMNS}"
        );
        let client = self.client.lock().await;
        let row = client.query_opt(&statement, &[]).await?;
        row.as_ref().map(file_from_row).transpose()
    }

    async fn finalize(&self, id: FileId, outcome: Outcome) -> Result<Finalized, StoreError> {
        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;

        let updated = match &outcome {
            Outcome::Ready {
                text_preview,
                summary,
                ..
            } => {
                transaction
                    .execute(
                        "UPDATE files SET ai_processed = 'ready', text_preview = $2, summary = $3 \
                         WHERE id = $1 AND ai_processed = 'processing'",
                        &[&id, text_preview, summary],
                    )
                    .await?
            }
            Outcome::Failed { .. } => {
                transaction
                    .execute(
                        "UPDATE files SET ai_processed = 'error' \
                         WHERE id = $1 AND ai_processed = 'processing'",
                        &[&id],
                    )
                    .await?
            }
        };

        if updated == 0 {
            transaction.rollback().await?;
            return Ok(Finalized::Stale);
        }

        if let Outcome::Ready { embeddings, .. } = &outcome {
            let insert = transaction
                .prepare(
                    "INSERT INTO embeddings \
                     (file_id, version_number, chunk_index, chunk_text, vector, model, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                )
                .await?;
            for embedding in embeddings {
                let chunk_index = chunk_index_column(embedding.chunk_index)?;
                transaction
                    .execute(
                        &insert,
                        &[
                            &embedding.file_id,
                            &embedding.version_number,
                            &chunk_index,
                            &embedding.chunk_text,
                            &embedding.vector,
                            &embedding.model,
                            &embedding.created_at,
                        ],
                    )
                    .await?;
            }
        }

        transaction.commit().await?;
        Ok(Finalized::Applied)
    }

    async fn enqueue(&self, file: NewFile) -> Result<FileRecord, StoreError> {
        let record = file.into_record(Uuid::new_v4());
        let statement = format!(
            "INSERT INTO files (id, path, mime_type, upload_date, version, ai_processed) \
             VALUES ($1, $2, $3, $4, $5, 'pending') \
             RETURNING {FILE_COLUMNS}"
        );
        let client = self.client.lock().await;
        let row = client
            .query_one(
                &statement,
                &[
                    &record.id,
                    &record.path,
                    &record.mime_type,
                    &record.upload_date,
                    &record.version,
                ],
            )
            .await?;
        file_from_row(&row)
    }

    async fn get(&self, id: FileId) -> Result<Option<FileRecord>, StoreError> {
        let statement = format!("SELECT {FILE_COLUMNS} FROM files WHERE id = $1");
        let client = self.client.lock().await;
        let row = client.query_opt(&statement, &[&id]).await?;
        row.as_ref().map(file_from_row).transpose()
    }

    async fn embeddings_for(&self, id: FileId) -> Result<Vec<EmbeddingRecord>, StoreError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT file_id, version_number, chunk_index, chunk_text, vector, model, created_at \
                 FROM embeddings WHERE file_id = $1 ORDER BY id ASC",
                &[&id],
            )
            .await?;
        rows.iter().map(embedding_from_row).collect()
    }

    async fn requeue(&self, id: FileId) -> Result<(), StoreError> {
        let updated = {
            let client = self.client.lock().await;
            client
                .execute(
                    "UPDATE files SET ai_processed = 'pending', processing_started_at = NULL \
                     WHERE id = $1 AND ai_processed = 'error'",
                    &[&id],
                )
                .await?
        };
        if updated == 1 {
            return Ok(());
        }

        let current = self.current_status(id).await?;
        Err(StoreError::InvalidTransition {
            id,
            current,
            requested: ProcessingStatus::Pending,
        })
    }

    async fn requeue_stale(&self, older_than: Duration) -> Result<u64, StoreError> {
        let seconds = older_than.as_secs_f64();
        let client = self.client.lock().await;
        let moved = client
            .execute(
                "UPDATE files SET ai_processed = 'pending', processing_started_at = NULL \
                 WHERE ai_processed = 'processing' \
                 AND (processing_started_at IS NULL \
                      OR processing_started_at < now() - make_interval(secs => $1))",
                &[&seconds],
            )
            .await?;
        Ok(moved)
    }
}

fn parse_status(value: String) -> Result<ProcessingStatus, StoreError> {
    value
        .parse()
        .map_err(|error: super::types::UnknownStatus| StoreError::Corrupt(error.to_string()))
}

fn file_from_row(row: &Row) -> Result<FileRecord, StoreError> {
    Ok(FileRecord {
        id: row.try_get("id")?,
        path: row.try_get("path")?,
        mime_type: row.try_get("mime_type")?,
        upload_date: row.try_get::<_, OffsetDateTime>("upload_date")?,
        version: row.try_get("version")?,
        status: parse_status(row.try_get("ai_processed")?)?,
        text_preview: row.try_get("text_preview")?,
        summary: row.try_get("summary")?,
        processing_started_at: row.try_get("processing_started_at")?,
    })
}

/// `chunk_index` is an `INTEGER` column; indices past `i32::MAX` cannot be stored.
fn chunk_index_column(index: Option<u32>) -> Result<Option<i32>, StoreError> {
    index
        .map(|index| {
            i32::try_from(index)
                .map_err(|_| StoreError::Corrupt(format!("chunk index {index} out of range")))
        })
        .transpose()
}

fn embedding_from_row(row: &Row) -> Result<EmbeddingRecord, StoreError> {
    let chunk_index: Option<i32> = row.try_get("chunk_index")?;
    let chunk_index = chunk_index
        .map(|index| {
            u32::try_from(index)
                .map_err(|_| StoreError::Corrupt(format!("negative chunk index {index}")))
        })
        .transpose()?;

    Ok(EmbeddingRecord {
        file_id: row.try_get("file_id")?,
        version_number: row.try_get("version_number")?,
        chunk_index,
        chunk_text: row.try_get("chunk_text")?,
        vector: row.try_get("vector")?,
        model: row.try_get("model")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_index_column_rejects_values_past_integer_range() {
        assert_eq!(chunk_index_column(None).unwrap(), None);
        assert_eq!(chunk_index_column(Some(7)).unwrap(), Some(7));
        assert_eq!(
            chunk_index_column(Some(i32::MAX as u32)).unwrap(),
            Some(i32::MAX)
        );
        assert!(matches!(
            chunk_index_column(Some(i32::MAX as u32 + 1)),
            Err(StoreError::Corrupt(_))
        ));
    }
}
