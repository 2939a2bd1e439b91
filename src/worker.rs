//! Polling worker loop.
//!
//! Each worker claims at most one file per cycle, processes it, and finalizes it as `ready` or
//! `error` before claiming the next. Several workers may share one store; the claim protocol
//! keeps them from ever holding the same file.

use crate::config::Config;
use crate::jobs::{FileId, Finalized, JobStore, Outcome, ProcessingStatus, StoreError};
use crate::metrics::WorkerMetrics;
use crate::processing::{Pipeline, ProcessingError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Timing knobs for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Sleep after a cycle that found nothing to claim.
    pub idle_backoff: Duration,
    /// Sleep after a cycle that processed a file.
    pub busy_delay: Duration,
    /// When set, idle cycles return older `processing` records to `pending`.
    pub stale_processing_timeout: Option<Duration>,
}

impl WorkerSettings {
    /// Copy the relevant values out of the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_backoff: config.idle_backoff,
            busy_delay: config.busy_delay,
            stale_processing_timeout: config.stale_processing_timeout,
        }
    }
}

/// Result of a single claim-process-finalize cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No pending file was available.
    Idle,
    /// A file was claimed and finalized.
    Processed {
        /// File that was processed.
        id: FileId,
        /// Terminal status written for it.
        status: ProcessingStatus,
    },
}

/// One sequential worker sharing a store with its siblings.
pub struct Worker {
    index: usize,
    store: Arc<dyn JobStore>,
    pipeline: Arc<Pipeline>,
    metrics: Arc<WorkerMetrics>,
    settings: WorkerSettings,
}

impl Worker {
    /// Create worker number `index`.
    pub fn new(
        index: usize,
        store: Arc<dyn JobStore>,
        pipeline: Arc<Pipeline>,
        metrics: Arc<WorkerMetrics>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            index,
            store,
            pipeline,
            metrics,
            settings,
        }
    }

    /// Claim, process, and finalize at most one file.
    ///
    /// Per-file failures are written as `error` and reported as [`CycleOutcome::Processed`];
    /// only store failures are returned as errors.
    pub async fn run_once(&self) -> Result<CycleOutcome, StoreError> {
        let Some(record) = self.store.claim_next().await? else {
            return Ok(CycleOutcome::Idle);
        };
        tracing::info!(
            worker = self.index,
            file_id = %record.id,
            path = %record.path,
            "Claimed file"
        );

        // Run on its own task so a panicking backend still ends in a finalize.
        let pipeline = self.pipeline.clone();
        let claimed = record.clone();
        let processed = tokio::spawn(async move { pipeline.process(&claimed).await })
            .await
            .unwrap_or_else(|error| Err(ProcessingError::Panicked(error.to_string())));

        let outcome = match processed {
            Ok(processed) => processed.into_outcome(),
            Err(error) => {
                tracing::warn!(
                    worker = self.index,
                    file_id = %record.id,
                    %error,
                    "Processing failed"
                );
                Outcome::Failed {
                    reason: error.to_string(),
                }
            }
        };

        let status = outcome.status();
        let embedding_count = match &outcome {
            Outcome::Ready { embeddings, .. } => embeddings.len() as u64,
            Outcome::Failed { .. } => 0,
        };

        match self.store.finalize(record.id, outcome).await? {
            Finalized::Applied => {
                match status {
                    ProcessingStatus::Ready => self.metrics.record_ready(embedding_count),
                    _ => self.metrics.record_failed(),
                }
                tracing::info!(
                    worker = self.index,
                    file_id = %record.id,
                    %status,
                    chunks = embedding_count,
                    "Finalized file"
                );
            }
            Finalized::Stale => {
                tracing::warn!(
                    worker = self.index,
                    file_id = %record.id,
                    "File left processing before finalize; result discarded"
                );
            }
        }

        Ok(CycleOutcome::Processed {
            id: record.id,
            status,
        })
    }

    /// Return abandoned `processing` records to `pending`, when a timeout is configured.
    pub async fn sweep_stale(&self) -> Result<u64, StoreError> {
        let Some(timeout) = self.settings.stale_processing_timeout else {
            return Ok(0);
        };
        let requeued = self.store.requeue_stale(timeout).await?;
        if requeued > 0 {
            self.metrics.record_requeued(requeued);
            tracing::warn!(worker = self.index, requeued, "Requeued stale processing records");
        }
        Ok(requeued)
    }

    /// Run cycles until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Shutdown is observed between cycles, so an in-flight file is always finalized first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), StoreError> {
        tracing::info!(worker = self.index, "Worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.run_once().await? {
                CycleOutcome::Idle => {
                    self.sweep_stale().await?;
                    self.settings.idle_backoff
                }
                CycleOutcome::Processed { .. } => self.settings.busy_delay,
            };

            if delay.is_zero() {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(worker = self.index, "Worker stopped");
        Ok(())
    }
}
