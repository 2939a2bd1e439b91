use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing worker activity.
#[derive(Default)]
pub struct WorkerMetrics {
    files_ready: AtomicU64,
    files_failed: AtomicU64,
    embeddings_written: AtomicU64,
    stale_requeued: AtomicU64,
}

impl WorkerMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file finalized as `ready` and the number of embeddings stored for it.
    pub fn record_ready(&self, embedding_count: u64) {
        self.files_ready.fetch_add(1, Ordering::Relaxed);
        self.embeddings_written
            .fetch_add(embedding_count, Ordering::Relaxed);
    }

    /// Record a file finalized as `error`.
    pub fn record_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record records moved back to `pending` by the stale sweep.
    pub fn record_requeued(&self, count: u64) {
        self.stale_requeued.fetch_add(count, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_ready: self.files_ready.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            embeddings_written: self.embeddings_written.load(Ordering::Relaxed),
            stale_requeued: self.stale_requeued.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of worker counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Files finalized as `ready` since startup.
    pub files_ready: u64,
    /// Files finalized as `error` since startup.
    pub files_failed: u64,
    /// Embedding records written since startup.
    pub embeddings_written: u64,
    /// Abandoned `processing` records returned to `pending`.
    pub stale_requeued: u64,
}
