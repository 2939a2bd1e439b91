use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use doc_ingest::{
    embedding::{Encoder, HashingEncoder, TfIdfEncoder, TfIdfModel},
    extraction::{LopdfPages, TesseractOcr, TextExtractor},
    jobs::{Finalized, JobStore, MemoryJobStore, NewFile, Outcome, ProcessingStatus},
    metrics::WorkerMetrics,
    processing::{Pipeline, PipelineSettings},
    query::{QueryEncoder, QueryError},
    summarization::Summarizer,
    worker::{CycleOutcome, Worker, WorkerSettings},
};

struct Harness {
    store: Arc<dyn JobStore>,
    pipeline: Arc<Pipeline>,
    metrics: Arc<WorkerMetrics>,
}

impl Harness {
    fn new(upload_dir: &Path, encoder: Arc<dyn Encoder>) -> Self {
        let pipeline = Pipeline::new(
            TextExtractor::new(
                Arc::new(LopdfPages),
                Arc::new(TesseractOcr::new("tesseract".into())),
            ),
            encoder,
            Arc::new(Summarizer::extractive(4000, 40)),
            PipelineSettings {
                upload_dir: upload_dir.to_path_buf(),
                chunk_size: 1000,
                chunk_overlap: 200,
                text_preview_chars: 1000,
            },
        );
        Self {
            store: Arc::new(MemoryJobStore::new()),
            pipeline: Arc::new(pipeline),
            metrics: Arc::new(WorkerMetrics::new()),
        }
    }

    fn worker(&self, index: usize) -> Worker {
        Worker::new(
            index,
            self.store.clone(),
            self.pipeline.clone(),
            self.metrics.clone(),
            WorkerSettings {
                idle_backoff: Duration::from_millis(5),
                busy_delay: Duration::ZERO,
                stale_processing_timeout: None,
            },
        )
    }
}

#[tokio::test]
async fn hello_world_yields_one_full_length_vector() {
    let uploads = tempfile::tempdir().unwrap();
    std::fs::write(uploads.path().join("hello.txt"), "hello world").unwrap();
    let harness = Harness::new(uploads.path(), Arc::new(HashingEncoder::new(384).unwrap()));
    let file = harness
        .store
        .enqueue(NewFile::new("hello.txt").with_mime_type("text/plain"))
        .await
        .unwrap();

    let outcome = harness.worker(0).run_once().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Processed {
            id: file.id,
            status: ProcessingStatus::Ready
        }
    );

    let record = harness.store.get(file.id).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Ready);
    assert_eq!(record.summary.as_deref(), Some("hello world"));
    let embeddings = harness.store.embeddings_for(file.id).await.unwrap();
    assert_eq!(embeddings.len(), 1);
    assert_eq!(embeddings[0].vector.len(), 384);
    assert_eq!(embeddings[0].model, "hashing-384");
    assert_eq!(embeddings[0].version_number, 1);
}

#[tokio::test]
async fn missing_path_is_marked_error_with_no_vectors() {
    let uploads = tempfile::tempdir().unwrap();
    let harness = Harness::new(uploads.path(), Arc::new(HashingEncoder::new(384).unwrap()));
    let file = harness
        .store
        .enqueue(NewFile::new("nowhere/gone.pdf"))
        .await
        .unwrap();

    harness.worker(0).run_once().await.unwrap();

    let record = harness.store.get(file.id).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Error);
    assert!(harness.store.embeddings_for(file.id).await.unwrap().is_empty());
    assert_eq!(harness.worker(0).run_once().await.unwrap(), CycleOutcome::Idle);
}

#[tokio::test]
async fn reprocessing_same_file_yields_identical_vectors() {
    let uploads = tempfile::tempdir().unwrap();
    std::fs::write(uploads.path().join("doc.txt"), "deterministic content").unwrap();
    let harness = Harness::new(uploads.path(), Arc::new(HashingEncoder::new(64).unwrap()));
    let first = harness.store.enqueue(NewFile::new("doc.txt")).await.unwrap();
    let second = harness.store.enqueue(NewFile::new("doc.txt")).await.unwrap();

    let worker = harness.worker(0);
    worker.run_once().await.unwrap();
    worker.run_once().await.unwrap();

    let a = harness.store.embeddings_for(first.id).await.unwrap();
    let b = harness.store.embeddings_for(second.id).await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].vector, b[0].vector);
}

#[tokio::test]
async fn concurrent_workers_leave_nothing_in_processing() {
    let uploads = tempfile::tempdir().unwrap();
    let harness = Harness::new(uploads.path(), Arc::new(HashingEncoder::new(32).unwrap()));
    let mut ids = Vec::new();
    for index in 0..24 {
        let name = format!("file-{index}.txt");
        match index % 3 {
            0 => std::fs::write(uploads.path().join(&name), format!("document {index}")).unwrap(),
            1 => std::fs::write(uploads.path().join(&name), "   ").unwrap(),
            _ => {}
        }
        ids.push(harness.store.enqueue(NewFile::new(name)).await.unwrap().id);
    }

    let mut tasks = Vec::new();
    for index in 0..4 {
        let worker = harness.worker(index);
        tasks.push(tokio::spawn(async move {
            let mut processed = 0usize;
            while let CycleOutcome::Processed { .. } = worker.run_once().await.unwrap() {
                processed += 1;
            }
            processed
        }));
    }
    let mut total = 0;
    for task in tasks {
        total += task.await.unwrap();
    }
    assert_eq!(total, ids.len());

    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.files_ready, 8);
    assert_eq!(snapshot.files_failed, 16);
    for id in ids {
        let record = harness.store.get(id).await.unwrap().unwrap();
        assert_ne!(record.status, ProcessingStatus::Processing);
        assert_ne!(record.status, ProcessingStatus::Pending);
    }
}

#[tokio::test]
async fn swept_record_discards_late_result_and_is_processed_again() {
    let uploads = tempfile::tempdir().unwrap();
    std::fs::write(uploads.path().join("slow.txt"), "slow file").unwrap();
    let harness = Harness::new(uploads.path(), Arc::new(HashingEncoder::new(8).unwrap()));
    let file = harness.store.enqueue(NewFile::new("slow.txt")).await.unwrap();

    // A worker that died after claiming.
    let claimed = harness.store.claim_next().await.unwrap().unwrap();
    assert_eq!(claimed.id, file.id);
    assert_eq!(harness.store.requeue_stale(Duration::ZERO).await.unwrap(), 1);

    harness.worker(0).run_once().await.unwrap();
    let late = harness
        .store
        .finalize(
            file.id,
            Outcome::Failed {
                reason: "late".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(late, Finalized::Stale);

    let record = harness.store.get(file.id).await.unwrap().unwrap();
    assert_eq!(record.status, ProcessingStatus::Ready);
    assert_eq!(harness.store.embeddings_for(file.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn frozen_tfidf_keeps_stored_chunks_and_queries_in_one_space() {
    let uploads = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    let state_path = state.path().join("tfidf.json");
    let text = "Solar panels convert sunlight into electricity for homes.";
    std::fs::write(uploads.path().join("solar.txt"), text).unwrap();

    TfIdfModel::fit(&[text, "Wind turbines spin in strong coastal winds."])
        .unwrap()
        .save(&state_path)
        .unwrap();
    let worker_encoder: Arc<dyn Encoder> = Arc::new(TfIdfEncoder::load(&state_path).unwrap());
    let query_encoder: Arc<dyn Encoder> = Arc::new(TfIdfEncoder::load(&state_path).unwrap());
    assert_eq!(worker_encoder.encoder_id(), query_encoder.encoder_id());

    let harness = Harness::new(uploads.path(), worker_encoder);
    let file = harness.store.enqueue(NewFile::new("solar.txt")).await.unwrap();
    harness.worker(0).run_once().await.unwrap();
    let stored = harness.store.embeddings_for(file.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].chunk_index, Some(0));

    let query = QueryEncoder::new(query_encoder)
        .encode_query(stored[0].chunk_text.as_deref().unwrap(), None)
        .await
        .unwrap();
    assert_eq!(query.vector, stored[0].vector);
    query.ensure_comparable(&stored[0]).unwrap();

    let refit: Arc<dyn Encoder> = Arc::new(
        TfIdfEncoder::new(TfIdfModel::fit(&["Solar panels only."]).unwrap()).unwrap(),
    );
    let other = QueryEncoder::new(refit)
        .encode_query("solar panels", None)
        .await
        .unwrap();
    assert!(matches!(
        other.ensure_comparable(&stored[0]),
        Err(QueryError::EncoderMismatch { .. })
    ));
}
