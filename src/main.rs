use anyhow::{Context, Result};
use doc_ingest::{
    config, embedding,
    extraction::TextExtractor,
    jobs,
    logging::{self, ConsoleTarget},
    metrics::WorkerMetrics,
    processing::{Pipeline, PipelineSettings},
    summarization::Summarizer,
    worker::{Worker, WorkerSettings},
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing(ConsoleTarget::Stdout);
    let config = config::load_config().context("Failed to load configuration")?;

    let store = jobs::connect_store(&config.job_store_url, &config.job_store_database)
        .await
        .context("Failed to connect to job store")?;
    let encoder = embedding::build_encoder(&config.encoder).context("Failed to initialize encoder")?;
    let summarizer =
        Summarizer::from_config(&config).context("Failed to initialize summarizer")?;
    let pipeline = Arc::new(Pipeline::new(
        TextExtractor::from_config(&config),
        encoder,
        Arc::new(summarizer),
        PipelineSettings::from_config(&config),
    ));
    let metrics = Arc::new(WorkerMetrics::new());
    let settings = WorkerSettings::from_config(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = JoinSet::new();
    for index in 0..config.worker_count {
        let worker = Worker::new(
            index,
            store.clone(),
            pipeline.clone(),
            metrics.clone(),
            settings.clone(),
        );
        workers.spawn(worker.run(shutdown_rx.clone()));
    }
    tracing::info!(workers = config.worker_count, "Ingestion worker pool started");

    let mut result = Ok(());
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown requested; finishing in-flight files");
        }
        Some(joined) = workers.join_next() => {
            result = flatten(joined);
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(joined) = workers.join_next().await {
        if let Err(error) = flatten(joined) {
            tracing::error!(error = %error, "Worker exited with error");
            if result.is_ok() {
                result = Err(error);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        files_ready = snapshot.files_ready,
        files_failed = snapshot.files_failed,
        embeddings_written = snapshot.embeddings_written,
        stale_requeued = snapshot.stale_requeued,
        "Worker pool stopped"
    );
    result
}

fn flatten(
    joined: Result<Result<(), jobs::StoreError>, tokio::task::JoinError>,
) -> Result<()> {
    joined
        .context("Worker task panicked")?
        .context("Worker stopped on a job store failure")
}
