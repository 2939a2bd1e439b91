use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_ingest::{
    config,
    jobs::{self, NewFile},
    logging::{self, ConsoleTarget},
};
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "jobs-admin", about = "Operator commands for the ingestion job store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Move an `error` file back to `pending`.
    Requeue {
        /// File identifier.
        id: Uuid,
    },
    /// Requeue every `processing` file claimed longer ago than the given age.
    Sweep {
        /// Minimum claim age, in seconds, of the records to requeue.
        #[arg(long)]
        older_than_secs: u64,
    },
    /// Insert a new `pending` file.
    Enqueue {
        /// Path, absolute or relative to UPLOAD_DIR.
        path: String,
        /// MIME type hint used to pick the extractor.
        #[arg(long)]
        mime_type: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing(ConsoleTarget::Stderr);
    let config = config::load_config().context("Failed to load configuration")?;

    let store = jobs::connect_store(&config.job_store_url, &config.job_store_database)
        .await
        .context("Failed to connect to job store")?;

    match cli.command {
        Command::Requeue { id } => {
            store
                .requeue(id)
                .await
                .with_context(|| format!("Failed to requeue {id}"))?;
            println!("{id} pending");
        }
        Command::Sweep { older_than_secs } => {
            let count = store
                .requeue_stale(Duration::from_secs(older_than_secs))
                .await
                .context("Failed to sweep stale records")?;
            println!("{count} requeued");
        }
        Command::Enqueue { path, mime_type } => {
            let mut file = NewFile::new(path);
            if let Some(mime_type) = mime_type {
                file = file.with_mime_type(mime_type);
            }
            let record = store.enqueue(file).await.context("Failed to enqueue file")?;
            println!("{}", record.id);
        }
    }
    Ok(())
}
