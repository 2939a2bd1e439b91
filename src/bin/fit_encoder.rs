use anyhow::{Context, Result, bail};
use clap::Parser;
use doc_ingest::{
    config::{self, ChunkingConfig},
    embedding::{Encoder, TfIdfEncoder, TfIdfModel},
    logging::{self, ConsoleTarget},
    processing::chunk_text,
};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "fit-encoder",
    about = "Fit the TF-IDF encoder on a reference corpus and persist its state"
)]
struct Cli {
    /// Directory (walked recursively) or single file holding the reference corpus.
    #[arg(long)]
    corpus: PathBuf,
    /// Where to write the state; defaults to ENCODER_STATE_PATH.
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing(ConsoleTarget::Stderr);

    let output = cli.output.unwrap_or_else(config::encoder_state_path);
    let chunking = ChunkingConfig::from_env().context("Failed to load chunking configuration")?;

    let documents = read_corpus(&cli.corpus)?;
    if documents.is_empty() {
        bail!("No readable UTF-8 documents under {}", cli.corpus.display());
    }
    let chunks = corpus_chunks(&documents, chunking)?;

    let model = TfIdfModel::fit(&chunks).context("Failed to fit encoder")?;
    model
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    let encoder = TfIdfEncoder::new(model).context("Failed to fingerprint encoder state")?;

    tracing::info!(
        files = documents.len(),
        chunks = chunks.len(),
        dimension = encoder.model().dimension(),
        path = %output.display(),
        "Encoder state written"
    );
    println!("{}", encoder.encoder_id());
    Ok(())
}

/// Split every document into the same windows the worker encodes at ingestion time.
fn corpus_chunks(documents: &[String], chunking: ChunkingConfig) -> Result<Vec<String>> {
    let mut chunks = Vec::new();
    for document in documents {
        let windows = chunk_text(document, chunking.chunk_size, chunking.chunk_overlap)
            .context("Failed to chunk corpus document")?;
        chunks.extend(windows.into_iter().map(|chunk| chunk.text));
    }
    Ok(chunks)
}

fn read_corpus(root: &Path) -> Result<Vec<String>> {
    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        match fs::read_to_string(entry.path()) {
            Ok(text) if !text.trim().is_empty() => documents.push(text),
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(path = %entry.path().display(), %error, "Skipping unreadable file");
            }
        }
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_on_windows_rather_than_whole_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha beta gamma delta epsilon zeta").unwrap();
        std::fs::write(dir.path().join("b.txt"), "short").unwrap();
        let chunking = ChunkingConfig {
            chunk_size: 12,
            chunk_overlap: 2,
        };

        let documents = read_corpus(dir.path()).unwrap();
        assert_eq!(documents.len(), 2);
        let chunks = corpus_chunks(&documents, chunking).unwrap();
        let expected: usize = documents
            .iter()
            .map(|document| chunk_text(document, 12, 2).unwrap().len())
            .sum();
        assert_eq!(chunks.len(), expected);
        assert!(chunks.len() > documents.len());

        let model = TfIdfModel::fit(&chunks).unwrap();
        assert_eq!(model.documents(), chunks.len());
    }
}
