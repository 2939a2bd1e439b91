use anyhow::{Context, Result};
use clap::Parser;
use doc_ingest::{
    config, embedding,
    logging::{self, ConsoleTarget},
    query::QueryEncoder,
};

#[derive(Parser)]
#[command(
    name = "embed-query",
    about = "Encode query text with the active encoder and print the vector as JSON"
)]
struct Cli {
    /// Query text to encode.
    text: String,
    /// Expected encoder identifier; fails when it differs from the active encoder.
    #[arg(long = "encoder")]
    encoder_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing(ConsoleTarget::Stderr);
    let config =
        config::load_encoder_config().context("Failed to load encoder configuration")?;

    let encoder = embedding::build_encoder(&config).context("Failed to initialize encoder")?;
    let query = QueryEncoder::new(encoder)
        .encode_query(&cli.text, cli.encoder_id.as_deref())
        .await
        .context("Failed to encode query")?;

    let json = serde_json::to_string(&query.vector).context("Failed to serialize vector")?;
    println!("{json}");
    Ok(())
}
