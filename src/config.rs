use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Source of configuration values, keyed by variable name.
type Vars<'a> = dyn Fn(&str) -> Option<String> + 'a;

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Runtime configuration for the worker and the job-store tools.
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string of the shared job store (`postgres://...` or `memory://`).
    pub job_store_url: String,
    /// Database name used when the connection string does not pin one.
    pub job_store_database: String,
    /// Root directory that relative file paths are resolved against.
    pub upload_dir: PathBuf,
    /// Encoder selection, shared with the query entrypoint.
    pub encoder: EncoderConfig,
    /// Window settings for chunked encoders.
    pub chunking: ChunkingConfig,
    /// Maximum number of characters kept in a file's text preview.
    pub text_preview_chars: usize,
    /// Summarization backend; `None` disables summaries.
    pub summarization_provider: SummarizationProvider,
    /// Model used for abstractive summaries.
    pub summarization_model: Option<String>,
    /// Base URL of the Ollama runtime used for summaries.
    pub ollama_url: Option<String>,
    /// Input is truncated to this many characters before summarization.
    pub summary_max_input_chars: usize,
    /// Word budget for generated summaries.
    pub summary_max_words: usize,
    /// Number of independent worker loops sharing the job store.
    pub worker_count: usize,
    /// Sleep applied when no pending record was found.
    pub idle_backoff: Duration,
    /// Sleep applied after a record was processed.
    pub busy_delay: Duration,
    /// Age after which a `processing` record is considered abandoned.
    pub stale_processing_timeout: Option<Duration>,
    /// Executable used for optical character recognition.
    pub ocr_command: String,
}

/// Everything needed to build the active encoder. Does not touch the job store.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Encoder strategy selected for the whole process.
    pub strategy: EncoderStrategy,
    /// Model identifier passed to pretrained providers.
    pub model: String,
    /// Dimensionality expected from pretrained providers; `0` lets TF-IDF use its vocabulary size.
    pub dimension: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: Option<String>,
    /// API key for OpenAI-compatible embedding endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL for OpenAI-compatible embedding endpoints.
    pub openai_base_url: String,
    /// Location of the persisted corpus-fit encoder state.
    pub state_path: PathBuf,
}

/// Character window settings shared by ingestion and encoder fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Target window size, in characters.
    pub chunk_size: usize,
    /// Overlap, in characters, between consecutive windows.
    pub chunk_overlap: usize,
}

/// Encoder strategies available to the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderStrategy {
    /// Deterministic byte-hashing encoder, no external service.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
    /// Frozen TF-IDF transform fitted on a reference corpus.
    TfIdf,
}

/// Summarization backends supported by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummarizationProvider {
    /// Summaries are disabled.
    None,
    /// Abstractive summaries generated by an Ollama model.
    Ollama,
    /// Leading sentences bounded by a word budget.
    Extractive,
}

const DEFAULT_DATABASE: &str = "personal_cloud";
const DEFAULT_UPLOAD_DIR: &str = "./uploads";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_ENCODER_STATE_PATH: &str = "./encoder/tfidf.json";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_PREVIEW_CHARS: usize = 1000;
const DEFAULT_SUMMARY_MAX_INPUT_CHARS: usize = 4000;
const DEFAULT_SUMMARY_MAX_WORDS: usize = 120;
const DEFAULT_IDLE_BACKOFF_MS: u64 = 3000;
const DEFAULT_BUSY_DELAY_MS: u64 = 500;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&process_env)
    }

    fn from_vars(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let summarization_provider = load_env_optional(vars, "SUMMARIZATION_PROVIDER")
            .map(|value| {
                value.parse().map_err(|()| {
                    ConfigError::InvalidValue("SUMMARIZATION_PROVIDER".to_string())
                })
            })
            .transpose()?
            .unwrap_or(SummarizationProvider::None);

        Ok(Self {
            job_store_url: load_env(vars, "JOB_STORE_URL")?,
            job_store_database: load_env_optional(vars, "JOB_STORE_DATABASE")
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            upload_dir: load_env_optional(vars, "UPLOAD_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string())
                .into(),
            encoder: EncoderConfig::from_vars(vars)?,
            chunking: ChunkingConfig::from_vars(vars)?,
            text_preview_chars: parse_optional(vars, "TEXT_PREVIEW_CHARS")?
                .unwrap_or(DEFAULT_PREVIEW_CHARS),
            summarization_provider,
            summarization_model: load_env_optional(vars, "SUMMARIZATION_MODEL"),
            ollama_url: load_env_optional(vars, "OLLAMA_URL"),
            summary_max_input_chars: parse_optional(vars, "SUMMARY_MAX_INPUT_CHARS")?
                .unwrap_or(DEFAULT_SUMMARY_MAX_INPUT_CHARS),
            summary_max_words: parse_optional(vars, "SUMMARY_MAX_WORDS")?
                .unwrap_or(DEFAULT_SUMMARY_MAX_WORDS),
            worker_count: parse_optional::<usize>(vars, "WORKER_COUNT")?
                .unwrap_or(1)
                .max(1),
            idle_backoff: Duration::from_millis(
                parse_optional(vars, "IDLE_BACKOFF_MS")?.unwrap_or(DEFAULT_IDLE_BACKOFF_MS),
            ),
            busy_delay: Duration::from_millis(
                parse_optional(vars, "BUSY_DELAY_MS")?.unwrap_or(DEFAULT_BUSY_DELAY_MS),
            ),
            stale_processing_timeout: parse_optional(vars, "STALE_PROCESSING_TIMEOUT_SECS")?
                .map(Duration::from_secs),
            ocr_command: load_env_optional(vars, "OCR_COMMAND")
                .unwrap_or_else(|| "tesseract".into()),
        })
    }
}

impl EncoderConfig {
    /// Load the encoder selection from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&process_env)
    }

    fn from_vars(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let strategy: EncoderStrategy = load_env(vars, "ENCODER_STRATEGY")?
            .parse()
            .map_err(|()| ConfigError::InvalidValue("ENCODER_STRATEGY".to_string()))?;

        // TF-IDF derives its dimension from the persisted vocabulary.
        let dimension = match strategy {
            EncoderStrategy::TfIdf => parse_optional(vars, "EMBEDDING_DIMENSION")?.unwrap_or(0),
            _ => load_env(vars, "EMBEDDING_DIMENSION")?
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
        };
        let model = match strategy {
            EncoderStrategy::Ollama | EncoderStrategy::OpenAI => load_env(vars, "EMBEDDING_MODEL")?,
            _ => load_env_optional(vars, "EMBEDDING_MODEL").unwrap_or_default(),
        };

        Ok(Self {
            strategy,
            model,
            dimension,
            ollama_url: load_env_optional(vars, "OLLAMA_URL"),
            openai_api_key: load_env_optional(vars, "OPENAI_API_KEY"),
            openai_base_url: load_env_optional(vars, "OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            state_path: encoder_state_path_from(vars),
        })
    }
}

impl ChunkingConfig {
    /// Load and validate window settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&process_env)
    }

    fn from_vars(vars: &Vars<'_>) -> Result<Self, ConfigError> {
        let chunk_size = parse_optional(vars, "CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE);
        let chunk_overlap =
            parse_optional(vars, "CHUNK_OVERLAP")?.unwrap_or(DEFAULT_CHUNK_OVERLAP);
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".to_string()));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

/// Location of the persisted TF-IDF state (`ENCODER_STATE_PATH`).
pub fn encoder_state_path() -> PathBuf {
    encoder_state_path_from(&process_env)
}

fn encoder_state_path_from(vars: &Vars<'_>) -> PathBuf {
    load_env_optional(vars, "ENCODER_STATE_PATH")
        .unwrap_or_else(|| DEFAULT_ENCODER_STATE_PATH.to_string())
        .into()
}

fn load_env(vars: &Vars<'_>, key: &str) -> Result<String, ConfigError> {
    load_env_optional(vars, key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(vars: &Vars<'_>, key: &str) -> Option<String> {
    vars(key).filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: FromStr>(vars: &Vars<'_>, key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(vars, key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl FromStr for EncoderStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "tfidf" | "tf-idf" => Ok(Self::TfIdf),
            _ => Err(()),
        }
    }
}

impl FromStr for SummarizationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama),
            "extractive" => Ok(Self::Extractive),
            _ => Err(()),
        }
    }
}

/// Load `.env` (when present) and read the full worker configuration from the environment.
///
/// Install the subscriber first; the loaded values are reported as a debug event.
pub fn load_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    log_loaded(&config);
    Ok(config)
}

fn log_loaded(config: &Config) {
    tracing::debug!(
        upload_dir = %config.upload_dir.display(),
        database = %config.job_store_database,
        encoder = ?config.encoder.strategy,
        summarization = ?config.summarization_provider,
        workers = config.worker_count,
        "Loaded configuration"
    );
}

/// Load `.env` (when present) and read only the encoder selection.
pub fn load_encoder_config() -> Result<EncoderConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let config = EncoderConfig::from_env()?;
    tracing::debug!(
        encoder = ?config.strategy,
        dimension = config.dimension,
        "Loaded encoder configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn lookup(map: &HashMap<String, String>) -> impl Fn(&str) -> Option<String> + '_ {
        move |key| map.get(key).cloned()
    }

    #[test]
    fn encoder_strategy_parses_known_names() {
        assert_eq!("TFIDF".parse(), Ok(EncoderStrategy::TfIdf));
        assert_eq!("tf-idf".parse(), Ok(EncoderStrategy::TfIdf));
        assert_eq!(" ollama ".parse(), Ok(EncoderStrategy::Ollama));
        assert_eq!("hashing".parse(), Ok(EncoderStrategy::Hashing));
        assert!("bert".parse::<EncoderStrategy>().is_err());
    }

    #[test]
    fn summarization_provider_accepts_off_alias() {
        assert_eq!("off".parse(), Ok(SummarizationProvider::None));
        assert_eq!("Extractive".parse(), Ok(SummarizationProvider::Extractive));
        assert!("gpt".parse::<SummarizationProvider>().is_err());
    }

    #[test]
    fn encoder_config_loads_without_job_store_url() {
        let env = vars(&[("ENCODER_STRATEGY", "hashing"), ("EMBEDDING_DIMENSION", "4")]);
        let encoder = EncoderConfig::from_vars(&lookup(&env)).expect("encoder config");
        assert_eq!(encoder.strategy, EncoderStrategy::Hashing);
        assert_eq!(encoder.dimension, 4);
        assert_eq!(encoder.state_path, PathBuf::from(DEFAULT_ENCODER_STATE_PATH));

        let error = Config::from_vars(&lookup(&env)).unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "JOB_STORE_URL"));
    }

    #[test]
    fn tfidf_dimension_and_model_are_optional() {
        let env = vars(&[("ENCODER_STRATEGY", "tfidf")]);
        let encoder = EncoderConfig::from_vars(&lookup(&env)).expect("encoder config");
        assert_eq!(encoder.dimension, 0);
        assert!(encoder.model.is_empty());

        let env = vars(&[("ENCODER_STRATEGY", "ollama"), ("EMBEDDING_DIMENSION", "768")]);
        let error = EncoderConfig::from_vars(&lookup(&env)).unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "EMBEDDING_MODEL"));
    }

    #[test]
    fn chunking_rejects_overlap_not_smaller_than_size() {
        let env = vars(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "100")]);
        assert!(matches!(
            ChunkingConfig::from_vars(&lookup(&env)),
            Err(ConfigError::InvalidValue(key)) if key == "CHUNK_OVERLAP"
        ));
        let defaults = ChunkingConfig::from_vars(&lookup(&vars(&[]))).unwrap();
        assert_eq!(defaults.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(defaults.chunk_overlap, DEFAULT_CHUNK_OVERLAP);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn loaded_configuration_is_reported_to_the_installed_subscriber() {
        let env = vars(&[
            ("JOB_STORE_URL", "memory://"),
            ("ENCODER_STRATEGY", "hashing"),
            ("EMBEDDING_DIMENSION", "8"),
        ]);
        let config = Config::from_vars(&lookup(&env)).unwrap();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || log_loaded(&config));

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Loaded configuration"));
        assert!(output.contains("Hashing"));
    }

    #[test]
    fn full_config_applies_defaults() {
        let env = vars(&[
            ("JOB_STORE_URL", "memory://"),
            ("ENCODER_STRATEGY", "hashing"),
            ("EMBEDDING_DIMENSION", "384"),
            ("WORKER_COUNT", "0"),
        ]);
        let config = Config::from_vars(&lookup(&env)).expect("config");
        assert_eq!(config.job_store_database, DEFAULT_DATABASE);
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.busy_delay, Duration::from_millis(DEFAULT_BUSY_DELAY_MS));
        assert_eq!(config.summarization_provider, SummarizationProvider::None);
        assert!(config.stale_processing_timeout.is_none());
    }
}
