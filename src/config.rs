use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_WATCH_DIRECTORY: &str = "documents";
const DEFAULT_SUPPORTED_FORMATS: &str = "txt,md";
const DEFAULT_CHUNK_SIZE: usize = 500;
const DEFAULT_CHUNK_OVERLAP: usize = 50;
const DEFAULT_API_POLL_INTERVAL_SECS: u64 = 60;
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OBJECT_STORE_ROOT: &str = "archive";
const DEFAULT_OBJECT_STORE_BUCKET: &str = "documents";
const DEFAULT_TRACKING_DIR: &str = "runs";
const DEFAULT_EXPERIMENT_NAME: &str = "document-ingestion";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_FILE: &str = "logs/docflow.log";

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

/// Runtime configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory watched by the folder source.
    pub watch_directory: PathBuf,
    /// Lowercase file extensions accepted by the folder source.
    pub supported_formats: Vec<String>,
    /// Optional endpoint polled by the API source.
    pub api_endpoint: Option<String>,
    /// Interval between API polls.
    pub api_poll_interval: Duration,
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared between neighbouring chunks.
    pub chunk_overlap: usize,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection used for chunk storage.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Root directory of the local object store.
    pub object_store_root: PathBuf,
    /// Bucket directory under the object store root.
    pub object_store_bucket: String,
    /// Directory receiving experiment run logs.
    pub tracking_dir: PathBuf,
    /// Experiment name used to group runs.
    pub experiment_name: String,
    /// Optional port for the observability HTTP server.
    pub metrics_port: Option<u16>,
    /// Upper bound on waiting for handlers and the worker during shutdown.
    pub shutdown_timeout: Duration,
    /// File receiving a copy of every log line.
    pub log_file: PathBuf,
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Deterministic in-process hashing embeddings.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let chunk_size = parse_optional("CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE);
        let chunk_overlap = parse_optional("CHUNK_OVERLAP")?.unwrap_or(DEFAULT_CHUNK_OVERLAP);
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".to_string()));
        }

        Ok(Self {
            watch_directory: load_env_optional("INGEST_WATCH_DIRECTORY")
                .unwrap_or_else(|| DEFAULT_WATCH_DIRECTORY.to_string())
                .into(),
            supported_formats: parse_supported_formats(
                &load_env_optional("INGEST_SUPPORTED_FORMATS")
                    .unwrap_or_else(|| DEFAULT_SUPPORTED_FORMATS.to_string()),
            )
            .ok_or_else(|| ConfigError::InvalidValue("INGEST_SUPPORTED_FORMATS".to_string()))?,
            api_endpoint: load_env_optional("INGEST_API_ENDPOINT"),
            api_poll_interval: Duration::from_secs(
                parse_optional("INGEST_API_POLL_INTERVAL_SECS")?
                    .unwrap_or(DEFAULT_API_POLL_INTERVAL_SECS)
                    .max(1),
            ),
            chunk_size,
            chunk_overlap,
            embedding_provider: load_env("EMBEDDING_PROVIDER")?.parse().map_err(|()| {
                ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string())
            })?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .ok()
                .filter(|dimension: &usize| *dimension > 0)
                .ok_or_else(|| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            object_store_root: load_env_optional("OBJECT_STORE_ROOT")
                .unwrap_or_else(|| DEFAULT_OBJECT_STORE_ROOT.to_string())
                .into(),
            object_store_bucket: load_env_optional("OBJECT_STORE_BUCKET")
                .unwrap_or_else(|| DEFAULT_OBJECT_STORE_BUCKET.to_string()),
            tracking_dir: load_env_optional("TRACKING_DIR")
                .unwrap_or_else(|| DEFAULT_TRACKING_DIR.to_string())
                .into(),
            experiment_name: load_env_optional("EXPERIMENT_NAME")
                .unwrap_or_else(|| DEFAULT_EXPERIMENT_NAME.to_string()),
            metrics_port: parse_optional("METRICS_PORT")?,
            shutdown_timeout: Duration::from_secs(
                parse_optional("SHUTDOWN_TIMEOUT_SECS")?.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            ),
            log_file: load_env_optional("LOG_FILE")
                .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string())
                .into(),
        })
    }
}

/// Normalize a comma separated extension list into lowercase entries without leading dots.
///
/// Returns `None` when the list contains no usable extension.
pub fn parse_supported_formats(raw: &str) -> Option<Vec<String>> {
    let mut formats: Vec<String> = raw
        .split(',')
        .map(|entry| entry.trim().trim_start_matches('.').to_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect();
    formats.sort();
    formats.dedup();
    if formats.is_empty() {
        None
    } else {
        Some(formats)
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Load `.env` (when present) and the environment into a validated [`Config`].
///
/// Runs before tracing is installed, so it reports nothing itself.
pub fn load_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    Config::from_env()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_formats_are_normalized() {
        let formats = parse_supported_formats(" TXT, .md,,pdf ,txt").expect("formats");
        assert_eq!(formats, vec!["md", "pdf", "txt"]);
    }

    #[test]
    fn empty_format_list_is_rejected() {
        assert!(parse_supported_formats(" , ,").is_none());
    }

    #[test]
    fn embedding_provider_parses_case_insensitively() {
        assert_eq!("Ollama".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Ollama));
        assert_eq!("hashing".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Hashing));
        assert_eq!("openai".parse::<EmbeddingProvider>(), Err(()));
    }
}
