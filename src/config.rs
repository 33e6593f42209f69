//! Environment-driven configuration.
//!
//! Unlike earlier iterations of this codebase there is no process-global
//! configuration cell: `Config` is loaded once near process start and handed
//! by reference (or `Arc`) to the components that need it.

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
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

/// Supported embedding backends for the retrieval pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime reached over HTTP.
    Ollama,
    /// Deterministic hashing embedder, useful offline and in tests.
    Hash,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

/// Runtime configuration for the retrieval and generation core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the local Ollama runtime (embeddings and generation).
    pub ollama_url: String,
    /// Model used for Ollama text generation.
    pub ollama_generation_model: String,
    /// OpenRouter API key, when the provider is configured.
    pub openrouter_api_key: Option<String>,
    /// OpenRouter chat model identifier.
    pub openrouter_model: String,
    /// OpenRouter base URL (overridable for tests).
    pub openrouter_url: String,
    /// Cohere API key, when the provider is configured.
    pub cohere_api_key: Option<String>,
    /// Cohere chat model identifier.
    pub cohere_model: String,
    /// Cohere base URL (overridable for tests).
    pub cohere_url: String,
    /// Ordered list of generation providers to try.
    pub generation_providers: Vec<String>,
    /// Per-provider request timeout.
    pub provider_timeout: Duration,
    /// Retry attempts per provider for transient transport errors.
    pub provider_max_retries: u32,
    /// Sampling temperature passed to generation providers.
    pub generation_temperature: f32,
    /// Token cap passed to generation providers.
    pub generation_max_tokens: u32,
    /// Word window used when chunking note text.
    pub chunk_max_words: usize,
    /// Word overlap between adjacent chunks.
    pub chunk_overlap_words: usize,
    /// Default number of hits returned by retrieval.
    pub search_top_k: usize,
    /// Over-fetch multiplier applied before patient filtering.
    pub search_overfetch_multiplier: usize,
    /// Word budget for the contract's `one_line` field.
    pub one_line_word_budget: usize,
    /// Word budget for each contract bullet.
    pub bullet_word_budget: usize,
    /// Directory holding the persisted index files.
    pub index_data_dir: PathBuf,
    /// Path of the on-disk summary cache; `None` keeps the cache in memory.
    pub cache_path: Option<PathBuf>,
    /// Cache time-to-live; `None` means entries live until invalidated.
    pub cache_ttl: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables, applying defaults for
    /// everything that is not operationally required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .unwrap_or_else(|| "hash".to_string())
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION", 384)?,
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| "http://127.0.0.1:11434".to_string()),
            ollama_generation_model: load_env_optional("OLLAMA_MODEL")
                .unwrap_or_else(|| "llama3.1:8b".to_string()),
            openrouter_api_key: load_env_optional("OPENROUTER_API_KEY"),
            openrouter_model: load_env_optional("OPENROUTER_MODEL")
                .unwrap_or_else(|| "meta-llama/llama-3.1-8b-instruct".to_string()),
            openrouter_url: load_env_optional("OPENROUTER_URL")
                .unwrap_or_else(|| "https://openrouter.ai".to_string()),
            cohere_api_key: load_env_optional("COHERE_API_KEY"),
            cohere_model: load_env_optional("COHERE_MODEL")
                .unwrap_or_else(|| "command-r-08-2024".to_string()),
            cohere_url: load_env_optional("COHERE_URL")
                .unwrap_or_else(|| "https://api.cohere.com".to_string()),
            generation_providers: parse_provider_list(
                load_env_optional("GENERATION_PROVIDERS").as_deref(),
            ),
            provider_timeout: Duration::from_secs(parse_env("PROVIDER_TIMEOUT_SECONDS", 20)?),
            provider_max_retries: parse_env("PROVIDER_MAX_RETRIES", 2)?,
            generation_temperature: parse_env("GENERATION_TEMPERATURE", 0.2_f32)?,
            generation_max_tokens: parse_env("GENERATION_MAX_TOKENS", 300)?,
            chunk_max_words: parse_env("CHUNK_MAX_WORDS", 200)?,
            chunk_overlap_words: parse_env("CHUNK_OVERLAP_WORDS", 50)?,
            search_top_k: parse_env("SEARCH_TOP_K", 5)?,
            search_overfetch_multiplier: parse_env("SEARCH_OVERFETCH_MULTIPLIER", 3)?,
            one_line_word_budget: parse_env("SUMMARY_ONE_LINE_WORDS", 12)?,
            bullet_word_budget: parse_env("SUMMARY_BULLET_WORDS", 20)?,
            index_data_dir: load_env_optional("INDEX_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            cache_path: load_env_optional("SUMMARY_CACHE_PATH").map(PathBuf::from),
            cache_ttl: load_env_optional("CACHE_TTL_SECONDS")
                .map(|value| {
                    value
                        .parse()
                        .map(Duration::from_secs)
                        .map_err(|_| ConfigError::InvalidValue("CACHE_TTL_SECONDS".to_string()))
                })
                .transpose()?,
        })
    }

    /// Load `.env` (when present) and then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            embedding_provider = ?config.embedding_provider,
            embedding_model = %config.embedding_model,
            dimension = config.embedding_dimension,
            providers = ?config.generation_providers,
            "Loaded configuration"
        );
        Ok(config)
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Split the ordered provider list, dropping empty segments.
pub(crate) fn parse_provider_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("openrouter,cohere,ollama")
        .split(',')
        .map(|entry| entry.trim().to_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_list_defaults_to_original_order() {
        assert_eq!(
            parse_provider_list(None),
            vec!["openrouter", "cohere", "ollama"]
        );
    }

    #[test]
    fn provider_list_trims_and_lowercases() {
        assert_eq!(
            parse_provider_list(Some(" Ollama , ,OPENROUTER")),
            vec!["ollama", "openrouter"]
        );
    }

    #[test]
    fn embedding_provider_parses_known_names() {
        assert_eq!(
            "ollama".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Ollama)
        );
        assert_eq!(
            "Hash".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Hash)
        );
        assert!("openai".parse::<EmbeddingProvider>().is_err());
    }
}
