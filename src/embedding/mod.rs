//! Embedding client abstraction and adapters.
//!
//! The retrieval core depends only on "text in, fixed-length vector out". The
//! Ollama adapter issues HTTP requests to a local runtime; the hashing client
//! is a deterministic stand-in for offline use and tests.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider was unreachable.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Produce an embedding vector for each supplied text, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Dimensionality of every vector this client produces.
    fn dimension(&self) -> usize;
}

/// Build an embedding client suitable for the given configuration.
pub fn client_from_config(config: &Config) -> Box<dyn EmbeddingClient> {
    match config.embedding_provider {
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
        )),
        EmbeddingProvider::Hash => Box::new(HashEmbeddingClient::new(config.embedding_dimension)),
    }
}

/// Deterministic embedding client hashing bytes into a normalized vector.
///
/// Not a semantic embedder. It exists so the pipeline stays exercisable with
/// no model runtime present, with bit-stable output for a given input.
pub struct HashEmbeddingClient {
    dimension: usize,
}

impl HashEmbeddingClient {
    /// Construct a client producing vectors of the given dimensionality.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self::encode(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbeddingClient {
    /// Construct a client against the given Ollama base URL.
    pub fn new(base_url: String, model: String, dimension: usize) -> Self {
        let http = Client::builder()
            .user_agent("emr-recall/embed")
            .build()
            .expect("Failed to construct reqwest::Client for embeddings");
        Self {
            http,
            base_url,
            model,
            dimension,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let payload = json!({
            "model": self.model,
            "prompt": text,
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaEmbeddingResponse = response.json().await.map_err(|error| {
            EmbeddingError::GenerationFailed(format!(
                "failed to decode Ollama embedding response: {error}"
            ))
        })?;

        if body.embedding.len() != self.dimension {
            return Err(EmbeddingError::GenerationFailed(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                body.embedding.len()
            )));
        }

        Ok(body.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
