//! Generation provider adapters.
//!
//! Every provider satisfies the same contract: given retrieval hits and an
//! optional question, return raw text or fail. Authentication, wire formats,
//! and rate limits stay inside each adapter; the orchestrator makes zero
//! assumptions beyond "returns text or fails".

mod cohere;
mod ollama;
mod openrouter;

pub use cohere::CohereProvider;
pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;

use crate::config::Config;
use crate::generation::prompt::BrevityLimits;
use crate::retrieval::RetrievalHit;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A provider failure; all variants advance the orchestrator's fallback chain.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider is not configured or cannot be reached at all.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// Provider answered with an error status or malformed transport result.
    #[error("provider request failed: {0}")]
    RequestFailed(String),
    /// Provider answered, but its payload shape was unusable.
    #[error("provider response malformed: {0}")]
    InvalidResponse(String),
    /// Provider exceeded its per-call time budget.
    #[error("provider timed out: {0}")]
    Timeout(String),
}

/// Interface implemented by text-generation backends.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Stable name used in logs, config ordering, and the cached provider tag.
    fn name(&self) -> &'static str;

    /// Produce raw text for the given hits and optional question.
    async fn generate(
        &self,
        hits: &[RetrievalHit],
        question: Option<&str>,
    ) -> Result<String, ProviderError>;
}

/// Build the configured provider chain in priority order. Unknown names are
/// logged and skipped so a typo degrades the chain instead of breaking it.
pub fn providers_from_config(
    config: &Config,
    limits: BrevityLimits,
) -> Vec<Box<dyn GenerationProvider>> {
    let mut providers: Vec<Box<dyn GenerationProvider>> = Vec::new();
    for name in &config.generation_providers {
        match name.as_str() {
            "openrouter" => providers.push(Box::new(OpenRouterProvider::new(config, limits))),
            "cohere" => providers.push(Box::new(CohereProvider::new(config, limits))),
            "ollama" => providers.push(Box::new(OllamaProvider::new(config, limits))),
            other => {
                tracing::warn!(provider = other, "Unknown generation provider; skipping");
            }
        }
    }
    providers
}

/// Send a request, retrying transient transport errors with bounded
/// exponential backoff. Error statuses are not retried here; a provider's
/// first unrecoverable failure belongs to the orchestrator's fallback chain.
pub(crate) async fn send_with_backoff<F>(
    provider: &'static str,
    max_retries: u32,
    mut request: F,
) -> Result<reqwest::Response, ProviderError>
where
    F: FnMut() -> reqwest::RequestBuilder + Send,
{
    let mut attempt: u32 = 0;
    loop {
        match request().send().await {
            Ok(response) => return Ok(response),
            Err(error) if attempt < max_retries && (error.is_timeout() || error.is_connect()) => {
                let delay = Duration::from_millis(200u64.saturating_mul(1 << attempt));
                tracing::debug!(
                    provider,
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Transient transport error; backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) if error.is_timeout() => {
                return Err(ProviderError::Timeout(error.to_string()));
            }
            Err(error) => return Err(ProviderError::Unavailable(error.to_string())),
        }
    }
}
