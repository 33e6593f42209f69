//! Local Ollama generation adapter.

use super::{GenerationProvider, ProviderError, send_with_backoff};
use crate::config::Config;
use crate::generation::prompt::{BrevityLimits, build_prompt};
use crate::retrieval::RetrievalHit;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

/// Provider backed by a local Ollama runtime.
pub struct OllamaProvider {
    http: Client,
    base_url: String,
    model: String,
    limits: BrevityLimits,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

impl OllamaProvider {
    /// Construct the adapter from configuration.
    pub fn new(config: &Config, limits: BrevityLimits) -> Self {
        let http = Client::builder()
            .user_agent("emr-recall/generate")
            .timeout(config.provider_timeout)
            .build()
            .expect("Failed to construct reqwest::Client for Ollama");
        Self {
            http,
            base_url: config.ollama_url.clone(),
            model: config.ollama_generation_model.clone(),
            limits,
            temperature: config.generation_temperature,
            max_tokens: config.generation_max_tokens,
            max_retries: config.provider_max_retries,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(
        &self,
        hits: &[RetrievalHit],
        question: Option<&str>,
    ) -> Result<String, ProviderError> {
        let prompt = build_prompt(hits, question, self.limits);
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
                "top_k": 10,
                "top_p": 0.3,
                "repeat_penalty": 1.1,
            }
        });

        let response = send_with_backoff("ollama", self.max_retries, || {
            self.http.post(self.endpoint()).json(&payload)
        })
        .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::Unavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            ProviderError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(ProviderError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}
