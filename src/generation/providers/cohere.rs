//! Cohere chat adapter.

use super::{GenerationProvider, ProviderError, send_with_backoff};
use crate::config::Config;
use crate::generation::prompt::{BrevityLimits, build_prompt};
use crate::retrieval::RetrievalHit;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Provider backed by the Cohere chat API.
pub struct CohereProvider {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    limits: BrevityLimits,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

#[derive(Debug, Deserialize)]
struct CohereChatResponse {
    text: String,
}

impl CohereProvider {
    /// Construct the adapter from configuration.
    pub fn new(config: &Config, limits: BrevityLimits) -> Self {
        let http = Client::builder()
            .user_agent("emr-recall/generate")
            .timeout(config.provider_timeout)
            .build()
            .expect("Failed to construct reqwest::Client for Cohere");
        Self {
            http,
            base_url: config.cohere_url.clone(),
            api_key: config.cohere_api_key.clone(),
            model: config.cohere_model.clone(),
            limits,
            temperature: config.generation_temperature,
            max_tokens: config.generation_max_tokens,
            max_retries: config.provider_max_retries,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationProvider for CohereProvider {
    fn name(&self) -> &'static str {
        "cohere"
    }

    async fn generate(
        &self,
        hits: &[RetrievalHit],
        question: Option<&str>,
    ) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unavailable("COHERE_API_KEY not set".to_string()))?;

        let prompt = build_prompt(hits, question, self.limits);
        let payload = json!({
            "model": self.model,
            "message": prompt,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = send_with_backoff("cohere", self.max_retries, || {
            self.http
                .post(self.endpoint())
                .bearer_auth(api_key)
                .json(&payload)
        })
        .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(format!(
                "Cohere returned {status}: {body}"
            )));
        }

        let body: CohereChatResponse = response.json().await.map_err(|error| {
            ProviderError::InvalidResponse(format!("failed to decode Cohere response: {error}"))
        })?;

        Ok(body.text)
    }
}
