//! OpenRouter chat-completions adapter.

use super::{GenerationProvider, ProviderError, send_with_backoff};
use crate::config::Config;
use crate::generation::prompt::{BrevityLimits, build_prompt};
use crate::retrieval::RetrievalHit;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Provider backed by the OpenRouter chat completions API.
pub struct OpenRouterProvider {
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
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenRouterProvider {
    /// Construct the adapter from configuration.
    pub fn new(config: &Config, limits: BrevityLimits) -> Self {
        let http = Client::builder()
            .user_agent("emr-recall/generate")
            .timeout(config.provider_timeout)
            .build()
            .expect("Failed to construct reqwest::Client for OpenRouter");
        Self {
            http,
            base_url: config.openrouter_url.clone(),
            api_key: config.openrouter_api_key.clone(),
            model: config.openrouter_model.clone(),
            limits,
            temperature: config.generation_temperature,
            max_tokens: config.generation_max_tokens,
            max_retries: config.provider_max_retries,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl GenerationProvider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    async fn generate(
        &self,
        hits: &[RetrievalHit],
        question: Option<&str>,
    ) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unavailable("OPENROUTER_API_KEY not set".to_string()))?;

        let prompt = build_prompt(hits, question, self.limits);
        let payload = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "user", "content": prompt },
            ],
        });

        let response = send_with_backoff("openrouter", self.max_retries, || {
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
                "OpenRouter returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            ProviderError::InvalidResponse(format!("failed to decode OpenRouter response: {error}"))
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("OpenRouter response had no choices".to_string())
            })
    }
}
