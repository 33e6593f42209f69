//! Ordered provider fallback with a deterministic terminal path.
//!
//! Providers are tried one at a time, in priority order; each call is gated
//! by the validator, so a provider that answers with an unusable shape is
//! treated the same as one that errors. When the whole chain fails, the
//! result is built extractively from the retrieval hits themselves, which
//! only slices strings that already exist and therefore cannot fail.

use super::contract::{GenerationContract, SourceRef};
use super::prompt::BrevityLimits;
use super::providers::GenerationProvider;
use super::validate::{ResponseValidator, truncate_words};
use crate::metrics::RecallMetrics;
use crate::retrieval::RetrievalHit;
use std::sync::Arc;

/// Name recorded when the deterministic fallback produced the contract.
pub const FALLBACK_PROVIDER: &str = "fallback";

/// A validated contract plus the name of the provider that produced it.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The schema-validated payload.
    pub contract: GenerationContract,
    /// Winning provider, or [`FALLBACK_PROVIDER`].
    pub provider: String,
}

/// Walks the configured provider chain until one output validates.
pub struct GenerationOrchestrator {
    providers: Vec<Box<dyn GenerationProvider>>,
    validator: ResponseValidator,
    limits: BrevityLimits,
    metrics: Arc<RecallMetrics>,
}

impl GenerationOrchestrator {
    /// Assemble an orchestrator over an ordered provider chain.
    pub fn new(
        providers: Vec<Box<dyn GenerationProvider>>,
        limits: BrevityLimits,
        metrics: Arc<RecallMetrics>,
    ) -> Self {
        Self {
            providers,
            validator: ResponseValidator::new(limits),
            limits,
            metrics,
        }
    }

    /// Try each provider in order; fall back deterministically when the whole
    /// chain fails. This method cannot itself fail.
    pub async fn generate(
        &self,
        hits: &[RetrievalHit],
        question: Option<&str>,
    ) -> GenerationResult {
        for provider in &self.providers {
            match provider.generate(hits, question).await {
                Ok(raw) => match self.validator.validate(&raw) {
                    Ok(contract) => {
                        tracing::info!(provider = provider.name(), "Generation succeeded");
                        return GenerationResult {
                            contract,
                            provider: provider.name().to_string(),
                        };
                    }
                    Err(error) => {
                        self.metrics.record_provider_failure();
                        tracing::warn!(
                            provider = provider.name(),
                            error = %error,
                            "Provider output failed validation; advancing"
                        );
                    }
                },
                Err(error) => {
                    self.metrics.record_provider_failure();
                    tracing::warn!(
                        provider = provider.name(),
                        error = %error,
                        "Provider call failed; advancing"
                    );
                }
            }
        }

        self.metrics.record_fallback();
        tracing::warn!("All providers failed; using deterministic fallback");
        GenerationResult {
            contract: fallback_contract(hits, self.limits),
            provider: FALLBACK_PROVIDER.to_string(),
        }
    }
}

/// Build a non-generative contract directly from retrieval hits.
///
/// Total over its input: an empty hit list, or hits with empty snippets,
/// still yield a well-formed contract.
pub fn fallback_contract(hits: &[RetrievalHit], limits: BrevityLimits) -> GenerationContract {
    let one_line = hits
        .first()
        .map(|hit| truncate_words(hit.chunk.text.trim(), limits.one_line_words))
        .filter(|line| !line.is_empty())
        .unwrap_or_else(|| "No supporting notes were retrieved".to_string());

    let bullets: Vec<String> = hits
        .iter()
        .take(4)
        .map(|hit| {
            let bullet = truncate_words(hit.chunk.text.trim(), limits.bullet_words);
            if bullet.is_empty() {
                format!("Note {} (no text)", hit.chunk.note_id)
            } else {
                bullet
            }
        })
        .collect();
    let bullets = if bullets.is_empty() {
        vec!["No clinical data to analyze".to_string()]
    } else {
        bullets
    };

    let sources = hits
        .iter()
        .map(|hit| SourceRef {
            note_id: hit.chunk.note_id,
            score: hit.score,
        })
        .collect();

    GenerationContract {
        one_line,
        bullets,
        sources,
    }
}
