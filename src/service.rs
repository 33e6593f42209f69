//! Top-level service composing retrieval, generation and the summary cache.
//!
//! This is the entry point external surfaces (CLI, HTTP handlers) talk to.
//! Question answering always runs the live pipeline; whole-patient summaries
//! consult the cache first and are written back on completion. Concurrent
//! summary requests for the same patient are collapsed so only one pays the
//! generation cost.

use crate::cache::{FreshnessPolicy, SummaryCache, store_from_path};
use crate::config::Config;
use crate::embedding::client_from_config;
use crate::generation::orchestrator::fallback_contract;
use crate::generation::providers::{GenerationProvider, providers_from_config};
use crate::generation::{
    BrevityLimits, CachedSummary, GenerationContract, GenerationOrchestrator,
};
use crate::metrics::{MetricsSnapshot, RecallMetrics};
use crate::notes::NoteStore;
use crate::retrieval::{IndexBuildSummary, RetrievalEngine, RetrievalError, RetrievalHit};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Retrieval query used when summarizing a whole patient record.
const SUMMARY_QUERY: &str =
    "overall clinical picture: active diagnoses, medications, recent changes and follow-up plans";

/// A generated (or cached) summary together with its provenance.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// The validated payload.
    pub contract: GenerationContract,
    /// Provider that produced it; `"fallback"` for the deterministic path,
    /// `"none"` when the patient had no retrievable notes.
    pub provider: String,
    /// Whether the payload was served from the summary cache.
    pub from_cache: bool,
}

/// Facade over the retrieval engine, provider chain and summary cache.
pub struct RecallService {
    engine: RetrievalEngine,
    orchestrator: GenerationOrchestrator,
    cache: SummaryCache,
    metrics: Arc<RecallMetrics>,
    limits: BrevityLimits,
    top_k: usize,
    // Per-patient single-flight guards for summary generation.
    inflight: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl RecallService {
    /// Assemble the full pipeline from configuration.
    pub fn new(config: &Config, store: Arc<dyn NoteStore>) -> Self {
        let limits = BrevityLimits {
            one_line_words: config.one_line_word_budget,
            bullet_words: config.bullet_word_budget,
        };
        let providers = providers_from_config(config, limits);
        Self::with_providers(config, store, providers)
    }

    /// Assemble the pipeline with an explicit provider chain. Used by tests
    /// and by callers that construct providers themselves.
    pub fn with_providers(
        config: &Config,
        store: Arc<dyn NoteStore>,
        providers: Vec<Box<dyn GenerationProvider>>,
    ) -> Self {
        let metrics = Arc::new(RecallMetrics::new());
        let limits = BrevityLimits {
            one_line_words: config.one_line_word_budget,
            bullet_words: config.bullet_word_budget,
        };
        let policy = config
            .cache_ttl
            .map(FreshnessPolicy::MaxAge)
            .unwrap_or(FreshnessPolicy::UntilInvalidated);
        Self {
            engine: RetrievalEngine::new(
                config,
                client_from_config(config),
                store,
                metrics.clone(),
            ),
            orchestrator: GenerationOrchestrator::new(providers, limits, metrics.clone()),
            cache: SummaryCache::new(store_from_path(config.cache_path.as_deref()), policy),
            metrics,
            limits,
            top_k: config.search_top_k.max(1),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild the vector index from the note store.
    pub async fn build_index(&self) -> Result<IndexBuildSummary, RetrievalError> {
        self.engine.build_index().await
    }

    /// Retrieve scored chunks for a patient without running generation.
    pub async fn retrieve(
        &self,
        patient_id: i64,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<RetrievalHit>, RetrievalError> {
        self.engine.retrieve(patient_id, query_text, k).await
    }

    /// Answer a question about a patient, or summarize the whole record when
    /// `question` is `None`.
    ///
    /// Only whole-record summaries hit the cache; question answers always run
    /// the live pipeline.
    pub async fn summarize_or_answer(
        &self,
        patient_id: i64,
        question: Option<&str>,
    ) -> Result<GenerationOutcome, RetrievalError> {
        let Some(question) = question else {
            if let Some(cached) = self.cache.get(patient_id).await {
                self.metrics.record_cache_hit();
                tracing::debug!(patient_id, "Serving cached summary");
                return Ok(GenerationOutcome {
                    contract: cached.payload,
                    provider: cached.source_provider,
                    from_cache: true,
                });
            }
            self.metrics.record_cache_miss();
            return self.summarize_single_flight(patient_id).await;
        };

        let hits = self
            .engine
            .retrieve(patient_id, question, self.top_k)
            .await?;
        Ok(self.generate_outcome(&hits, Some(question)).await)
    }

    /// Drop the cached summary for a patient. Called by note mutation paths.
    pub async fn invalidate_cache(&self, patient_id: i64) {
        self.cache.invalidate(patient_id).await;
    }

    /// Point-in-time counters for the whole pipeline.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn summarize_single_flight(
        &self,
        patient_id: i64,
    ) -> Result<GenerationOutcome, RetrievalError> {
        let guard = {
            let mut map = self.inflight.lock().await;
            map.entry(patient_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        let outcome = {
            let _held = guard.lock().await;
            self.summarize_uncached(patient_id).await
        };

        // Last holder out evicts the guard so the map stays bounded by the
        // number of patients currently generating, not ever seen.
        let mut map = self.inflight.lock().await;
        if Arc::strong_count(&guard) == 2 {
            map.remove(&patient_id);
        }
        drop(map);

        outcome
    }

    async fn summarize_uncached(
        &self,
        patient_id: i64,
    ) -> Result<GenerationOutcome, RetrievalError> {
        // A concurrent request may have populated the cache while we waited.
        if let Some(cached) = self.cache.get(patient_id).await {
            self.metrics.record_cache_hit();
            return Ok(GenerationOutcome {
                contract: cached.payload,
                provider: cached.source_provider,
                from_cache: true,
            });
        }

        let hits = self
            .engine
            .retrieve(patient_id, SUMMARY_QUERY, self.top_k)
            .await?;
        let outcome = self.generate_outcome(&hits, None).await;

        // "No data" is a live condition, not a result worth pinning.
        if !hits.is_empty() {
            self.cache
                .put(CachedSummary {
                    patient_id,
                    source_provider: outcome.provider.clone(),
                    payload: outcome.contract.clone(),
                    updated_at: 0,
                })
                .await;
        }
        Ok(outcome)
    }

    async fn generate_outcome(
        &self,
        hits: &[RetrievalHit],
        question: Option<&str>,
    ) -> GenerationOutcome {
        if hits.is_empty() {
            return GenerationOutcome {
                contract: fallback_contract(&[], self.limits),
                provider: "none".to_string(),
                from_cache: false,
            };
        }
        let result = self.orchestrator.generate(hits, question).await;
        GenerationOutcome {
            contract: result.contract,
            provider: result.provider,
            from_cache: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingProvider;
    use crate::generation::providers::ProviderError;
    use crate::notes::{InMemoryNoteStore, NoteRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
        succeed: bool,
        delay: std::time::Duration,
    }

    #[async_trait]
    impl GenerationProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn generate(
            &self,
            _hits: &[RetrievalHit],
            _question: Option<&str>,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.succeed {
                Ok(r#"{"one_line":"stable","bullets":["on metformin"]}"#.to_string())
            } else {
                Err(ProviderError::Unavailable("down".to_string()))
            }
        }
    }

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            embedding_provider: EmbeddingProvider::Hash,
            embedding_model: "hash".into(),
            embedding_dimension: 32,
            ollama_url: "http://127.0.0.1:11434".into(),
            ollama_generation_model: "llama3.1:8b".into(),
            openrouter_api_key: None,
            openrouter_model: "m".into(),
            openrouter_url: "http://127.0.0.1:1".into(),
            cohere_api_key: None,
            cohere_model: "m".into(),
            cohere_url: "http://127.0.0.1:1".into(),
            generation_providers: vec![],
            provider_timeout: std::time::Duration::from_secs(1),
            provider_max_retries: 0,
            generation_temperature: 0.2,
            generation_max_tokens: 100,
            chunk_max_words: 50,
            chunk_overlap_words: 10,
            search_top_k: 5,
            search_overfetch_multiplier: 3,
            one_line_word_budget: 12,
            bullet_word_budget: 20,
            index_data_dir: dir.join("index"),
            cache_path: None,
            cache_ttl: None,
        }
    }

    fn notes_for_patient(patient_id: i64) -> Vec<NoteRecord> {
        vec![
            NoteRecord {
                note_id: 1,
                patient_id,
                text: "Type 2 diabetes, well controlled on metformin".to_string(),
                note_date: "2024-03-10".to_string(),
            },
            NoteRecord {
                note_id: 2,
                patient_id,
                text: "Blood pressure elevated, started lisinopril".to_string(),
                note_date: "2024-04-02".to_string(),
            },
        ]
    }

    fn service_with_provider(
        dir: &std::path::Path,
        notes: Vec<NoteRecord>,
        calls: Arc<AtomicUsize>,
        succeed: bool,
    ) -> RecallService {
        RecallService::with_providers(
            &test_config(dir),
            Arc::new(InMemoryNoteStore::new(notes)),
            vec![Box::new(CountingProvider {
                calls,
                succeed,
                delay: std::time::Duration::ZERO,
            })],
        )
    }

    #[tokio::test]
    async fn summary_is_cached_after_first_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(AtomicUsize::new(0));
        let service =
            service_with_provider(dir.path(), notes_for_patient(1), calls.clone(), true);
        service.build_index().await.expect("build");

        let first = service.summarize_or_answer(1, None).await.expect("first");
        assert!(!first.from_cache);
        assert_eq!(first.provider, "counting");

        let second = service.summarize_or_answer(1, None).await.expect("second");
        assert!(second.from_cache);
        assert_eq!(second.contract, first.contract);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(service.inflight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn questions_bypass_the_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(AtomicUsize::new(0));
        let service =
            service_with_provider(dir.path(), notes_for_patient(1), calls.clone(), true);
        service.build_index().await.expect("build");

        for _ in 0..2 {
            let outcome = service
                .summarize_or_answer(1, Some("what diabetes medication is in use?"))
                .await
                .expect("answer");
            assert!(!outcome.from_cache);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_cache_misses_generate_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(AtomicUsize::new(0));
        let service = RecallService::with_providers(
            &test_config(dir.path()),
            Arc::new(InMemoryNoteStore::new(notes_for_patient(1))),
            vec![Box::new(CountingProvider {
                calls: calls.clone(),
                succeed: true,
                delay: std::time::Duration::from_millis(20),
            })],
        );
        service.build_index().await.expect("build");

        let (first, second) = tokio::join!(
            service.summarize_or_answer(1, None),
            service.summarize_or_answer(1, None),
        );
        let first = first.expect("first");
        let second = second.expect("second");

        // One request generated, the other waited and was served its result.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(first.from_cache != second.from_cache);
        assert_eq!(first.contract, second.contract);

        // The per-patient guard is evicted once both requests finish.
        assert!(service.inflight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn invalidation_forces_regeneration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(AtomicUsize::new(0));
        let service =
            service_with_provider(dir.path(), notes_for_patient(1), calls.clone(), true);
        service.build_index().await.expect("build");

        service.summarize_or_answer(1, None).await.expect("first");
        service.invalidate_cache(1).await;
        let regenerated = service.summarize_or_answer(1, None).await.expect("second");
        assert!(!regenerated.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn patient_without_notes_gets_uncached_no_data_contract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(AtomicUsize::new(0));
        let service =
            service_with_provider(dir.path(), notes_for_patient(1), calls.clone(), true);
        service.build_index().await.expect("build");

        let outcome = service.summarize_or_answer(42, None).await.expect("empty");
        assert_eq!(outcome.provider, "none");
        assert!(!outcome.from_cache);
        assert!(outcome.contract.sources.is_empty());

        // Still uncached on repeat: no providers were ever invoked.
        let repeat = service.summarize_or_answer(42, None).await.expect("repeat");
        assert!(!repeat.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_chain_caches_the_fallback_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let calls = Arc::new(AtomicUsize::new(0));
        let service =
            service_with_provider(dir.path(), notes_for_patient(7), calls.clone(), false);
        service.build_index().await.expect("build");

        let outcome = service.summarize_or_answer(7, None).await.expect("summary");
        assert_eq!(outcome.provider, "fallback");

        let cached = service.summarize_or_answer(7, None).await.expect("cached");
        assert!(cached.from_cache);
        assert_eq!(cached.provider, "fallback");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
