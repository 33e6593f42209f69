//! Patient-scoped retrieval over the shared vector index.
//!
//! Build is a batch operation: fetch every note, chunk, embed, build a fresh
//! index generation, persist it, and atomically swap it in. Queries run
//! against the immutable snapshot behind an `RwLock`, so they proceed
//! concurrently and never observe a half-built index.
//!
//! The index holds all patients together; the query path over-fetches by a
//! configurable multiplier and filters to the target patient before
//! truncating to `k`, escalating the over-fetch once when filtering
//! underflows. A patient with fewer than `k` chunks in total legitimately
//! yields fewer than `k` hits.

use crate::chunking::chunk_note_text;
use crate::config::Config;
use crate::embedding::{EmbeddingClient, EmbeddingError};
use crate::index::{IndexEntry, IndexError, NoteChunk, VectorIndex};
use crate::metrics::RecallMetrics;
use crate::notes::{NoteStore, NoteStoreError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors surfaced by retrieval operations.
///
/// An unavailable index is not among them: it degrades to an empty hit list
/// inside the engine.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Embedding collaborator failed for this request.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Index build or persistence failed.
    #[error("Index operation failed: {0}")]
    Index(#[from] IndexError),
    /// Note store could not supply the note set for a rebuild.
    #[error("Failed to fetch notes: {0}")]
    Notes(#[from] NoteStoreError),
}

/// One retrieval result: similarity score plus the matched chunk.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    /// Cosine-derived similarity; higher is more relevant.
    pub score: f32,
    /// The matched chunk and its provenance.
    pub chunk: NoteChunk,
}

/// Outcome of a completed index build.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct IndexBuildSummary {
    /// Notes fetched from the store.
    pub note_count: usize,
    /// Chunks produced and indexed.
    pub chunk_count: usize,
    /// Vector dimensionality of the generation.
    pub dimension: usize,
}

/// Orchestrates chunk → embed → index build, and query → embed → search →
/// patient-filtered top-k ranking.
pub struct RetrievalEngine {
    embedder: Box<dyn EmbeddingClient>,
    store: Arc<dyn NoteStore>,
    index: RwLock<Option<Arc<VectorIndex>>>,
    data_dir: PathBuf,
    chunk_max_words: usize,
    chunk_overlap_words: usize,
    overfetch_multiplier: usize,
    metrics: Arc<RecallMetrics>,
}

impl RetrievalEngine {
    /// Assemble an engine from configuration and collaborators.
    pub fn new(
        config: &Config,
        embedder: Box<dyn EmbeddingClient>,
        store: Arc<dyn NoteStore>,
        metrics: Arc<RecallMetrics>,
    ) -> Self {
        Self {
            embedder,
            store,
            index: RwLock::new(None),
            data_dir: config.index_data_dir.clone(),
            chunk_max_words: config.chunk_max_words,
            chunk_overlap_words: config.chunk_overlap_words,
            overfetch_multiplier: config.search_overfetch_multiplier.max(1),
            metrics,
        }
    }

    /// Rebuild the index wholesale from the note store and swap in the new
    /// generation. The prior generation keeps serving queries until the swap.
    pub async fn build_index(&self) -> Result<IndexBuildSummary, RetrievalError> {
        let notes = self.store.fetch_notes().await?;
        let note_count = notes.len();
        tracing::info!(note_count, "Building retrieval index");

        let mut chunks: Vec<NoteChunk> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        for note in &notes {
            if note.text.trim().is_empty() {
                continue;
            }
            for (chunk_index, text) in
                chunk_note_text(&note.text, self.chunk_max_words, self.chunk_overlap_words)
                    .into_iter()
                    .enumerate()
            {
                chunks.push(NoteChunk {
                    chunk_id: chunks.len() as u64,
                    note_id: note.note_id,
                    patient_id: note.patient_id,
                    note_date: note.note_date.clone(),
                    text: text.clone(),
                    chunk_index,
                });
                texts.push(text);
            }
        }

        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&texts).await?
        };
        debug_assert_eq!(chunks.len(), vectors.len());

        let entries: Vec<IndexEntry> = vectors
            .into_iter()
            .zip(chunks.into_iter())
            .map(|(vector, chunk)| IndexEntry { vector, chunk })
            .collect();

        let chunk_count = entries.len();
        let dimension = self.embedder.dimension();
        let mut built = VectorIndex::build(entries, dimension)?;
        built.save(&self.data_dir)?;
        let backend = built.backend_name();

        let mut guard = self.index.write().await;
        *guard = Some(Arc::new(built));
        drop(guard);

        self.metrics
            .record_index_build(note_count as u64, chunk_count as u64);
        tracing::info!(note_count, chunk_count, dimension, backend, "Index built");

        Ok(IndexBuildSummary {
            note_count,
            chunk_count,
            dimension,
        })
    }

    /// Retrieve the top `k` chunks for `patient_id` most similar to
    /// `query_text`, in descending score order.
    ///
    /// "No hits" is a legitimate terminal state, not a failure: an index that
    /// was never built (and cannot be loaded) yields an empty list.
    pub async fn retrieve(
        &self,
        patient_id: i64,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<RetrievalHit>, RetrievalError> {
        let Some(index) = self.snapshot_or_load().await else {
            tracing::debug!(patient_id, "No index available; returning no hits");
            return Ok(Vec::new());
        };
        if index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query_text).await?;
        self.metrics.record_query();

        let mut fetch = k.saturating_mul(self.overfetch_multiplier).max(k);
        let hits = loop {
            let candidates = index.query(&query_vector, fetch.min(index.len()))?;
            let filtered: Vec<(f32, NoteChunk)> = candidates
                .into_iter()
                .filter(|(_, chunk)| chunk.patient_id == patient_id)
                .collect();
            if filtered.len() >= k || fetch >= index.len() {
                break filtered;
            }
            // Filtering underflowed; widen the candidate pool and retry.
            fetch = fetch.saturating_mul(2);
        };

        Ok(hits
            .into_iter()
            .take(k)
            .map(|(score, chunk)| RetrievalHit { score, chunk })
            .collect())
    }

    /// Current index snapshot, lazily loading a persisted generation on the
    /// first query of the process lifetime. Load failures degrade to `None`.
    async fn snapshot_or_load(&self) -> Option<Arc<VectorIndex>> {
        if let Some(index) = self.index.read().await.clone() {
            return Some(index);
        }

        let mut guard = self.index.write().await;
        if let Some(index) = guard.clone() {
            return Some(index);
        }
        match VectorIndex::load(&self.data_dir) {
            Ok(Some(loaded)) => {
                tracing::info!(
                    chunks = loaded.len(),
                    backend = loaded.backend_name(),
                    "Loaded persisted index"
                );
                let shared = Arc::new(loaded);
                *guard = Some(shared.clone());
                Some(shared)
            }
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to load persisted index");
                None
            }
        }
    }
}
