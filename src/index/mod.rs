//! Vector index over note chunks.
//!
//! A built index generation is immutable: rebuilds replace the whole thing
//! and queries run against a snapshot. Two interchangeable backends sit under
//! the same surface: the HNSW graph (feature `hnsw`, default) and an exact
//! brute-force scan used when the graph is unavailable, fails to build, or
//! fails to load from disk.
//!
//! Persistence layout under the data directory:
//! - `index_meta.json`: dimension, chunk metadata, raw vectors
//! - `index_hnsw.bin`: the dumped ANN graph (feature `hnsw` only)
//!
//! Scores are exact cosine similarities regardless of backend; the ANN graph
//! only narrows the candidate set.

mod exact;
#[cfg(feature = "hnsw")]
mod hnsw;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub(crate) use exact::cosine_similarity;

const META_FILE: &str = "index_meta.json";
#[cfg(feature = "hnsw")]
const HNSW_FILE: &str = "index_hnsw.bin";

/// Errors raised while building, persisting, or querying the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// A vector's dimensionality did not match the index generation.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality fixed at build time.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },
    /// Reading or writing index files failed.
    #[error("index I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Index metadata could not be encoded or decoded.
    #[error("index metadata corrupt: {0}")]
    Serde(#[from] serde_json::Error),
    /// The approximate backend reported a failure.
    #[error("ANN backend failure: {0}")]
    Ann(String),
}

/// A bounded-length segment of one note, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteChunk {
    /// Ordinal of this chunk within the index generation.
    pub chunk_id: u64,
    /// Source note identifier.
    pub note_id: i64,
    /// Owning patient.
    pub patient_id: i64,
    /// Encounter date carried over from the source note.
    pub note_date: String,
    /// Chunk text; never empty.
    pub text: String,
    /// Zero-based ordinal within the source note, kept for traceability.
    pub chunk_index: usize,
}

/// One vector plus its chunk metadata, as fed into a build.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// Embedding of the chunk text.
    pub vector: Vec<f32>,
    /// Chunk metadata.
    pub chunk: NoteChunk,
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    dimension: usize,
    chunks: Vec<NoteChunk>,
    vectors: Vec<Vec<f32>>,
}

enum Backend {
    Exact,
    #[cfg(feature = "hnsw")]
    Hnsw(hnsw::HnswBackend),
}

/// An immutable index generation over chunk vectors.
pub struct VectorIndex {
    dimension: usize,
    chunks: Vec<NoteChunk>,
    vectors: Vec<Vec<f32>>,
    backend: Backend,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimension", &self.dimension)
            .field("chunks", &self.chunks)
            .field("vectors", &self.vectors)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Build a new generation from `entries`, replacing nothing until the
    /// caller swaps it in. An empty entry set yields a legal empty index
    /// whose queries return no hits.
    pub fn build(entries: Vec<IndexEntry>, dimension: usize) -> Result<Self, IndexError> {
        let mut chunks = Vec::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.vector.len(),
                });
            }
            chunks.push(entry.chunk);
            vectors.push(entry.vector);
        }

        let backend = Self::select_backend(&vectors, dimension);
        Ok(Self {
            dimension,
            chunks,
            vectors,
            backend,
        })
    }

    #[cfg(feature = "hnsw")]
    fn select_backend(vectors: &[Vec<f32>], dimension: usize) -> Backend {
        if vectors.is_empty() {
            return Backend::Exact;
        }
        match hnsw::HnswBackend::build(vectors, dimension) {
            Ok(backend) => Backend::Hnsw(backend),
            Err(error) => {
                tracing::warn!(error = %error, "HNSW build failed; using exact backend");
                Backend::Exact
            }
        }
    }

    #[cfg(not(feature = "hnsw"))]
    fn select_backend(_vectors: &[Vec<f32>], _dimension: usize) -> Backend {
        Backend::Exact
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the generation holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Dimensionality fixed for this generation.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Name of the active search backend, for logs and build summaries.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Exact => "exact",
            #[cfg(feature = "hnsw")]
            Backend::Hnsw(_) => "hnsw",
        }
    }

    /// Return at most `k` chunks ordered by descending cosine similarity to
    /// `query`. Results span all patients; callers scope afterwards.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<(f32, NoteChunk)>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let ranked = match &self.backend {
            Backend::Exact => exact::rank_all(&self.vectors, query, k),
            #[cfg(feature = "hnsw")]
            Backend::Hnsw(backend) => {
                let candidates = backend.search(query, k.min(self.chunks.len()));
                let mut scored: Vec<(usize, f32)> = candidates
                    .into_iter()
                    .filter(|position| *position < self.vectors.len())
                    .map(|position| {
                        (
                            position,
                            cosine_similarity(&self.vectors[position], query),
                        )
                    })
                    .collect();
                scored.sort_by(|a, b| {
                    b.1.partial_cmp(&a.1)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.0.cmp(&b.0))
                });
                scored.truncate(k);
                scored
            }
        };

        Ok(ranked
            .into_iter()
            .map(|(position, score)| (score, self.chunks[position].clone()))
            .collect())
    }

    /// Persist this generation under `dir`, replacing any prior files.
    pub fn save(&mut self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir)?;
        let persisted = PersistedIndex {
            dimension: self.dimension,
            chunks: self.chunks.clone(),
            vectors: self.vectors.clone(),
        };
        let encoded = serde_json::to_vec(&persisted)?;
        let tmp = dir.join(format!("{META_FILE}.tmp"));
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, dir.join(META_FILE))?;

        #[cfg(feature = "hnsw")]
        if let Backend::Hnsw(backend) = &mut self.backend {
            backend.dump(&dir.join(HNSW_FILE))?;
        }

        Ok(())
    }

    /// Load a persisted generation from `dir`. Returns `Ok(None)` when no
    /// index has ever been saved there. A damaged or missing ANN graph is not
    /// fatal: the exact backend takes over for the loaded vectors.
    pub fn load(dir: &Path) -> Result<Option<Self>, IndexError> {
        let meta_path = dir.join(META_FILE);
        if !meta_path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&meta_path)?;
        let persisted: PersistedIndex = serde_json::from_slice(&raw)?;

        let backend = Self::load_backend(dir, persisted.vectors.len());
        Ok(Some(Self {
            dimension: persisted.dimension,
            chunks: persisted.chunks,
            vectors: persisted.vectors,
            backend,
        }))
    }

    #[cfg(feature = "hnsw")]
    fn load_backend(dir: &Path, entry_count: usize) -> Backend {
        if entry_count == 0 {
            return Backend::Exact;
        }
        let graph_path = dir.join(HNSW_FILE);
        if !graph_path.exists() {
            tracing::debug!("No ANN graph on disk; using exact backend");
            return Backend::Exact;
        }
        match hnsw::HnswBackend::load(&graph_path) {
            Ok(backend) => Backend::Hnsw(backend),
            Err(error) => {
                tracing::warn!(error = %error, "Failed to load ANN graph; using exact backend");
                Backend::Exact
            }
        }
    }

    #[cfg(not(feature = "hnsw"))]
    fn load_backend(_dir: &Path, _entry_count: usize) -> Backend {
        Backend::Exact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(chunk_id: u64, patient_id: i64) -> NoteChunk {
        NoteChunk {
            chunk_id,
            note_id: chunk_id as i64 + 100,
            patient_id,
            note_date: "2024-03-01".to_string(),
            text: format!("chunk {chunk_id}"),
            chunk_index: 0,
        }
    }

    fn entries() -> Vec<IndexEntry> {
        vec![
            IndexEntry {
                vector: vec![1.0, 0.0],
                chunk: chunk(0, 1),
            },
            IndexEntry {
                vector: vec![0.0, 1.0],
                chunk: chunk(1, 2),
            },
            IndexEntry {
                vector: vec![0.9, 0.1],
                chunk: chunk(2, 1),
            },
        ]
    }

    #[test]
    fn empty_build_queries_to_no_hits() {
        let index = VectorIndex::build(Vec::new(), 2).expect("build");
        assert!(index.is_empty());
        assert!(index.query(&[1.0, 0.0], 5).expect("query").is_empty());
    }

    #[test]
    fn build_rejects_mismatched_vectors() {
        let bad = vec![IndexEntry {
            vector: vec![1.0, 0.0, 0.0],
            chunk: chunk(0, 1),
        }];
        let error = VectorIndex::build(bad, 2).expect_err("mismatch");
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn query_orders_by_descending_similarity() {
        let index = VectorIndex::build(entries(), 2).expect("build");
        let hits = index.query(&[1.0, 0.0], 3).expect("query");
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].1.chunk_id, 0);
        assert_eq!(hits[1].1.chunk_id, 2);
        assert!(hits[0].0 >= hits[1].0 && hits[1].0 >= hits[2].0);
    }

    #[test]
    fn query_rejects_wrong_dimension() {
        let index = VectorIndex::build(entries(), 2).expect("build");
        assert!(index.query(&[1.0, 0.0, 0.0], 3).is_err());
    }

    #[test]
    fn rebuild_from_identical_input_is_deterministic() {
        let first = VectorIndex::build(entries(), 2).expect("build");
        let second = VectorIndex::build(entries(), 2).expect("build");
        let query = [0.7, 0.3];
        let a = first.query(&query, 3).expect("query");
        let b = second.query(&query, 3).expect("query");
        let ids_a: Vec<u64> = a.iter().map(|(_, c)| c.chunk_id).collect();
        let ids_b: Vec<u64> = b.iter().map(|(_, c)| c.chunk_id).collect();
        assert_eq!(ids_a, ids_b);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.0.to_bits(), y.0.to_bits());
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut index = VectorIndex::build(entries(), 2).expect("build");
        index.save(dir.path()).expect("save");

        let restored = VectorIndex::load(dir.path())
            .expect("load")
            .expect("index present");
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.dimension(), 2);

        let hits = restored.query(&[1.0, 0.0], 1).expect("query");
        assert_eq!(hits[0].1.chunk_id, 0);
    }

    #[test]
    fn load_missing_directory_yields_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(
            VectorIndex::load(&dir.path().join("nothing"))
                .expect("load")
                .is_none()
        );
    }
}
