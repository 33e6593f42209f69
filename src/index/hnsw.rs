//! Approximate nearest-neighbor backend built on `hora`'s HNSW index.
//!
//! The graph trades exact top-k recall for query speed and supports dumping
//! to and loading from durable storage so a process restart does not force a
//! rebuild from source notes. Final hit scores are always recomputed exactly
//! against the stored vectors, so the backend only influences which
//! candidates are considered, never how they are scored.

use super::IndexError;
use hora::core::ann_index::{ANNIndex, SerializableIndex};
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use std::path::Path;

pub(crate) struct HnswBackend {
    index: HNSWIndex<f32, usize>,
}

impl HnswBackend {
    /// Build a graph over `vectors`, labeled by position.
    pub(crate) fn build(vectors: &[Vec<f32>], dimension: usize) -> Result<Self, IndexError> {
        let mut index = HNSWIndex::<f32, usize>::new(dimension, &HNSWParams::<f32>::default());
        for (position, vector) in vectors.iter().enumerate() {
            index
                .add(vector, position)
                .map_err(|message| IndexError::Ann(message.to_string()))?;
        }
        index
            .build(Metric::CosineSimilarity)
            .map_err(|message| IndexError::Ann(message.to_string()))?;
        Ok(Self { index })
    }

    /// Return up to `k` candidate positions for `query`, closest first.
    pub(crate) fn search(&self, query: &[f32], k: usize) -> Vec<usize> {
        self.index.search(query, k)
    }

    /// Persist the graph to `path`.
    pub(crate) fn dump(&mut self, path: &Path) -> Result<(), IndexError> {
        let path = path.to_string_lossy();
        self.index
            .dump(path.as_ref())
            .map_err(|message| IndexError::Ann(message.to_string()))
    }

    /// Load a previously dumped graph from `path`.
    pub(crate) fn load(path: &Path) -> Result<Self, IndexError> {
        let path = path.to_string_lossy();
        let index = HNSWIndex::<f32, usize>::load(path.as_ref())
            .map_err(|message| IndexError::Ann(message.to_string()))?;
        Ok(Self { index })
    }
}
