use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing retrieval and generation activity.
#[derive(Default)]
pub struct RecallMetrics {
    notes_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    queries_served: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    provider_failures: AtomicU64,
    fallback_summaries: AtomicU64,
}

impl RecallMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed index build.
    pub fn record_index_build(&self, note_count: u64, chunk_count: u64) {
        self.notes_indexed.store(note_count, Ordering::Relaxed);
        self.chunks_indexed.store(chunk_count, Ordering::Relaxed);
    }

    /// Record a served retrieval query.
    pub fn record_query(&self) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a summary served from cache.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss that forced generation.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one failed provider attempt.
    pub fn record_provider_failure(&self) {
        self.provider_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request answered by the deterministic fallback.
    pub fn record_fallback(&self) {
        self.fallback_summaries.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            notes_indexed: self.notes_indexed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            queries_served: self.queries_served.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            provider_failures: self.provider_failures.load(Ordering::Relaxed),
            fallback_summaries: self.fallback_summaries.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of activity counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Notes consumed by the most recent index build.
    pub notes_indexed: u64,
    /// Chunks produced by the most recent index build.
    pub chunks_indexed: u64,
    /// Retrieval queries served since startup.
    pub queries_served: u64,
    /// Summaries served from cache.
    pub cache_hits: u64,
    /// Summary requests that missed the cache.
    pub cache_misses: u64,
    /// Failed provider attempts across all requests.
    pub provider_failures: u64,
    /// Requests answered by the deterministic fallback.
    pub fallback_summaries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = RecallMetrics::new();
        metrics.record_index_build(3, 12);
        metrics.record_query();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_provider_failure();
        metrics.record_provider_failure();
        metrics.record_fallback();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.notes_indexed, 3);
        assert_eq!(snapshot.chunks_indexed, 12);
        assert_eq!(snapshot.queries_served, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.provider_failures, 2);
        assert_eq!(snapshot.fallback_summaries, 1);
    }

    #[test]
    fn index_build_counters_reflect_latest_build() {
        let metrics = RecallMetrics::new();
        metrics.record_index_build(3, 12);
        metrics.record_index_build(5, 20);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.notes_indexed, 5);
        assert_eq!(snapshot.chunks_indexed, 20);
    }
}
