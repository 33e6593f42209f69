//! Per-patient summary cache with explicit invalidation.
//!
//! The cache stores at most one authoritative summary per patient. Each store
//! backend replaces a patient's row as one guarded delete-then-insert unit,
//! so readers never observe zero or two rows mid-update. Freshness is
//! policy-driven: entries either live until a note mutation invalidates them,
//! or additionally expire after a configured age.
//!
//! Cache I/O is advisory. Store failures are logged and reported to the
//! caller as misses or no-ops, never as request failures.

use crate::generation::CachedSummary;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Failures raised by a cache store backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backing file could not be read or written.
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file held rows that no longer decode.
    #[error("cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Storage backend for summary rows, keyed by patient.
#[async_trait]
pub trait SummaryCacheStore: Send + Sync {
    /// Fetch the row for a patient, if any.
    async fn get(&self, patient_id: i64) -> Result<Option<CachedSummary>, CacheError>;

    /// Insert a row, replacing any existing row for the same patient.
    async fn put(&self, entry: CachedSummary) -> Result<(), CacheError>;

    /// Remove the row for a patient. Removing a missing row is not an error.
    async fn delete(&self, patient_id: i64) -> Result<(), CacheError>;
}

/// Volatile store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<i64, CachedSummary>>,
}

impl InMemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SummaryCacheStore for InMemoryCacheStore {
    async fn get(&self, patient_id: i64) -> Result<Option<CachedSummary>, CacheError> {
        Ok(self.entries.read().await.get(&patient_id).cloned())
    }

    async fn put(&self, entry: CachedSummary) -> Result<(), CacheError> {
        self.entries.write().await.insert(entry.patient_id, entry);
        Ok(())
    }

    async fn delete(&self, patient_id: i64) -> Result<(), CacheError> {
        self.entries.write().await.remove(&patient_id);
        Ok(())
    }
}

/// JSON-file-backed store surviving process restarts.
///
/// The whole table is small (one row per patient), so each mutation rewrites
/// the file via a temp-file rename. A mutex serializes read-modify-write
/// cycles within the process.
pub struct FileCacheStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCacheStore {
    /// Open a store at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_rows(&self) -> Result<Vec<CachedSummary>, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(error.into()),
        }
    }

    async fn write_rows(&self, rows: &[CachedSummary]) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(rows)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SummaryCacheStore for FileCacheStore {
    async fn get(&self, patient_id: i64) -> Result<Option<CachedSummary>, CacheError> {
        let rows = self.read_rows().await?;
        Ok(rows.into_iter().find(|row| row.patient_id == patient_id))
    }

    async fn put(&self, entry: CachedSummary) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.read_rows().await?;
        rows.retain(|row| row.patient_id != entry.patient_id);
        rows.push(entry);
        self.write_rows(&rows).await
    }

    async fn delete(&self, patient_id: i64) -> Result<(), CacheError> {
        let _guard = self.write_lock.lock().await;
        let mut rows = self.read_rows().await?;
        rows.retain(|row| row.patient_id != patient_id);
        self.write_rows(&rows).await
    }
}

/// When a cached row is still considered servable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessPolicy {
    /// Rows live until a note mutation invalidates them.
    UntilInvalidated,
    /// Rows additionally expire once older than the given age.
    MaxAge(Duration),
}

/// Policy-applying wrapper over a [`SummaryCacheStore`].
pub struct SummaryCache {
    store: Arc<dyn SummaryCacheStore>,
    policy: FreshnessPolicy,
}

impl SummaryCache {
    /// Wrap a store with a freshness policy.
    pub fn new(store: Arc<dyn SummaryCacheStore>, policy: FreshnessPolicy) -> Self {
        Self { store, policy }
    }

    /// Look up a fresh summary for a patient.
    ///
    /// Store failures and stale rows both surface as `None`.
    pub async fn get(&self, patient_id: i64) -> Option<CachedSummary> {
        let entry = match self.store.get(patient_id).await {
            Ok(entry) => entry?,
            Err(error) => {
                tracing::warn!(patient_id, error = %error, "Cache read failed; treating as miss");
                return None;
            }
        };
        if let FreshnessPolicy::MaxAge(max_age) = self.policy {
            let age = unix_now().saturating_sub(entry.updated_at);
            if age > max_age.as_secs() as i64 {
                tracing::debug!(patient_id, age_seconds = age, "Cached summary expired");
                return None;
            }
        }
        Some(entry)
    }

    /// Store a summary for a patient, replacing any prior row.
    ///
    /// Replacement is a single store operation: the store's `put` removes the
    /// prior row and inserts the new one under one lock, so a concurrent
    /// reader only ever observes the old row or the new row, never neither.
    pub async fn put(&self, mut entry: CachedSummary) {
        entry.updated_at = unix_now();
        let patient_id = entry.patient_id;
        if let Err(error) = self.store.put(entry).await {
            tracing::warn!(patient_id, error = %error, "Cache insert failed");
        }
    }

    /// Drop the cached summary for a patient, if any.
    ///
    /// Called whenever a note for the patient is created, updated or deleted.
    pub async fn invalidate(&self, patient_id: i64) {
        if let Err(error) = self.store.delete(patient_id).await {
            tracing::warn!(patient_id, error = %error, "Cache invalidation failed");
        } else {
            tracing::debug!(patient_id, "Cached summary invalidated");
        }
    }
}

/// Select a store backend: file-backed when a path is configured, otherwise
/// in-memory.
pub fn store_from_path(path: Option<&Path>) -> Arc<dyn SummaryCacheStore> {
    match path {
        Some(path) => Arc::new(FileCacheStore::new(path)),
        None => Arc::new(InMemoryCacheStore::new()),
    }
}

fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
