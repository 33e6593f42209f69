//! Note store collaborator surface.
//!
//! Record storage (patients, notes, vitals) lives outside this crate; the
//! retrieval core only needs to re-fetch the full note set when rebuilding the
//! index. The in-memory implementation backs the CLI and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A clinical note as produced by the external record store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    /// Identifier assigned by the record store.
    pub note_id: i64,
    /// Owning patient.
    pub patient_id: i64,
    /// Free-text body of the note.
    pub text: String,
    /// Date of the encounter, as an ISO-8601 string.
    #[serde(default)]
    pub note_date: String,
}

/// Errors surfaced by the note store collaborator.
#[derive(Debug, Error)]
pub enum NoteStoreError {
    /// The backing store could not be reached or refused the request.
    #[error("note store unavailable: {0}")]
    Unavailable(String),
}

/// Source of notes for index building.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Fetch every note known to the store. Must be re-fetchable in full so
    /// that an index rebuild always starts from the current note set.
    async fn fetch_notes(&self) -> Result<Vec<NoteRecord>, NoteStoreError>;
}

/// Note store holding a fixed set of records in memory.
pub struct InMemoryNoteStore {
    notes: Vec<NoteRecord>,
}

impl InMemoryNoteStore {
    /// Wrap an already-loaded set of notes.
    pub fn new(notes: Vec<NoteRecord>) -> Self {
        Self { notes }
    }
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    async fn fetch_notes(&self) -> Result<Vec<NoteRecord>, NoteStoreError> {
        Ok(self.notes.clone())
    }
}
