//! The invariant output shape every provider must produce.

use serde::{Deserialize, Serialize};

/// Pointer from a generated claim back to a source note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Identifier of the note the claim is grounded in.
    pub note_id: i64,
    /// Retrieval similarity score carried through for traceability.
    pub score: f32,
}

/// Schema-validated generation result.
///
/// Provider-specific field names (`summary`, `key_points`, ...) never escape
/// the validator boundary; everything downstream sees this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationContract {
    /// One-sentence summary, within the configured word budget.
    pub one_line: String,
    /// Two to four short supporting statements.
    pub bullets: Vec<String>,
    /// Source notes backing the summary; may be empty.
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

/// A persisted summary row, at most one authoritative entry per patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSummary {
    /// Patient the summary belongs to.
    pub patient_id: i64,
    /// Provider that produced the payload (`"fallback"` for the deterministic path).
    pub source_provider: String,
    /// The validated contract.
    pub payload: GenerationContract,
    /// Unix timestamp of when the row was written.
    pub updated_at: i64,
}
