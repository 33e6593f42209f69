#![deny(missing_docs)]

//! Core library for the EMR Recall retrieval and summarization engine.
//!
//! The crate chunks free-text clinical notes, indexes their embeddings for
//! patient-scoped nearest-neighbor search, and turns retrieval hits into a
//! schema-validated summary or answer by walking an ordered chain of
//! text-generation providers, caching the last good result per patient.

/// Summary cache stores and freshness policies.
pub mod cache;
/// Word-window chunking of note text.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Generation orchestration: prompt, providers, validation, fallback.
pub mod generation;
/// Vector index with approximate and exact backends.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Retrieval and cache activity counters.
pub mod metrics;
/// Note store collaborator surface.
pub mod notes;
/// Patient-scoped retrieval engine.
pub mod retrieval;
/// Top-level service wiring retrieval, generation, and caching together.
pub mod service;
