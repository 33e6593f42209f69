//! Summary and answer generation over retrieved note snippets.
//!
//! The pipeline is prompt construction, an ordered chain of LLM provider
//! adapters, and schema validation of whatever comes back. Every layer is
//! built so the caller always receives a well-formed contract: provider
//! failures cascade down the chain, and exhaustion lands on a deterministic
//! extractive fallback.

pub mod contract;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod validate;

pub use contract::{CachedSummary, GenerationContract, SourceRef};
pub use orchestrator::{FALLBACK_PROVIDER, GenerationOrchestrator, GenerationResult};
pub use prompt::BrevityLimits;
pub use validate::{ResponseValidator, SchemaError};
