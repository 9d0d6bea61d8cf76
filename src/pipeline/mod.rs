//! Inference pipeline contract and backend selection.
//!
//! # Architecture
//!
//! ```text
//! EnginePayload { runtime, options }
//!        │
//!        ▼
//! BackendRegistry::select(options.backend)
//!        │
//!        ▼
//! PipelineBackend::build(runtime, options, cache)   ── ModelCache::match_key(file)…
//!        │
//!        ▼
//! Box<dyn InferencePipeline>
//!        │
//!        ▼
//! run(request, Option<&ProgressCallback>) → InferenceResponse
//! ```
//!
//! The built-in [`EchoBackend`] implements the contract with an identity
//! forward pass and is the default backend in [`BackendRegistry::default`].

pub mod backend;
pub mod echo;
pub mod engine;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use backend::{BackendRegistry, CacheError, CachedResponse, ModelCache, PipelineBackend};
pub use echo::{EchoBackend, EchoPipeline, WASM_MAGIC};
pub use engine::{InferencePipeline, PipelineError, ProgressCallback};
