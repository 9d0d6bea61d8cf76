//! Core inference pipeline trait.
//!
//! [`InferencePipeline`] is the only surface the engine worker needs from a
//! loaded model: turn a request into a response, optionally reporting
//! progress along the way.  The tensor math behind it is opaque.
//!
//! The trait is object-safe and `Send + Sync` so a pipeline can be held behind
//! a `Box<dyn InferencePipeline>` inside a session task.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::{InferenceRequest, InferenceResponse};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Errors raised while building or running a pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The runtime binary in the engine payload is not usable.
    #[error("invalid runtime binary: {0}")]
    InvalidRuntime(String),

    /// No backend is registered under the requested name.
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// A model file the backend needs could not be resolved.
    #[error("model file unavailable: {0}")]
    MissingModelFile(String),

    /// The request payload does not have the shape the pipeline expects.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The forward pass failed.
    #[error("inference failed: {0}")]
    Inference(String),
}

// ---------------------------------------------------------------------------
// InferencePipeline
// ---------------------------------------------------------------------------

/// Receives intermediate progress payloads during a run.
pub type ProgressCallback = Box<dyn Fn(Value) + Send + Sync>;

/// One loaded model plus its backend.
///
/// # Contract
///
/// - `progress` is `None` when the caller did not ask for progress; a
///   pipeline must not fabricate a callback of its own in that case.
/// - Exactly one `Ok` or `Err` is returned per call.
#[async_trait]
pub trait InferencePipeline: Send + Sync {
    async fn run(
        &self,
        request: &InferenceRequest,
        progress: Option<&ProgressCallback>,
    ) -> Result<InferenceResponse, PipelineError>;
}

// Compile-time assertion: Box<dyn InferencePipeline> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn InferencePipeline>) {}
};
