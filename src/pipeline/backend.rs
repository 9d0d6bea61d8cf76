//! Backend selection: named [`PipelineBackend`]s that know how to turn an
//! engine payload into an [`InferencePipeline`].
//!
//! Backends resolve model files through a [`ModelCache`], which the worker
//! implements on top of the host's model provider.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::EngineOptions;

use super::echo::EchoBackend;
use super::engine::{InferencePipeline, PipelineError};

// ---------------------------------------------------------------------------
// ModelCache
// ---------------------------------------------------------------------------

/// A resolved model file, tagged with its MIME type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CachedResponse {
    pub mime_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("`{0}` is not implemented by this cache")]
    NotImplemented(&'static str),
}

/// Cache-style model file lookup used by backends while building a pipeline.
///
/// `match_key` never fails: `None` is a cache miss and tells the backend to
/// take its fallback path.
#[async_trait]
pub trait ModelCache: Send + Sync {
    async fn match_key(&self, key: &str) -> Option<CachedResponse>;

    async fn put(&self, key: &str, response: CachedResponse) -> Result<(), CacheError>;
}

// ---------------------------------------------------------------------------
// PipelineBackend
// ---------------------------------------------------------------------------

/// Builds pipelines for one backend kind.
#[async_trait]
pub trait PipelineBackend: Send + Sync {
    /// Name the backend is registered under.
    fn name(&self) -> &str;

    async fn build(
        &self,
        runtime: &[u8],
        options: &EngineOptions,
        cache: Arc<dyn ModelCache>,
    ) -> Result<Box<dyn InferencePipeline>, PipelineError>;
}

// ---------------------------------------------------------------------------
// BackendRegistry
// ---------------------------------------------------------------------------

/// Name → backend map consulted by the backend-selection step.
///
/// [`BackendRegistry::default`] contains the built-in `echo` backend.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn PipelineBackend>>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

impl BackendRegistry {
    /// A registry with no backends at all.
    pub fn empty() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Register `backend`, replacing any backend with the same name.
    pub fn register(&mut self, backend: Arc<dyn PipelineBackend>) -> &mut Self {
        self.backends.insert(backend.name().to_string(), backend);
        self
    }

    pub fn with(mut self, backend: Arc<dyn PipelineBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn select(&self, name: &str) -> Result<Arc<dyn PipelineBackend>, PipelineError> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnsupportedBackend(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::empty().with(Arc::new(EchoBackend))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
