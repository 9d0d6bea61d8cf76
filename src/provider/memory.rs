//! In-memory model provider.
//!
//! Holds one runtime binary, a set of model files and the language pairs
//! they belong to.  Useful for embedding hosts that ship models in-process
//! and for exercising the engine without touching the filesystem.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::protocol::{EngineOptions, EnginePayload, LanguagePair, SessionId};

use super::{ModelFile, ModelFileError, ModelFileProvider};

#[derive(Debug)]
pub struct MemoryModelProvider {
    runtime: Vec<u8>,
    backend: String,
    pairs: HashMap<LanguagePair, Vec<String>>,
    files: HashMap<String, ModelFile>,
    completed: Mutex<Vec<SessionId>>,
}

impl MemoryModelProvider {
    /// A provider serving `runtime` for every pair, built with the `echo`
    /// backend.
    pub fn new(runtime: impl Into<Vec<u8>>) -> Self {
        Self {
            runtime: runtime.into(),
            backend: "echo".into(),
            pairs: HashMap::new(),
            files: HashMap::new(),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Register `language_pair` with its model files.  Keys are stored as
    /// `"{pair}/{name}"`.
    pub fn with_language_pair(mut self, language_pair: LanguagePair, files: &[(&str, &[u8])]) -> Self {
        let pair_key = language_pair.key();
        let mut keys = Vec::with_capacity(files.len());
        for (name, bytes) in files {
            let key = format!("{pair_key}/{name}");
            self.files
                .insert(key.clone(), ModelFile::for_key(&key, bytes.to_vec()));
            keys.push(key);
        }
        self.pairs.insert(language_pair, keys);
        self
    }

    /// Store a standalone file that no language pair lists.
    pub fn with_file(mut self, key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        let file = ModelFile::for_key(&key, bytes.into());
        self.files.insert(key, file);
        self
    }

    /// Sessions that reported model download completion, in order.
    pub fn completed_sessions(&self) -> Vec<SessionId> {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ModelFileProvider for MemoryModelProvider {
    async fn engine_payload(
        &self,
        language_pair: &LanguagePair,
    ) -> Result<EnginePayload, ModelFileError> {
        let model_files = self
            .pairs
            .get(language_pair)
            .cloned()
            .ok_or_else(|| ModelFileError::NotFound(language_pair.key()))?;
        Ok(EnginePayload {
            runtime: self.runtime.clone(),
            options: EngineOptions {
                backend: self.backend.clone(),
                model_files,
            },
        })
    }

    async fn get_model_file(
        &self,
        key: &str,
        _session_id: SessionId,
    ) -> Result<ModelFile, ModelFileError> {
        self.files
            .get(key)
            .cloned()
            .ok_or_else(|| ModelFileError::NotFound(key.to_string()))
    }

    fn notify_model_download_complete(&self, session_id: SessionId) {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
