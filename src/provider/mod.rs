//! Model file provider: the external collaborator that supplies engine
//! payloads and model bytes.
//!
//! * [`ModelFileProvider`] — async trait the process manager calls on behalf
//!   of the worker.
//! * [`DirectoryModelProvider`] — serves files from the models directory.
//! * [`MemoryModelProvider`] — serves files held in memory.
//!
//! # Contract
//!
//! - `get_model_file` is idempotent for a given key.
//! - A key that cannot be resolved fails fast with
//!   [`ModelFileError::NotFound`]; providers never wait on a remote fetch.

pub mod directory;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{EnginePayload, LanguagePair, SessionId};

pub use directory::DirectoryModelProvider;
pub use memory::MemoryModelProvider;

// ---------------------------------------------------------------------------
// ModelFile
// ---------------------------------------------------------------------------

/// Raw model bytes plus the MIME type they should be served with.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFile {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ModelFile {
    /// Wrap `bytes`, guessing the MIME type from `key`'s extension.
    pub fn for_key(key: &str, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type_for(key).to_string(),
            bytes,
        }
    }
}

/// MIME type for a model file key, based on its extension.
///
/// ```
/// use translations_engine::provider::mime_type_for;
///
/// assert_eq!(mime_type_for("config.json"), "application/json");
/// assert_eq!(mime_type_for("translator.wasm"), "application/wasm");
/// assert_eq!(mime_type_for("model.enfr.intgemm8.bin"), "application/octet-stream");
/// ```
pub fn mime_type_for(key: &str) -> &'static str {
    let extension = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "json" => "application/json",
        "wasm" => "application/wasm",
        "txt" | "vocab" => "text/plain",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// ModelFileError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ModelFileError {
    /// Nothing is stored under the key (or language pair).
    #[error("model file not found: {0}")]
    NotFound(String),

    /// The file exists but could not be read.
    #[error("failed to read model file {key}: {reason}")]
    Io { key: String, reason: String },

    /// The host that would answer the lookup is gone.
    #[error("model provider is unavailable")]
    Unavailable,
}

// ---------------------------------------------------------------------------
// ModelFileProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ModelFileProvider: Send + Sync {
    /// Runtime binary and build options for `language_pair`.
    async fn engine_payload(
        &self,
        language_pair: &LanguagePair,
    ) -> Result<EnginePayload, ModelFileError>;

    /// Bytes of one model file, requested by the pipeline of `session_id`.
    async fn get_model_file(
        &self,
        key: &str,
        session_id: SessionId,
    ) -> Result<ModelFile, ModelFileError>;

    /// Model resolution for `session_id` has finished, successfully or not.
    fn notify_model_download_complete(&self, session_id: SessionId) {
        log::debug!("provider: model download complete for session {session_id}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
