//! Directory-backed model provider.
//!
//! Layout under the models directory:
//!
//! ```text
//! <models_dir>/
//!   translator.wasm          runtime binary shared by every language pair
//!   en-fr/                   one directory per language pair
//!     model.enfr.bin
//!     vocab.enfr.spm
//!   fr-en/
//!     …
//! ```
//!
//! The engine payload for `en-fr` lists every regular file under `en-fr/` as
//! a model file key (`"en-fr/model.enfr.bin"`, …); the pipeline later resolves
//! each key through [`DirectoryModelProvider::get_model_file`].

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::protocol::{EngineOptions, EnginePayload, LanguagePair, SessionId};

use super::{ModelFile, ModelFileError, ModelFileProvider};

#[derive(Debug, Clone)]
pub struct DirectoryModelProvider {
    root: PathBuf,
    runtime_file: String,
    backend: String,
}

impl DirectoryModelProvider {
    pub fn new(
        root: impl Into<PathBuf>,
        runtime_file: impl Into<String>,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            runtime_file: runtime_file.into(),
            backend: backend.into(),
        }
    }

    /// Provider rooted at the configured (or platform default) models
    /// directory.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.models.resolved_directory(),
            config.models.runtime_file.clone(),
            config.models.backend.clone(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root, refusing anything that could
    /// escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, ModelFileError> {
        let relative = Path::new(key);
        let confined = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !confined {
            return Err(ModelFileError::NotFound(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

async fn read(key: &str, path: &Path) -> Result<Vec<u8>, ModelFileError> {
    tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ModelFileError::NotFound(key.to_string())
        } else {
            ModelFileError::Io {
                key: key.to_string(),
                reason: e.to_string(),
            }
        }
    })
}

#[async_trait]
impl ModelFileProvider for DirectoryModelProvider {
    async fn engine_payload(
        &self,
        language_pair: &LanguagePair,
    ) -> Result<EnginePayload, ModelFileError> {
        let pair_key = language_pair.key();
        let pair_dir = self.resolve(&pair_key)?;

        let mut entries = tokio::fs::read_dir(&pair_dir)
            .await
            .map_err(|_| ModelFileError::NotFound(pair_key.clone()))?;

        let mut model_files = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|e| ModelFileError::Io {
                key: pair_key.clone(),
                reason: e.to_string(),
            })?;
            let Some(entry) = entry else { break };

            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                model_files.push(format!("{pair_key}/{name}"));
            }
        }
        model_files.sort();

        let runtime_path = self.resolve(&self.runtime_file)?;
        let runtime = read(&self.runtime_file, &runtime_path).await?;

        log::debug!(
            "provider: payload for {language_pair}: {} model files, runtime {} bytes",
            model_files.len(),
            runtime.len()
        );

        Ok(EnginePayload {
            runtime,
            options: EngineOptions {
                backend: self.backend.clone(),
                model_files,
            },
        })
    }

    async fn get_model_file(
        &self,
        key: &str,
        session_id: SessionId,
    ) -> Result<ModelFile, ModelFileError> {
        let path = self.resolve(key)?;
        log::debug!("provider: session {session_id} reading {}", path.display());
        let bytes = read(key, &path).await?;
        Ok(ModelFile::for_key(key, bytes))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
