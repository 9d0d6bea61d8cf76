//! Engine settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Missing fields in a settings file fall back to their defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::EnginePaths;

// ---------------------------------------------------------------------------
// ProcessConfig
// ---------------------------------------------------------------------------

/// Settings for the engine process manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// How long `force_shutdown` waits for the worker's acknowledgement
    /// before giving up and reporting a timeout.
    pub shutdown_timeout_ms: u64,
}

impl ProcessConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerConfig
// ---------------------------------------------------------------------------

/// Settings for the engine worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Model file keys starting with this prefix are never served locally;
    /// the cache answers them with a miss without asking the host.
    pub no_local_prefix: String,
    /// Ask the host to destroy the engine process once the last session has
    /// been discarded.
    pub destroy_when_idle: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            no_local_prefix: "NO_LOCAL".into(),
            destroy_when_idle: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelsConfig
// ---------------------------------------------------------------------------

/// Where the directory-backed provider finds its files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Models directory.  `None` means the platform data directory
    /// (see [`EnginePaths::models_dir`]).
    pub directory: Option<PathBuf>,
    /// File name of the runtime binary inside the models directory.
    pub runtime_file: String,
    /// Pipeline backend named in every engine payload.
    pub backend: String,
}

impl ModelsConfig {
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| EnginePaths::platform().models_dir())
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            runtime_file: "translator.wasm".into(),
            backend: "echo".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level engine configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use translations_engine::config::EngineConfig;
///
/// // Load (returns Default when file is missing)
/// let config = EngineConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub process: ProcessConfig,
    pub worker: WorkerConfig,
    pub models: ModelsConfig,
}

impl EngineConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(EngineConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&EnginePaths::platform().settings_file())
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&EnginePaths::platform().settings_file())
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = EngineConfig::load_from(&path).expect("should not error");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn default_values() {
        let cfg = EngineConfig::default();

        assert_eq!(cfg.process.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.worker.no_local_prefix, "NO_LOCAL");
        assert!(!cfg.worker.destroy_when_idle);
        assert!(cfg.models.directory.is_none());
        assert_eq!(cfg.models.runtime_file, "translator.wasm");
        assert_eq!(cfg.models.backend, "echo");
    }

    /// Verify that modified non-default values survive a save / load cycle.
    #[test]
    fn modified_values_survive_save_and_load() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("settings.toml");

        let mut cfg = EngineConfig::default();
        cfg.process.shutdown_timeout_ms = 250;
        cfg.worker.no_local_prefix = "REMOTE:".into();
        cfg.worker.destroy_when_idle = true;
        cfg.models.directory = Some(dir.path().join("models"));
        cfg.models.backend = "custom".into();

        cfg.save_to(&path).expect("save");
        let loaded = EngineConfig::load_from(&path).expect("load");

        assert_eq!(loaded, cfg);
    }

    /// A partial file only overrides the keys it names.
    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[worker]\ndestroy_when_idle = true\n").unwrap();

        let loaded = EngineConfig::load_from(&path).expect("load");
        assert!(loaded.worker.destroy_when_idle);
        assert_eq!(loaded.worker.no_local_prefix, "NO_LOCAL");
        assert_eq!(loaded.process, ProcessConfig::default());
    }

    #[test]
    fn explicit_directory_wins() {
        let models = ModelsConfig {
            directory: Some(PathBuf::from("/opt/models")),
            ..ModelsConfig::default()
        };
        assert_eq!(models.resolved_directory(), PathBuf::from("/opt/models"));
    }

    #[test]
    fn unset_directory_uses_platform_models_dir() {
        assert_eq!(
            ModelsConfig::default().resolved_directory(),
            EnginePaths::platform().models_dir()
        );
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "process = 3").unwrap();
        assert!(EngineConfig::load_from(&path).is_err());
    }
}
