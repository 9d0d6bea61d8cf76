//! Configuration module for the translations engine.
//!
//! Provides `EngineConfig` (top-level settings), sub-configs for the process
//! manager, the worker and the model directory, `EnginePaths` for
//! cross-platform data directories, and TOML persistence via
//! `EngineConfig::load` / `EngineConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::EnginePaths;
pub use settings::{EngineConfig, ModelsConfig, ProcessConfig, WorkerConfig};
