//! Translations engine: process orchestration for on-device translation.
//!
//! # Layout
//!
//! ```text
//! process   EngineProcessManager ── RequestRouter, ProcessHost keep-alive, telemetry
//!    │  ManagerMessage ▼            ▲ WorkerMessage
//! worker    InferenceProcess ── one EngineWorker per session (SessionModelCache)
//!    │                               │
//! pipeline  BackendRegistry → InferencePipeline (echo backend built in)
//! provider  ModelFileProvider (directory / memory)
//! port      CallerPort ⇄ EnginePort (move-only, one per session)
//! protocol  shared types, typed messages, JSON wire calls
//! config    EngineConfig (TOML) + EnginePaths
//! ```
//!
//! # Startup
//!
//! 1. Initialise logging with [`init_logging`].
//! 2. Load [`config::EngineConfig`] (defaults on first run).
//! 3. Build a [`provider::ModelFileProvider`].
//! 4. [`process::EngineProcessManager::launch`] inside a tokio runtime.
//! 5. For each tab: [`port::channel`], then `start_translation` with the
//!    engine end, and drive requests through the caller end.

pub mod config;
pub mod pipeline;
pub mod port;
pub mod process;
pub mod protocol;
pub mod provider;
pub mod worker;

pub use config::EngineConfig;
pub use port::{CallerPort, EnginePort};
pub use process::{EngineError, EngineProcessManager, ProcessHost, ProcessState};
pub use protocol::{EngineStatus, InnerWindowId, LanguagePair, RequestId};

/// Install the `env_logger` backend, defaulting to `info` unless `RUST_LOG`
/// says otherwise.  Calling it more than once is harmless.
pub fn init_logging() {
    if env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()
        .is_err()
    {
        log::debug!("logger already initialised");
    }
}
