//! Engine worker side: the isolated inference process and its sessions.
//!
//! * [`InferenceProcess`] — message loop hosting every session of the process.
//! * [`EngineWorker`] — one session's pipeline (`initialize_engine`, `match_key`,
//!   `put`, `run`, wire `dispatch`).
//! * [`SessionModelCache`] — read-only model cache handed to pipeline backends.
//! * [`WorkerHost`] — worker → host RPC handle.
//! * [`EngineStats`] — per-session performance counters.

pub mod cache;
pub mod engine;
pub mod host;
pub mod process;
pub mod stats;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use cache::SessionModelCache;
#[cfg(any(test, feature = "test-hooks"))]
pub use engine::INTENTIONAL_ERROR_REQUEST;
pub use engine::{EngineWorker, WorkerError};
pub use host::WorkerHost;
pub use process::InferenceProcess;
pub use stats::{count_words, EngineStats};
