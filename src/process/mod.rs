//! Host side of the engine: process lifetime, keep-alive and status routing.
//!
//! * [`EngineProcessManager`] — state machine plus `start_translation`,
//!   `discard_translations`, `force_shutdown` and `destroy_engine_process`.
//! * [`RequestRouter`] / [`EngineCaller`] — per-window status delivery.
//! * [`ProcessHost`] / [`KeepAliveToken`] — the shared keep-alive count.
//! * [`TelemetrySink`] — where performance reports end up.

pub mod keepalive;
pub mod manager;
pub mod router;
pub mod telemetry;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use keepalive::{KeepAliveToken, ProcessHost};
pub use manager::{EngineError, EngineProcessManager, ProcessState};
pub use router::{EngineCaller, RequestRouter};
pub use telemetry::{LogTelemetry, TelemetrySink};
