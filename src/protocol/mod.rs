//! Engine protocol: shared value types, the typed manager ↔ worker messages
//! and the JSON wire boundary.
//!
//! # Message flow
//!
//! ```text
//!  caller ──start_translation(pair, port)──▶ EngineProcessManager
//!                                                │ ManagerMessage::StartTranslation
//!                                                ▼
//!                                          InferenceProcess (worker loop)
//!                                                │ WorkerMessage::RequestEnginePayload
//!                                                ▼
//!                                          ModelFileProvider (via manager)
//!
//!  caller ◀──────── PortEvent::{Progress, Response} ──────── EngineWorker
//! ```

pub mod messages;
pub mod types;
pub mod wire;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use messages::{ManagerMessage, WorkerMessage};
pub use types::{
    EngineOptions, EnginePayload, EngineStatus, Generation, InferenceRequest, InferenceResponse,
    InnerWindowId, LanguagePair, PerformanceReport, ProgressEvent, RequestId, RunOptions,
    SessionId,
};
pub use wire::{ProtocolError, WireCall, WorkerCall};
