//! Typed messages exchanged between the process manager and the engine
//! worker.
//!
//! Queries carry a `oneshot` reply sender; fire-and-forget messages do not.
//! Both enums are matched exhaustively on the receiving side, so an unknown
//! message kind cannot reach a handler.

use tokio::sync::oneshot;

use crate::port::EnginePort;
use crate::provider::{ModelFile, ModelFileError};

use super::types::{
    EnginePayload, EngineStatus, Generation, InnerWindowId, LanguagePair, PerformanceReport, SessionId,
};

// ---------------------------------------------------------------------------
// Manager → worker
// ---------------------------------------------------------------------------

/// Messages the process manager sends into the worker's message loop.
#[derive(Debug)]
pub enum ManagerMessage {
    /// Create a session for `inner_window_id`.  Ownership of `port` moves to
    /// the worker.
    StartTranslation {
        language_pair: LanguagePair,
        inner_window_id: InnerWindowId,
        generation: Generation,
        port: EnginePort,
    },

    /// Abandon the session owned by `inner_window_id`, including queued and
    /// in-flight run requests.
    DiscardTranslations { inner_window_id: InnerWindowId },

    /// Discard every session and stop the message loop.  `ack` is resolved
    /// once the loop has torn everything down.
    ForceShutdown { ack: oneshot::Sender<()> },
}

// ---------------------------------------------------------------------------
// Worker → manager
// ---------------------------------------------------------------------------

/// Messages (queries and notifications) the worker sends to its host.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Ask the model provider for the payload of `language_pair`.
    RequestEnginePayload {
        language_pair: LanguagePair,
        reply: oneshot::Sender<Result<EnginePayload, ModelFileError>>,
    },

    /// Resolve one model file for the pipeline of `session_id`.
    GetModelFile {
        key: String,
        session_id: SessionId,
        reply: oneshot::Sender<Result<ModelFile, ModelFileError>>,
    },

    /// Model resolution for `session_id` has finished (successfully or not).
    NotifyModelDownloadComplete { session_id: SessionId },

    /// Session counters, sent when a session ends.
    ReportEnginePerformance(PerformanceReport),

    /// Initialisation outcome for the session `generation` of
    /// `inner_window_id`.
    ReportEngineStatus {
        inner_window_id: InnerWindowId,
        generation: Generation,
        status: EngineStatus,
    },

    /// The worker hosts no more sessions; the host may release its
    /// keep-alive.  `last_started` is the newest session the worker had
    /// seen when it went idle, so the host can tell whether a start raced
    /// with the signal.
    DestroyEngineProcess { last_started: Option<Generation> },
}
