//! Duplex, single-owner communication port between a caller and its engine
//! session.
//!
//! [`channel`] returns two ends.  The caller keeps the [`CallerPort`] and
//! moves the [`EnginePort`] into
//! [`EngineProcessManager::start_translation`](crate::process::EngineProcessManager::start_translation).
//! Neither end implements `Clone`, so once the engine end is handed over the
//! caller has no way to use it again.
//!
//! Messages on one port are delivered in the order they were sent.
//!
//! # Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use translations_engine::port;
//! use translations_engine::protocol::{InferenceRequest, RequestId, RunOptions};
//!
//! # async fn example() -> Result<(), translations_engine::port::PortError> {
//! let (mut caller, engine_end) = port::channel();
//! // manager.start_translation(pair, window_id, engine_end, None)?;
//! # drop(engine_end);
//! let outcome = caller
//!     .request(
//!         RequestId(1),
//!         InferenceRequest(json!({"args": ["hello"]})),
//!         RunOptions::default(),
//!     )
//!     .await?;
//! println!("{:?}", outcome.response);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::{InferenceRequest, InferenceResponse, ProgressEvent, RequestId, RunOptions};
use crate::worker::WorkerError;

// ---------------------------------------------------------------------------
// Port messages
// ---------------------------------------------------------------------------

/// Caller → engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PortRequest {
    Run {
        request_id: RequestId,
        request: InferenceRequest,
        options: RunOptions,
    },
}

/// Engine → caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PortEvent {
    /// Intermediate progress for an in-flight request.
    Progress(ProgressEvent),
    /// Final outcome of a request.  Exactly one is sent per delivered request.
    Response {
        request_id: RequestId,
        result: Result<InferenceResponse, WorkerError>,
    },
}

// ---------------------------------------------------------------------------
// PortError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PortError {
    /// The other end was dropped (session discarded or process gone).
    #[error("engine port is closed")]
    Closed,

    /// The engine answered the request with an error.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

// ---------------------------------------------------------------------------
// channel
// ---------------------------------------------------------------------------

/// Create a connected pair of port ends.
pub fn channel() -> (CallerPort, EnginePort) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        CallerPort {
            requests: request_tx,
            events: event_rx,
        },
        EnginePort {
            requests: request_rx,
            events: PortSender(event_tx),
        },
    )
}

// ---------------------------------------------------------------------------
// EnginePort
// ---------------------------------------------------------------------------

/// The end owned by the engine session.
pub struct EnginePort {
    requests: mpsc::UnboundedReceiver<PortRequest>,
    events: PortSender,
}

impl fmt::Debug for EnginePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnginePort")
            .field("caller_connected", &self.events.is_connected())
            .finish_non_exhaustive()
    }
}

impl EnginePort {
    /// Next request from the caller, or `None` once the caller end is gone.
    pub async fn recv(&mut self) -> Option<PortRequest> {
        self.requests.recv().await
    }

    /// Handle for sending events back to the caller.
    pub fn sender(&self) -> &PortSender {
        &self.events
    }

    /// Returns `false` when the caller end has been dropped.
    pub fn send(&self, event: PortEvent) -> bool {
        self.events.send(event)
    }
}

/// Cloneable event sender towards the caller end of a port.
#[derive(Debug, Clone)]
pub struct PortSender(mpsc::UnboundedSender<PortEvent>);

impl PortSender {
    /// Returns `false` when the caller end has been dropped.
    pub fn send(&self, event: PortEvent) -> bool {
        self.0.send(event).is_ok()
    }

    pub fn send_progress(&self, event: ProgressEvent) -> bool {
        self.send(PortEvent::Progress(event))
    }

    pub fn is_connected(&self) -> bool {
        !self.0.is_closed()
    }
}

// ---------------------------------------------------------------------------
// CallerPort
// ---------------------------------------------------------------------------

/// Result of [`CallerPort::request`]: the final response plus the progress
/// payloads received before it, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub response: InferenceResponse,
    pub progress: Vec<Value>,
}

/// The end kept by the caller.
#[derive(Debug)]
pub struct CallerPort {
    requests: mpsc::UnboundedSender<PortRequest>,
    events: mpsc::UnboundedReceiver<PortEvent>,
}

impl CallerPort {
    /// Queue a run request without waiting for its outcome.
    pub fn send_run(
        &self,
        request_id: RequestId,
        request: InferenceRequest,
        options: RunOptions,
    ) -> Result<(), PortError> {
        self.requests
            .send(PortRequest::Run {
                request_id,
                request,
                options,
            })
            .map_err(|_| PortError::Closed)
    }

    /// Next event from the engine, or `None` once the engine end is gone and
    /// every buffered event has been read.
    pub async fn next_event(&mut self) -> Option<PortEvent> {
        self.events.recv().await
    }

    /// Non-blocking variant of [`next_event`](Self::next_event).
    pub fn try_next_event(&mut self) -> Option<PortEvent> {
        self.events.try_recv().ok()
    }

    /// Send one run request and wait for its final response, collecting any
    /// progress events tagged with the same request id along the way.
    pub async fn request(
        &mut self,
        request_id: RequestId,
        request: InferenceRequest,
        options: RunOptions,
    ) -> Result<RunOutcome, PortError> {
        self.send_run(request_id, request, options)?;

        let mut progress = Vec::new();
        while let Some(event) = self.events.recv().await {
            match event {
                PortEvent::Progress(event) if event.request_id == request_id => {
                    progress.push(event.data);
                }
                PortEvent::Response {
                    request_id: id,
                    result,
                } if id == request_id => {
                    let response = result?;
                    return Ok(RunOutcome { response, progress });
                }
                other => {
                    log::debug!("port: skipping event for another request: {other:?}");
                }
            }
        }
        Err(PortError::Closed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
