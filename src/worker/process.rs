//! Isolated inference process: the message loop hosting every engine session.
//!
//! [`InferenceProcess`] consumes [`ManagerMessage`]s from the process manager
//! and runs one task per session.  Sessions never block the loop, so a slow
//! pipeline build for one tab does not delay `run` calls or discards for
//! another.
//!
//! # Session flow
//!
//! ```text
//! StartTranslation{pair, id, generation, port}
//!   └─▶ spawn session task                          (cancellable at every await)
//!         ├─ host.request_engine_payload(pair)
//!         ├─ EngineWorker::initialize_engine(payload)
//!         │     ├─ Ok  → ReportEngineStatus{id, generation, Ready}
//!         │     └─ Err → ReportEngineStatus{id, generation, Error}, drop port
//!         ├─ loop: port request → worker.run → PortEvent::Response
//!         └─ on exit: ReportEnginePerformance (if any request completed)
//!
//! DiscardTranslations{id}  → cancel session, no further status or result
//! ForceShutdown{ack}       → cancel all sessions, ack, loop exits
//! ```
//!
//! Every report names the session's `generation`, which the manager issued,
//! so reports from a replaced session of the same window can be told apart.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::pipeline::BackendRegistry;
use crate::port::{EnginePort, PortEvent, PortRequest};
use crate::protocol::{EngineStatus, Generation, InnerWindowId, LanguagePair, ManagerMessage};

use super::engine::{EngineWorker, WorkerError};
use super::host::WorkerHost;
use super::stats::{count_words, EngineStats};

/// Sent by a session task when it ends on its own.
type Finished = (InnerWindowId, Generation);

struct ActiveSession {
    cancel: CancellationToken,
    generation: Generation,
}

pub struct InferenceProcess {
    host: WorkerHost,
    backends: BackendRegistry,
    config: WorkerConfig,
    sessions: HashMap<InnerWindowId, ActiveSession>,
    last_started: Option<Generation>,
    finished_tx: mpsc::UnboundedSender<Finished>,
    finished_rx: mpsc::UnboundedReceiver<Finished>,
}

impl InferenceProcess {
    pub fn new(host: WorkerHost, backends: BackendRegistry, config: WorkerConfig) -> Self {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        Self {
            host,
            backends,
            config,
            sessions: HashMap::new(),
            last_started: None,
            finished_tx,
            finished_rx,
        }
    }

    /// Run until the manager sends `ForceShutdown` or drops its sender.
    /// Every live session is cancelled on the way out.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ManagerMessage>) {
        log::info!("worker: inference process started");

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(ManagerMessage::StartTranslation {
                        language_pair,
                        inner_window_id,
                        generation,
                        port,
                    }) => self.start(language_pair, inner_window_id, generation, port),
                    Some(ManagerMessage::DiscardTranslations { inner_window_id }) => {
                        self.discard(inner_window_id);
                    }
                    Some(ManagerMessage::ForceShutdown { ack }) => {
                        self.cancel_all();
                        if ack.send(()).is_err() {
                            log::debug!("worker: shutdown ack has no receiver");
                        }
                        break;
                    }
                    None => {
                        log::info!("worker: manager channel closed");
                        self.cancel_all();
                        break;
                    }
                },
                Some((inner_window_id, generation)) = self.finished_rx.recv() => {
                    self.finish(inner_window_id, generation);
                }
            }
        }

        log::info!("worker: inference process stopped");
    }

    // -----------------------------------------------------------------------
    // Message handlers
    // -----------------------------------------------------------------------

    fn start(
        &mut self,
        language_pair: LanguagePair,
        inner_window_id: InnerWindowId,
        generation: Generation,
        port: EnginePort,
    ) {
        if let Some(previous) = self.sessions.remove(&inner_window_id) {
            log::warn!("worker: replacing live session for window {}", inner_window_id.0);
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        self.last_started = Some(generation);
        self.sessions.insert(
            inner_window_id,
            ActiveSession {
                cancel: cancel.clone(),
                generation,
            },
        );

        log::debug!("worker: starting {language_pair} session for window {}", inner_window_id.0);
        let session = Session {
            host: self.host.clone(),
            worker: EngineWorker::new(self.host.clone(), self.backends.clone(), &self.config),
            language_pair,
            inner_window_id,
            generation,
            port,
            cancel,
            stats: EngineStats::default(),
        };
        let finished = self.finished_tx.clone();
        tokio::spawn(async move {
            session.run().await;
            // The loop may already be gone; nothing to tidy in that case.
            let _ = finished.send((inner_window_id, generation));
        });
    }

    fn discard(&mut self, inner_window_id: InnerWindowId) {
        match self.sessions.remove(&inner_window_id) {
            Some(session) => {
                log::debug!("worker: discarding session for window {}", inner_window_id.0);
                session.cancel.cancel();
                self.check_idle();
            }
            None => log::debug!("worker: no session to discard for window {}", inner_window_id.0),
        }
    }

    fn finish(&mut self, inner_window_id: InnerWindowId, generation: Generation) {
        let current = self
            .sessions
            .get(&inner_window_id)
            .is_some_and(|session| session.generation == generation);
        if current {
            self.sessions.remove(&inner_window_id);
            log::debug!("worker: session for window {} ended", inner_window_id.0);
            self.check_idle();
        }
    }

    fn cancel_all(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.cancel.cancel();
        }
    }

    fn check_idle(&self) {
        if self.sessions.is_empty() && self.config.destroy_when_idle {
            log::info!("worker: no sessions left, asking host to destroy the process");
            self.host.destroy_engine_process(self.last_started);
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Session {
    host: WorkerHost,
    worker: EngineWorker,
    language_pair: LanguagePair,
    inner_window_id: InnerWindowId,
    generation: Generation,
    port: EnginePort,
    cancel: CancellationToken,
    stats: EngineStats,
}

impl Session {
    async fn run(mut self) {
        if !self.initialize().await {
            return;
        }
        self.serve().await;

        if self.stats.completed_requests() > 0 {
            self.host
                .report_engine_performance(self.stats.report(&self.language_pair));
        }
    }

    /// Fetch the payload and build the pipeline.  Reports the session status
    /// unless the session was discarded first.
    async fn initialize(&mut self) -> bool {
        let payload = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            payload = self.host.request_engine_payload(&self.language_pair) => payload,
        };

        let initialized = match payload {
            Ok(payload) => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return false,
                    result = self.worker.initialize_engine(&payload.runtime, &payload.options) => {
                        result.map(|_| ())
                    }
                }
            }
            Err(e) => {
                log::error!("worker: no engine payload for {}: {e}", self.language_pair);
                Err(WorkerError::PipelineInitialization(e.to_string()))
            }
        };

        if self.cancel.is_cancelled() {
            return false;
        }

        match initialized {
            Ok(()) => {
                self.host.report_engine_status(
                    self.inner_window_id,
                    self.generation,
                    EngineStatus::Ready,
                );
                true
            }
            Err(e) => {
                log::warn!(
                    "worker: session for window {} failed: {e}",
                    self.inner_window_id.0
                );
                self.host.report_engine_status(
                    self.inner_window_id,
                    self.generation,
                    EngineStatus::Error,
                );
                false
            }
        }
    }

    /// Answer port requests in order until the caller leaves or the session
    /// is discarded.
    async fn serve(&mut self) {
        loop {
            let request = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                request = self.port.recv() => request,
            };
            let Some(PortRequest::Run {
                request_id,
                request,
                options,
            }) = request
            else {
                log::debug!("worker: caller left window {}", self.inner_window_id.0);
                break;
            };

            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.worker.run(&request, request_id, &options, self.port.sender()) => result,
            };
            if result.is_ok() {
                self.stats.record(started.elapsed(), count_words(&request));
            }

            if !self.port.send(PortEvent::Response { request_id, result }) {
                log::debug!("worker: caller left window {}", self.inner_window_id.0);
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
