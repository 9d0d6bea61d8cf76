//! Engine process manager: the host-side owner of one inference process.
//!
//! [`EngineProcessManager`] spawns the [`InferenceProcess`] when launched,
//! holds the process keep-alive while sessions may be active, routes status
//! reports back to the caller that started each session and answers the
//! worker's model queries through the [`ModelFileProvider`].
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──start_translation──▶ Starting ──keep-alive held──▶ Ready
//!       │                                                             │
//!       └──────────── destroy_engine_process / force_shutdown ────────┤
//!                                                                     ▼
//!                                                ShuttingDown ──▶ Destroyed (terminal)
//! ```
//!
//! The worker's message loop ending while the manager is neither shutting
//! down nor destroyed counts as transport loss: every registered caller gets
//! one `Error` status and the manager becomes `Destroyed`.
//!
//! Every `start_translation` is issued a fresh [`Generation`].  The worker
//! echoes it in status reports and in its idle destroy request, so reports
//! from a replaced session of the same window and idle signals that predate
//! a newer session are recognised and dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::EngineConfig;
use crate::pipeline::BackendRegistry;
use crate::port::EnginePort;
use crate::protocol::{
    EngineStatus, Generation, InnerWindowId, LanguagePair, ManagerMessage, WorkerMessage,
};
use crate::provider::ModelFileProvider;
use crate::worker::{InferenceProcess, WorkerHost};

use super::keepalive::{KeepAliveToken, ProcessHost};
use super::router::{EngineCaller, RequestRouter};
use super::telemetry::{LogTelemetry, TelemetrySink};

// ---------------------------------------------------------------------------
// ProcessState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// No session has been started yet.
    Uninitialized,
    /// First session requested; keep-alive not yet held.
    Starting,
    /// Keep-alive held; sessions can be started.
    Ready,
    /// Teardown in progress.  New sessions are rejected.
    ShuttingDown,
    /// Terminal.
    Destroyed,
}

impl ProcessState {
    /// ```
    /// use translations_engine::process::ProcessState;
    ///
    /// assert_eq!(ProcessState::Ready.label(), "ready");
    /// assert!(ProcessState::ShuttingDown.is_terminating());
    /// assert!(!ProcessState::Starting.is_terminating());
    /// ```
    pub fn label(&self) -> &'static str {
        match self {
            ProcessState::Uninitialized => "uninitialized",
            ProcessState::Starting => "starting",
            ProcessState::Ready => "ready",
            ProcessState::ShuttingDown => "shutting down",
            ProcessState::Destroyed => "destroyed",
        }
    }

    /// `true` once teardown has begun.
    pub fn is_terminating(&self) -> bool {
        matches!(self, ProcessState::ShuttingDown | ProcessState::Destroyed)
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The process was torn down; it cannot host new sessions.
    #[error("the engine process has been destroyed")]
    ProcessDestroyed,

    /// The worker did not acknowledge `force_shutdown` in time.  The manager
    /// is `Destroyed` regardless.
    #[error("engine process did not acknowledge shutdown within {0:?}")]
    ShutdownTimeout(Duration),

    /// The worker's message loop is gone.
    #[error("engine worker is unavailable")]
    WorkerUnavailable,
}

// ---------------------------------------------------------------------------
// EngineProcessManager
// ---------------------------------------------------------------------------

/// Whether the worker loop may still be running.  Tracked apart from
/// [`ProcessState`]: releasing the keep-alive does not stop the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerLink {
    Running,
    /// `ForceShutdown` sent, no acknowledgement yet.
    Stopping,
    /// Acknowledged shutdown, or the channel is closed.
    Stopped,
}

// Lock order: `state` before any other field.
struct ManagerInner {
    state: Mutex<ProcessState>,
    router: Mutex<RequestRouter>,
    keep_alive: Mutex<Option<KeepAliveToken>>,
    last_generation: Mutex<Option<Generation>>,
    worker: Mutex<WorkerLink>,
    process_host: ProcessHost,
    worker_tx: mpsc::UnboundedSender<ManagerMessage>,
    provider: Arc<dyn ModelFileProvider>,
    telemetry: Arc<dyn TelemetrySink>,
    shutdown_timeout: Duration,
}

/// Cheap to clone; every clone drives the same process.
#[derive(Clone)]
pub struct EngineProcessManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for EngineProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineProcessManager")
            .field("state", &self.state())
            .field("sessions", &lock(&self.inner.router).len())
            .finish_non_exhaustive()
    }
}

impl EngineProcessManager {
    /// Spawn the inference process with the built-in backends and log-based
    /// telemetry.  Must be called inside a tokio runtime.
    ///
    /// ```rust,no_run
    /// use std::sync::Arc;
    /// use translations_engine::config::EngineConfig;
    /// use translations_engine::port;
    /// use translations_engine::process::{EngineProcessManager, ProcessHost};
    /// use translations_engine::protocol::{InnerWindowId, LanguagePair};
    /// use translations_engine::provider::DirectoryModelProvider;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let config = EngineConfig::load()?;
    /// let provider = Arc::new(DirectoryModelProvider::from_config(&config));
    /// let manager = EngineProcessManager::launch(&config, ProcessHost::new(), provider);
    ///
    /// let (caller, engine_end) = port::channel();
    /// manager.start_translation(LanguagePair::new("en", "fr"), InnerWindowId(1), engine_end, None)?;
    /// # drop(caller);
    /// # Ok(())
    /// # }
    /// ```
    pub fn launch(
        config: &EngineConfig,
        process_host: ProcessHost,
        provider: Arc<dyn ModelFileProvider>,
    ) -> Self {
        Self::launch_with(
            config,
            process_host,
            provider,
            BackendRegistry::default(),
            Arc::new(LogTelemetry),
        )
    }

    /// [`launch`](Self::launch) with explicit backends and telemetry sink.
    pub fn launch_with(
        config: &EngineConfig,
        process_host: ProcessHost,
        provider: Arc<dyn ModelFileProvider>,
        backends: BackendRegistry,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let (host, host_rx) = WorkerHost::channel();
        tokio::spawn(InferenceProcess::new(host, backends, config.worker.clone()).run(worker_rx));

        log::info!("manager: inference process launched");
        Self::attach(
            worker_tx,
            host_rx,
            config.process.shutdown_timeout(),
            process_host,
            provider,
            telemetry,
        )
    }

    /// Wire the manager to an already running worker loop.
    pub(crate) fn attach(
        worker_tx: mpsc::UnboundedSender<ManagerMessage>,
        host_rx: mpsc::UnboundedReceiver<WorkerMessage>,
        shutdown_timeout: Duration,
        process_host: ProcessHost,
        provider: Arc<dyn ModelFileProvider>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let inner = Arc::new(ManagerInner {
            state: Mutex::new(ProcessState::Uninitialized),
            router: Mutex::new(RequestRouter::new()),
            keep_alive: Mutex::new(None),
            last_generation: Mutex::new(None),
            worker: Mutex::new(WorkerLink::Running),
            process_host,
            worker_tx,
            provider,
            telemetry,
            shutdown_timeout,
        });
        tokio::spawn(host_loop(Arc::downgrade(&inner), host_rx));
        Self { inner }
    }

    pub fn state(&self) -> ProcessState {
        *lock(&self.inner.state)
    }

    /// Hand `port` to a new session for `inner_window_id`.
    ///
    /// `caller`, when given, receives the session's status reports.  The
    /// state check and the hand-off happen before this returns.
    ///
    /// # Errors
    ///
    /// - [`EngineError::ProcessDestroyed`] — teardown has begun.
    /// - [`EngineError::WorkerUnavailable`] — the worker loop is gone.
    pub fn start_translation(
        &self,
        language_pair: LanguagePair,
        inner_window_id: InnerWindowId,
        port: EnginePort,
        caller: Option<Arc<dyn EngineCaller>>,
    ) -> Result<(), EngineError> {
        let mut state = lock(&self.inner.state);
        match *state {
            ProcessState::ShuttingDown | ProcessState::Destroyed => {
                log::warn!(
                    "manager: rejecting {language_pair} for window {}: process is {}",
                    inner_window_id.0,
                    state.label()
                );
                return Err(EngineError::ProcessDestroyed);
            }
            ProcessState::Uninitialized => {
                *state = ProcessState::Starting;
                let token = self.inner.process_host.acquire_keep_alive();
                *lock(&self.inner.keep_alive) = Some(token);
                *state = ProcessState::Ready;
                log::debug!("manager: process ready");
            }
            ProcessState::Starting | ProcessState::Ready => {}
        }

        let generation = {
            let mut last = lock(&self.inner.last_generation);
            let generation = last.map_or(Generation(0), Generation::next);
            *last = Some(generation);
            generation
        };

        {
            let mut router = lock(&self.inner.router);
            match caller {
                Some(caller) => router.register(inner_window_id, generation, caller),
                // The previous session's caller must not hear about this one.
                None => {
                    router.remove(inner_window_id);
                }
            }
        }

        let message = ManagerMessage::StartTranslation {
            language_pair,
            inner_window_id,
            generation,
            port,
        };
        if self.inner.worker_tx.send(message).is_err() {
            lock(&self.inner.router).remove(inner_window_id);
            log::error!("manager: worker is gone, cannot start window {}", inner_window_id.0);
            return Err(EngineError::WorkerUnavailable);
        }
        log::debug!(
            "manager: started session for window {} (generation {})",
            inner_window_id.0,
            generation.0
        );
        Ok(())
    }

    /// Forget the caller of `inner_window_id` and have the worker abandon
    /// the session.  Unknown ids and repeated calls are no-ops.
    pub fn discard_translations(&self, inner_window_id: InnerWindowId) {
        lock(&self.inner.router).remove(inner_window_id);
        let message = ManagerMessage::DiscardTranslations { inner_window_id };
        if self.inner.worker_tx.send(message).is_err() {
            log::debug!("manager: worker is gone, nothing to discard");
        }
    }

    /// Shut the worker down and wait, bounded by the configured timeout, for
    /// its acknowledgement.  The manager ends `Destroyed` in every case.
    ///
    /// The worker is stopped even when [`destroy_engine_process`] already
    /// released the keep-alive.  Once the worker has acknowledged, further
    /// calls return `Ok` without contacting it.
    ///
    /// [`destroy_engine_process`]: Self::destroy_engine_process
    pub async fn force_shutdown(&self) -> Result<(), EngineError> {
        {
            let mut state = lock(&self.inner.state);
            if *state != ProcessState::Destroyed {
                *state = ProcessState::ShuttingDown;
            }
            let mut worker = lock(&self.inner.worker);
            if *worker == WorkerLink::Stopped || self.inner.worker_tx.is_closed() {
                *worker = WorkerLink::Stopped;
                drop(worker);
                drop(state);
                lock(&self.inner.router).drain();
                self.inner.finish_teardown();
                return Ok(());
            }
            *worker = WorkerLink::Stopping;
        }
        log::info!("manager: force shutdown requested");

        let (ack, acked) = oneshot::channel();
        let result = if self
            .inner
            .worker_tx
            .send(ManagerMessage::ForceShutdown { ack })
            .is_err()
        {
            log::debug!("manager: worker already gone");
            *lock(&self.inner.worker) = WorkerLink::Stopped;
            Ok(())
        } else {
            match tokio::time::timeout(self.inner.shutdown_timeout, acked).await {
                // A dropped ack means the worker loop ended; stopped either way.
                Ok(_) => {
                    *lock(&self.inner.worker) = WorkerLink::Stopped;
                    Ok(())
                }
                Err(_) => {
                    log::error!(
                        "manager: worker did not acknowledge shutdown within {:?}",
                        self.inner.shutdown_timeout
                    );
                    Err(EngineError::ShutdownTimeout(self.inner.shutdown_timeout))
                }
            }
        };

        lock(&self.inner.router).drain();
        self.inner.finish_teardown();
        result
    }

    /// Release the keep-alive.  Only the first call has an effect; the host
    /// may still keep the process alive for other holders.
    pub fn destroy_engine_process(&self) {
        self.inner.destroy_engine_process();
    }
}

impl ManagerInner {
    fn destroy_engine_process(&self) {
        {
            let mut state = lock(&self.state);
            if *state == ProcessState::Destroyed {
                return;
            }
            *state = ProcessState::ShuttingDown;
        }
        log::info!("manager: destroying engine process");
        self.finish_teardown();
    }

    /// Idle destroy from the worker.  Ignored when a session was started
    /// after the one the worker last saw, since that session keeps the
    /// process busy.
    fn destroy_when_idle(&self, last_started: Option<Generation>) {
        {
            let mut state = lock(&self.state);
            if *state == ProcessState::Destroyed {
                return;
            }
            let last_issued = *lock(&self.last_generation);
            if last_started != last_issued {
                log::debug!(
                    "manager: ignoring idle destroy for generation {:?}, newest is {:?}",
                    last_started.map(|g| g.0),
                    last_issued.map(|g| g.0)
                );
                return;
            }
            *state = ProcessState::ShuttingDown;
        }
        log::info!("manager: worker is idle, destroying engine process");
        self.finish_teardown();
    }

    /// Invalidate and drop the keep-alive, then enter `Destroyed`.
    fn finish_teardown(&self) {
        if let Some(token) = lock(&self.keep_alive).take() {
            token.invalidate();
        }
        *lock(&self.state) = ProcessState::Destroyed;
    }

    fn handle_worker_message(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::RequestEnginePayload {
                language_pair,
                reply,
            } => {
                let provider = Arc::clone(&self.provider);
                tokio::spawn(async move {
                    let payload = provider.engine_payload(&language_pair).await;
                    if let Err(e) = &payload {
                        log::warn!("manager: no payload for {language_pair}: {e}");
                    }
                    if reply.send(payload).is_err() {
                        log::debug!("manager: payload for {language_pair} no longer wanted");
                    }
                });
            }
            WorkerMessage::GetModelFile {
                key,
                session_id,
                reply,
            } => {
                let provider = Arc::clone(&self.provider);
                tokio::spawn(async move {
                    let file = provider.get_model_file(&key, session_id).await;
                    if reply.send(file).is_err() {
                        log::debug!("manager: model file {key} no longer wanted");
                    }
                });
            }
            WorkerMessage::NotifyModelDownloadComplete { session_id } => {
                self.provider.notify_model_download_complete(session_id);
            }
            WorkerMessage::ReportEnginePerformance(report) => {
                self.telemetry.record_performance(&report);
            }
            WorkerMessage::ReportEngineStatus {
                inner_window_id,
                generation,
                status,
            } => self.deliver_status(inner_window_id, generation, status),
            WorkerMessage::DestroyEngineProcess { last_started } => {
                self.destroy_when_idle(last_started)
            }
        }
    }

    /// An `Error` status is final for the session, so its caller is removed
    /// on delivery and never hears about it again.  Reports tagged with an
    /// older generation than the window's current session are dropped.
    fn deliver_status(
        &self,
        inner_window_id: InnerWindowId,
        generation: Generation,
        status: EngineStatus,
    ) {
        let caller = {
            let mut router = lock(&self.router);
            match status {
                EngineStatus::Ready => router.caller(inner_window_id, generation),
                EngineStatus::Error => router.take(inner_window_id, generation),
            }
        };
        match caller {
            Some(caller) => caller.on_engine_status(inner_window_id, status),
            None => log::debug!(
                "manager: no caller for window {} generation {}, dropping {} status",
                inner_window_id.0,
                generation.0,
                status.label()
            ),
        }
    }

    fn on_transport_closed(&self) {
        {
            let mut state = lock(&self.state);
            let was_running = std::mem::replace(&mut *lock(&self.worker), WorkerLink::Stopped)
                == WorkerLink::Running;
            if state.is_terminating() || !was_running {
                return;
            }
            *state = ProcessState::ShuttingDown;
        }

        let callers = lock(&self.router).drain();
        log::error!(
            "manager: inference process ended unexpectedly, failing {} session(s)",
            callers.len()
        );
        self.finish_teardown();
        for (inner_window_id, caller) in callers {
            caller.on_engine_status(inner_window_id, EngineStatus::Error);
        }
    }
}

/// Serve worker messages until the worker side hangs up.  Holds only a weak
/// reference so dropping the last manager handle tears everything down.
async fn host_loop(inner: Weak<ManagerInner>, mut rx: mpsc::UnboundedReceiver<WorkerMessage>) {
    while let Some(message) = rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        inner.handle_worker_message(message);
    }
    if let Some(inner) = inner.upgrade() {
        inner.on_transport_closed();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
