//! Per-session engine worker.
//!
//! # Overview
//!
//! [`EngineWorker`] owns the one [`InferencePipeline`] of an engine session.
//! It is driven either directly through its typed methods or through
//! [`dispatch`](EngineWorker::dispatch), which accepts calls decoded at the
//! wire boundary.
//!
//! ```text
//! initialize_engine(runtime, options)
//!   ├─ mint SessionId
//!   ├─ BackendRegistry::select → PipelineBackend::build   (resolves files via match_key)
//!   ├─ notify_model_download_complete(session_id)          (always, success or not)
//!   └─ Ok(session_id) | Err(PipelineInitialization)
//!
//! run(request, request_id, options, events)
//!   ├─ intentional test sentinel → Err(IntentionalTestError)
//!   └─ pipeline.run(request, progress?)  → progress events tagged with request_id
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::WorkerConfig;
use crate::pipeline::{
    BackendRegistry, CacheError, CachedResponse, InferencePipeline, ModelCache, ProgressCallback,
};
use crate::port::PortSender;
use crate::protocol::{
    EngineOptions, InferenceRequest, InferenceResponse, ProgressEvent, ProtocolError, RequestId,
    RunOptions, SessionId, WireCall, WorkerCall,
};

use super::cache::SessionModelCache;
use super::host::WorkerHost;

// ---------------------------------------------------------------------------
// WorkerError
// ---------------------------------------------------------------------------

/// Errors surfaced by an engine worker.  Serialisable so they can travel
/// back to the caller over its port.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum WorkerError {
    /// The backend could not build a pipeline from the payload.
    #[error("pipeline initialization failed: {0}")]
    PipelineInitialization(String),

    /// `run` was called before a pipeline was built.
    #[error("engine is not initialized")]
    NotInitialized,

    /// `initialize_engine` was called on a worker that already has a
    /// session; re-initialisation needs a fresh worker.
    #[error("engine is already initialized")]
    AlreadyInitialized,

    #[error("`{0}` is not implemented")]
    NotImplemented(String),

    /// Deliberate failure triggered by the test request sentinel.
    #[error("this is an intentional test error")]
    IntentionalTestError,

    /// The pipeline failed while running a request.
    #[error("inference failed: {0}")]
    Inference(String),

    /// The call could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<CacheError> for WorkerError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::NotImplemented(operation) => WorkerError::NotImplemented(operation.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Test request sentinel
// ---------------------------------------------------------------------------

/// Request value that makes [`EngineWorker::run`] fail with
/// [`WorkerError::IntentionalTestError`].  Only compiled into test builds
/// and builds with the `test-hooks` feature.
#[cfg(any(test, feature = "test-hooks"))]
pub const INTENTIONAL_ERROR_REQUEST: &str = "throw";

#[cfg(any(test, feature = "test-hooks"))]
fn is_intentional_error_request(request: &InferenceRequest) -> bool {
    request.0.as_str() == Some(INTENTIONAL_ERROR_REQUEST)
}

#[cfg(not(any(test, feature = "test-hooks")))]
fn is_intentional_error_request(_request: &InferenceRequest) -> bool {
    false
}

// ---------------------------------------------------------------------------
// EngineWorker
// ---------------------------------------------------------------------------

pub struct EngineWorker {
    host: WorkerHost,
    backends: BackendRegistry,
    no_local_prefix: String,
    session_id: Option<SessionId>,
    pipeline: Option<Box<dyn InferencePipeline>>,
}

impl std::fmt::Debug for EngineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineWorker")
            .field("session_id", &self.session_id)
            .field("initialized", &self.pipeline.is_some())
            .finish_non_exhaustive()
    }
}

impl EngineWorker {
    pub fn new(host: WorkerHost, backends: BackendRegistry, config: &WorkerConfig) -> Self {
        Self {
            host,
            backends,
            no_local_prefix: config.no_local_prefix.clone(),
            session_id: None,
            pipeline: None,
        }
    }

    /// Session id minted by [`initialize_engine`](Self::initialize_engine).
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Build the session's pipeline.
    ///
    /// The host is told that model download finished whether or not the
    /// build succeeds.  A worker initialises at most once, even when the
    /// first attempt failed.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::AlreadyInitialized`] — a session already exists.
    /// - [`WorkerError::PipelineInitialization`] — backend selection or the
    ///   build failed.
    pub async fn initialize_engine(
        &mut self,
        runtime: &[u8],
        options: &EngineOptions,
    ) -> Result<SessionId, WorkerError> {
        if self.session_id.is_some() {
            return Err(WorkerError::AlreadyInitialized);
        }

        let session_id = SessionId::new();
        self.session_id = Some(session_id);
        log::debug!(
            "worker: initializing session {session_id} with backend {}",
            options.backend
        );

        let cache: Arc<dyn ModelCache> = Arc::new(self.cache_for(session_id));
        let built = match self.backends.select(&options.backend) {
            Ok(backend) => backend.build(runtime, options, cache).await,
            Err(e) => Err(e),
        };

        self.host.notify_model_download_complete(session_id);

        match built {
            Ok(pipeline) => {
                self.pipeline = Some(pipeline);
                log::info!("worker: session {session_id} ready");
                Ok(session_id)
            }
            Err(e) => {
                log::error!("worker: session {session_id} failed to initialize: {e}");
                Err(WorkerError::PipelineInitialization(e.to_string()))
            }
        }
    }

    /// Look up a model file for this session.  `None` on a miss, before
    /// initialisation, or for keys carrying the no-local prefix.
    pub async fn match_key(&self, key: &str) -> Option<CachedResponse> {
        let session_id = self.session_id?;
        self.cache_for(session_id).match_key(key).await
    }

    /// Always fails: the cache is read-only from the pipeline's side.
    pub async fn put(&self, key: &str, response: CachedResponse) -> Result<(), WorkerError> {
        let Some(session_id) = self.session_id else {
            return Err(WorkerError::NotImplemented("put".into()));
        };
        self.cache_for(session_id)
            .put(key, response)
            .await
            .map_err(WorkerError::from)
    }

    /// Run one request through the pipeline.
    ///
    /// A progress callback forwarding to `events` is built only when
    /// `options.enable_inference_progress` is set.
    pub async fn run(
        &self,
        request: &InferenceRequest,
        request_id: RequestId,
        options: &RunOptions,
        events: &PortSender,
    ) -> Result<InferenceResponse, WorkerError> {
        if is_intentional_error_request(request) {
            return Err(WorkerError::IntentionalTestError);
        }

        let pipeline = self.pipeline.as_ref().ok_or(WorkerError::NotInitialized)?;

        let progress: Option<ProgressCallback> = if options.enable_inference_progress {
            let events = events.clone();
            Some(Box::new(move |data| {
                events.send_progress(ProgressEvent { request_id, data });
            }))
        } else {
            None
        };

        pipeline
            .run(request, progress.as_ref())
            .await
            .map_err(|e| WorkerError::Inference(e.to_string()))
    }

    /// Decode a wire call and invoke the matching method.
    ///
    /// Decoding failures are logged and returned; they never affect the
    /// worker's state.
    pub async fn dispatch(&mut self, call: WireCall, events: &PortSender) -> Result<Value, WorkerError> {
        let call = WorkerCall::try_from(call).map_err(|e| {
            log::error!("worker: rejecting call: {e}");
            WorkerError::Protocol(e)
        })?;
        log::trace!("worker: dispatching {}", call.method());

        match call {
            WorkerCall::InitializeEngine { runtime, options } => {
                let session_id = self.initialize_engine(&runtime, &options).await?;
                Ok(json!({ "sessionId": session_id }))
            }
            WorkerCall::Run {
                request,
                request_id,
                options,
            } => self
                .run(&request, request_id, &options, events)
                .await
                .map(|response| response.0),
            WorkerCall::Match { key } => Ok(match self.match_key(&key).await {
                Some(response) => json!({
                    "mimeType": response.mime_type,
                    "size": response.body.len(),
                }),
                None => Value::Null,
            }),
            WorkerCall::Put { key, body } => {
                let response = CachedResponse {
                    mime_type: crate::provider::mime_type_for(&key).to_string(),
                    body,
                };
                self.put(&key, response).await.map(|()| Value::Null)
            }
        }
    }

    fn cache_for(&self, session_id: SessionId) -> SessionModelCache {
        SessionModelCache::new(session_id, self.host.clone(), self.no_local_prefix.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::WASM_MAGIC;
    use crate::port::{self, CallerPort, PortEvent};
    use crate::protocol::WorkerMessage;
    use crate::provider::{ModelFile, ModelFileError};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records what the fake host saw.
    #[derive(Default)]
    struct HostLog {
        lookups: AtomicUsize,
        completed: Mutex<Vec<SessionId>>,
    }

    /// Spawn a fake host serving `files` and recording notifications.
    fn fake_host(files: HashMap<String, Vec<u8>>) -> (WorkerHost, Arc<HostLog>) {
        let (host, mut rx) = WorkerHost::channel();
        let log = Arc::new(HostLog::default());
        let seen = Arc::clone(&log);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    WorkerMessage::GetModelFile { key, reply, .. } => {
                        seen.lookups.fetch_add(1, Ordering::SeqCst);
                        let answer = files
                            .get(&key)
                            .map(|bytes| ModelFile::for_key(&key, bytes.clone()))
                            .ok_or(ModelFileError::NotFound(key));
                        let _ = reply.send(answer);
                    }
                    WorkerMessage::NotifyModelDownloadComplete { session_id } => {
                        seen.completed.lock().unwrap().push(session_id);
                    }
                    _ => {}
                }
            }
        });
        (host, log)
    }

    /// Let the fake host drain what it has been sent.
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn worker_with(files: HashMap<String, Vec<u8>>) -> (EngineWorker, Arc<HostLog>) {
        let (host, log) = fake_host(files);
        let worker = EngineWorker::new(host, BackendRegistry::default(), &WorkerConfig::default());
        (worker, log)
    }

    fn runtime() -> Vec<u8> {
        WASM_MAGIC.to_vec()
    }

    fn options(files: &[&str]) -> EngineOptions {
        EngineOptions {
            backend: "echo".into(),
            model_files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn drain(caller: &mut CallerPort) -> Vec<PortEvent> {
        let mut events = Vec::new();
        while let Some(event) = caller.try_next_event() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn echo_run_without_progress() {
        let (mut worker, _) = worker_with(HashMap::new());
        worker.initialize_engine(&runtime(), &options(&[])).await.unwrap();
        let (mut caller, engine_end) = port::channel();

        let response = worker
            .run(
                &InferenceRequest(json!({"args": ["hello"]})),
                RequestId(1),
                &RunOptions::default(),
                engine_end.sender(),
            )
            .await
            .unwrap();

        assert_eq!(response, InferenceResponse(json!({"output": ["hello"]})));
        assert!(drain(&mut caller).is_empty());
    }

    #[tokio::test]
    async fn progress_events_carry_request_id() {
        let (mut worker, _) = worker_with(HashMap::new());
        worker.initialize_engine(&runtime(), &options(&[])).await.unwrap();
        let (mut caller, engine_end) = port::channel();

        worker
            .run(
                &InferenceRequest(json!({"args": ["a b"]})),
                RequestId(42),
                &RunOptions::with_progress(),
                engine_end.sender(),
            )
            .await
            .unwrap();

        let events = drain(&mut caller);
        assert_eq!(events.len(), 2);
        for event in events {
            match event {
                PortEvent::Progress(p) => assert_eq!(p.request_id, RequestId(42)),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn sentinel_fails_regardless_of_state() {
        let (mut worker, _) = worker_with(HashMap::new());
        let (_caller, engine_end) = port::channel();
        let sentinel = InferenceRequest(json!(INTENTIONAL_ERROR_REQUEST));

        // Before initialisation.
        let err = worker
            .run(&sentinel, RequestId(1), &RunOptions::default(), engine_end.sender())
            .await
            .unwrap_err();
        assert_eq!(err, WorkerError::IntentionalTestError);

        // After initialisation, with progress enabled.
        worker.initialize_engine(&runtime(), &options(&[])).await.unwrap();
        let err = worker
            .run(&sentinel, RequestId(2), &RunOptions::with_progress(), engine_end.sender())
            .await
            .unwrap_err();
        assert_eq!(err, WorkerError::IntentionalTestError);
    }

    #[tokio::test]
    async fn options_alone_never_trigger_sentinel() {
        let (mut worker, _) = worker_with(HashMap::new());
        worker.initialize_engine(&runtime(), &options(&[])).await.unwrap();
        let (_caller, engine_end) = port::channel();

        let result = worker
            .run(
                &InferenceRequest(json!({"args": [INTENTIONAL_ERROR_REQUEST]})),
                RequestId(1),
                &RunOptions::with_progress(),
                engine_end.sender(),
            )
            .await;
        assert_eq!(
            result.unwrap(),
            InferenceResponse(json!({"output": [INTENTIONAL_ERROR_REQUEST]}))
        );
    }

    #[tokio::test]
    async fn run_before_initialize_fails() {
        let (worker, _) = worker_with(HashMap::new());
        let (_caller, engine_end) = port::channel();
        let err = worker
            .run(
                &InferenceRequest(json!({"args": []})),
                RequestId(1),
                &RunOptions::default(),
                engine_end.sender(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, WorkerError::NotInitialized);
    }

    #[tokio::test]
    async fn initialize_resolves_files_and_notifies() {
        let mut files = HashMap::new();
        files.insert("en-fr/model.bin".to_string(), vec![1, 2, 3]);
        let (mut worker, log) = worker_with(files);

        let session = worker
            .initialize_engine(&runtime(), &options(&["en-fr/model.bin"]))
            .await
            .unwrap();

        assert!(worker.is_initialized());
        assert_eq!(worker.session_id(), Some(session));
        assert_eq!(log.lookups.load(Ordering::SeqCst), 1);
        settle().await;
        assert_eq!(*log.completed.lock().unwrap(), vec![session]);
    }

    #[tokio::test]
    async fn failed_initialize_still_notifies() {
        let (mut worker, log) = worker_with(HashMap::new());

        let err = worker
            .initialize_engine(&runtime(), &options(&["en-fr/missing.bin"]))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::PipelineInitialization(_)));
        assert!(!worker.is_initialized());
        settle().await;
        assert_eq!(log.completed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_backend_fails_initialization() {
        let (mut worker, _) = worker_with(HashMap::new());
        let options = EngineOptions {
            backend: "onnx".into(),
            model_files: vec![],
        };
        let err = worker.initialize_engine(&runtime(), &options).await.unwrap_err();
        assert!(matches!(err, WorkerError::PipelineInitialization(ref m) if m.contains("onnx")));
    }

    #[tokio::test]
    async fn initialize_happens_at_most_once() {
        let (mut worker, _) = worker_with(HashMap::new());
        let first = worker.initialize_engine(&runtime(), &options(&[])).await.unwrap();
        let err = worker.initialize_engine(&runtime(), &options(&[])).await.unwrap_err();
        assert_eq!(err, WorkerError::AlreadyInitialized);
        assert_eq!(worker.session_id(), Some(first));
    }

    #[tokio::test]
    async fn sessions_get_fresh_ids() {
        let (mut a, _) = worker_with(HashMap::new());
        let (mut b, _) = worker_with(HashMap::new());
        let id_a = a.initialize_engine(&runtime(), &options(&[])).await.unwrap();
        let id_b = b.initialize_engine(&runtime(), &options(&[])).await.unwrap();
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn match_never_throws_on_provider_failure() {
        let (mut worker, log) = worker_with(HashMap::new());
        worker.initialize_engine(&runtime(), &options(&[])).await.unwrap();

        assert!(worker.match_key("model.bin").await.is_none());
        assert_eq!(log.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn match_with_no_local_prefix_skips_host() {
        let (mut worker, log) = worker_with(HashMap::new());
        worker.initialize_engine(&runtime(), &options(&[])).await.unwrap();

        assert!(worker.match_key("NO_LOCALmodel.bin").await.is_none());
        assert_eq!(log.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn put_is_not_implemented() {
        let (mut worker, _) = worker_with(HashMap::new());
        let err = worker.put("k", CachedResponse::default()).await.unwrap_err();
        assert_eq!(err, WorkerError::NotImplemented("put".into()));

        worker.initialize_engine(&runtime(), &options(&[])).await.unwrap();
        let err = worker.put("k", CachedResponse::default()).await.unwrap_err();
        assert_eq!(err, WorkerError::NotImplemented("put".into()));
    }

    #[tokio::test]
    async fn dispatch_routes_calls() {
        let mut files = HashMap::new();
        files.insert("en-fr/config.json".to_string(), b"{}".to_vec());
        let (mut worker, _) = worker_with(files);
        let (_caller, engine_end) = port::channel();

        let init = worker
            .dispatch(
                WireCall::new("initializeEngine", vec![json!(runtime()), json!({})]),
                engine_end.sender(),
            )
            .await
            .unwrap();
        assert!(init["sessionId"].is_string());

        let output = worker
            .dispatch(
                WireCall::new("run", vec![json!({"args": ["hi"]}), json!(1)]),
                engine_end.sender(),
            )
            .await
            .unwrap();
        assert_eq!(output, json!({"output": ["hi"]}));

        let matched = worker
            .dispatch(WireCall::new("match", vec![json!("en-fr/config.json")]), engine_end.sender())
            .await
            .unwrap();
        assert_eq!(matched, json!({"mimeType": "application/json", "size": 2}));

        let put = worker
            .dispatch(WireCall::new("put", vec![json!("k")]), engine_end.sender())
            .await
            .unwrap_err();
        assert!(matches!(put, WorkerError::NotImplemented(_)));
    }

    #[tokio::test]
    async fn dispatch_unknown_method_leaves_worker_usable() {
        let (mut worker, _) = worker_with(HashMap::new());
        let (_caller, engine_end) = port::channel();

        let err = worker
            .dispatch(WireCall::new("explode", vec![]), engine_end.sender())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            WorkerError::Protocol(ProtocolError::MethodNotFound("explode".into()))
        );

        worker.initialize_engine(&runtime(), &options(&[])).await.unwrap();
        assert!(worker.is_initialized());
    }
}
