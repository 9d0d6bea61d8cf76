//! Value types shared by the process manager, the engine worker and callers.
//!
//! Everything here is plain data: cheap to clone, `Send + Sync`, and (where it
//! crosses the wire boundary) serialisable with `serde`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// LanguagePair
// ---------------------------------------------------------------------------

/// Identifies which translation model an engine session loads.
///
/// Used as the key when asking the model provider for an engine payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagePair {
    /// BCP-47 tag of the language being translated from (e.g. `"en"`).
    pub source_language: String,
    /// BCP-47 tag of the language being translated to (e.g. `"fr"`).
    pub target_language: String,
}

impl LanguagePair {
    pub fn new(source_language: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            source_language: source_language.into(),
            target_language: target_language.into(),
        }
    }

    /// Stable key of the form `"{source}-{target}"`, used for model
    /// directories and log messages.
    ///
    /// ```
    /// use translations_engine::protocol::LanguagePair;
    ///
    /// assert_eq!(LanguagePair::new("en", "fr").key(), "en-fr");
    /// ```
    pub fn key(&self) -> String {
        format!("{}-{}", self.source_language, self.target_language)
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.source_language, self.target_language)
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifies the caller (tab / window) that owns an engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InnerWindowId(pub u64);

impl fmt::Display for InnerWindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// Issued by the process manager for every `start_translation`, strictly
/// increasing.  Tells apart successive sessions of the same window, so a
/// late report from a replaced session is never mistaken for the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Identifies one initialised engine session.
///
/// A fresh v4 UUID is minted for every session; ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Caller-generated id correlating one run call with its progress events and
/// its final response.  Must be unique among a session's in-flight requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EngineStatus
// ---------------------------------------------------------------------------

/// Session-level status reported by the worker once initialisation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// The pipeline was constructed and the session accepts run requests.
    Ready,
    /// The payload could not be fetched or the pipeline failed to build.
    Error,
}

impl EngineStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EngineStatus::Ready => "ready",
            EngineStatus::Error => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Engine payload
// ---------------------------------------------------------------------------

/// Options consumed by the backend-selection step when a pipeline is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOptions {
    /// Name of the registered pipeline backend (e.g. `"echo"`).
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Model file keys the backend resolves through the worker's cache.
    #[serde(default)]
    pub model_files: Vec<String>,
}

fn default_backend() -> String {
    "echo".into()
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model_files: Vec::new(),
        }
    }
}

/// Everything needed to construct one inference pipeline: the runtime binary
/// plus the options telling the backend which model files to resolve.
///
/// Created by the model provider; owned by the engine worker once delivered.
#[derive(Clone, PartialEq)]
pub struct EnginePayload {
    pub runtime: Vec<u8>,
    pub options: EngineOptions,
}

impl fmt::Debug for EnginePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnginePayload")
            .field("runtime_len", &self.runtime.len())
            .field("options", &self.options)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Requests, responses, progress
// ---------------------------------------------------------------------------

/// Opaque request payload handed to the inference pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InferenceRequest(pub Value);

/// Opaque result produced by the inference pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InferenceResponse(pub Value);

/// Per-call options for [`run`](crate::worker::EngineWorker::run).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    /// Stream intermediate progress events back to the caller.
    pub enable_inference_progress: bool,
}

impl RunOptions {
    pub fn with_progress() -> Self {
        Self {
            enable_inference_progress: true,
        }
    }
}

/// One intermediate progress payload, tagged with the request it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub request_id: RequestId,
    pub data: Value,
}

// ---------------------------------------------------------------------------
// PerformanceReport
// ---------------------------------------------------------------------------

/// Aggregate counters for one engine session, sent to the telemetry sink when
/// the session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub source_language: String,
    pub target_language: String,
    pub total_inference_seconds: f64,
    pub total_translated_words: u64,
    pub total_completed_requests: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn language_pair_serialises_camel_case() {
        let pair = LanguagePair::new("en", "de");
        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["sourceLanguage"], "en");
        assert_eq!(json["targetLanguage"], "de");
    }

    #[test]
    fn run_options_default_disables_progress() {
        let options: RunOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.enable_inference_progress);

        let options: RunOptions =
            serde_json::from_str(r#"{"enableInferenceProgress": true}"#).unwrap();
        assert!(options.enable_inference_progress);
    }

    #[test]
    fn engine_options_default_to_echo_backend() {
        let options: EngineOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.backend, "echo");
        assert!(options.model_files.is_empty());
    }

    #[test]
    fn payload_debug_hides_runtime_bytes() {
        let payload = EnginePayload {
            runtime: vec![0u8; 1024],
            options: EngineOptions::default(),
        };
        let text = format!("{payload:?}");
        assert!(text.contains("runtime_len: 1024"));
    }

    #[test]
    fn status_labels() {
        assert_eq!(EngineStatus::Ready.label(), "ready");
        assert_eq!(EngineStatus::Error.label(), "error");
        assert_eq!(
            serde_json::to_value(EngineStatus::Error).unwrap(),
            Value::String("error".into())
        );
    }
}
