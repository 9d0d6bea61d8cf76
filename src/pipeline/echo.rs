//! Built-in `echo` backend.
//!
//! Runs the full tokenize → forward → detokenize shape of a translation
//! pipeline with an identity forward pass, so the engine plumbing can be
//! exercised end to end without real model weights.
//!
//! Request shape: `{"args": [<string | any>, …]}`.  Every string argument is
//! split into whitespace-terminated tokens, passed through unchanged and
//! joined back; other values are copied as-is.  Response shape:
//! `{"output": [...]}` with one entry per argument.
//!
//! When a progress callback is supplied, one progress payload
//! `{"index", "token", "total"}` is emitted per token.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::protocol::{EngineOptions, InferenceRequest, InferenceResponse};

use super::backend::{ModelCache, PipelineBackend};
use super::engine::{InferencePipeline, PipelineError, ProgressCallback};

/// Every WebAssembly module starts with these four bytes.
pub const WASM_MAGIC: &[u8; 4] = b"\0asm";

// ---------------------------------------------------------------------------
// EchoBackend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBackend;

#[async_trait]
impl PipelineBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn build(
        &self,
        runtime: &[u8],
        options: &EngineOptions,
        cache: Arc<dyn ModelCache>,
    ) -> Result<Box<dyn InferencePipeline>, PipelineError> {
        if !runtime.starts_with(WASM_MAGIC) {
            return Err(PipelineError::InvalidRuntime(
                "missing WebAssembly magic header".into(),
            ));
        }

        let mut model_bytes = 0;
        for key in &options.model_files {
            let file = cache
                .match_key(key)
                .await
                .ok_or_else(|| PipelineError::MissingModelFile(key.clone()))?;
            log::debug!(
                "echo: resolved {key} ({} bytes, {})",
                file.body.len(),
                file.mime_type
            );
            model_bytes += file.body.len();
        }

        Ok(Box::new(EchoPipeline {
            model_files: options.model_files.len(),
            model_bytes,
        }))
    }
}

// ---------------------------------------------------------------------------
// EchoPipeline
// ---------------------------------------------------------------------------

/// Identity pipeline produced by [`EchoBackend`].
#[derive(Debug, Clone, Default)]
pub struct EchoPipeline {
    model_files: usize,
    model_bytes: usize,
}

impl EchoPipeline {
    /// A pipeline with no model files attached.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whitespace-terminated tokens; concatenating them restores the input.
fn tokenize(text: &str) -> Vec<&str> {
    text.split_inclusive(char::is_whitespace).collect()
}

fn forward<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    tokens.to_vec()
}

fn detokenize(tokens: &[&str]) -> String {
    tokens.concat()
}

#[async_trait]
impl InferencePipeline for EchoPipeline {
    async fn run(
        &self,
        request: &InferenceRequest,
        progress: Option<&ProgressCallback>,
    ) -> Result<InferenceResponse, PipelineError> {
        let args = request
            .0
            .get("args")
            .and_then(Value::as_array)
            .ok_or_else(|| PipelineError::InvalidRequest("expected an `args` array".into()))?;
        log::trace!(
            "echo: run over {} args ({} model files, {} bytes)",
            args.len(),
            self.model_files,
            self.model_bytes
        );

        let mut output = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let Value::String(text) = arg else {
                output.push(arg.clone());
                continue;
            };

            let tokens = tokenize(text);
            let decoded = forward(&tokens);
            if let Some(progress) = progress {
                for token in &decoded {
                    progress(json!({
                        "index": index,
                        "token": token,
                        "total": decoded.len(),
                    }));
                }
            }
            output.push(Value::String(detokenize(&decoded)));
        }

        Ok(InferenceResponse(json!({ "output": output })))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::{CacheError, CachedResponse};
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapCache(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl ModelCache for MapCache {
        async fn match_key(&self, key: &str) -> Option<CachedResponse> {
            self.0.get(key).map(|body| CachedResponse {
                mime_type: "application/octet-stream".into(),
                body: body.clone(),
            })
        }

        async fn put(&self, _key: &str, _response: CachedResponse) -> Result<(), CacheError> {
            Err(CacheError::NotImplemented("put"))
        }
    }

    fn runtime() -> Vec<u8> {
        let mut bytes = WASM_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0, 0, 0]);
        bytes
    }

    fn empty_cache() -> Arc<dyn ModelCache> {
        Arc::new(MapCache(HashMap::new()))
    }

    #[tokio::test]
    async fn echoes_string_arguments() {
        let pipeline = EchoPipeline::new();
        let response = pipeline
            .run(&InferenceRequest(json!({"args": ["hello"]})), None)
            .await
            .unwrap();
        assert_eq!(response, InferenceResponse(json!({"output": ["hello"]})));
    }

    #[tokio::test]
    async fn preserves_whitespace_and_non_strings() {
        let pipeline = EchoPipeline::new();
        let response = pipeline
            .run(
                &InferenceRequest(json!({"args": ["a  b\tc ", 3, null]})),
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            response,
            InferenceResponse(json!({"output": ["a  b\tc ", 3, null]}))
        );
    }

    #[tokio::test]
    async fn emits_one_progress_event_per_token() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Box::new(move |data| sink.lock().unwrap().push(data));

        EchoPipeline::new()
            .run(
                &InferenceRequest(json!({"args": ["one two three"]})),
                Some(&callback),
            )
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0]["token"], "one ");
        assert_eq!(seen[2]["total"], 3);
    }

    #[tokio::test]
    async fn rejects_request_without_args() {
        let err = EchoPipeline::new()
            .run(&InferenceRequest(json!("hello")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn build_rejects_non_wasm_runtime() {
        let err = EchoBackend
            .build(b"not wasm", &EngineOptions::default(), empty_cache())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InvalidRuntime(_)));
    }

    #[tokio::test]
    async fn build_fails_on_cache_miss() {
        let options = EngineOptions {
            backend: "echo".into(),
            model_files: vec!["en-fr/model.bin".into()],
        };
        let err = EchoBackend
            .build(&runtime(), &options, empty_cache())
            .await
            .err()
            .unwrap();
        assert_eq!(err, PipelineError::MissingModelFile("en-fr/model.bin".into()));
    }

    #[tokio::test]
    async fn build_resolves_model_files() {
        let mut files = HashMap::new();
        files.insert("en-fr/model.bin".to_string(), vec![7u8; 16]);
        let options = EngineOptions {
            backend: "echo".into(),
            model_files: vec!["en-fr/model.bin".into()],
        };
        let pipeline = EchoBackend
            .build(&runtime(), &options, Arc::new(MapCache(files)))
            .await
            .unwrap();
        let response = pipeline
            .run(&InferenceRequest(json!({"args": ["bonjour"]})), None)
            .await
            .unwrap();
        assert_eq!(response.0["output"][0], "bonjour");
    }
}
