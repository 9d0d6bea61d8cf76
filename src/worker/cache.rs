//! Read-only model cache handed to pipeline backends.
//!
//! [`SessionModelCache`] answers `match_key` by asking the host for the file
//! on behalf of one session.  It never fails: keys carrying the no-local
//! prefix and provider failures both come back as a miss (`None`) so the
//! backend takes its own fallback path.  `put` is unsupported.

use async_trait::async_trait;

use crate::pipeline::{CacheError, CachedResponse, ModelCache};
use crate::protocol::SessionId;

use super::host::WorkerHost;

#[derive(Debug, Clone)]
pub struct SessionModelCache {
    session_id: SessionId,
    host: WorkerHost,
    no_local_prefix: String,
}

impl SessionModelCache {
    pub fn new(session_id: SessionId, host: WorkerHost, no_local_prefix: impl Into<String>) -> Self {
        Self {
            session_id,
            host,
            no_local_prefix: no_local_prefix.into(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    fn is_remote_only(&self, key: &str) -> bool {
        !self.no_local_prefix.is_empty() && key.starts_with(&self.no_local_prefix)
    }
}

#[async_trait]
impl ModelCache for SessionModelCache {
    async fn match_key(&self, key: &str) -> Option<CachedResponse> {
        if self.is_remote_only(key) {
            log::debug!("worker: {key} is remote-only, reporting a cache miss");
            return None;
        }

        match self.host.get_model_file(key, self.session_id).await {
            Ok(file) => Some(CachedResponse {
                mime_type: file.mime_type,
                body: file.bytes,
            }),
            Err(e) => {
                log::debug!("worker: cache miss for {key}: {e}");
                None
            }
        }
    }

    async fn put(&self, _key: &str, _response: CachedResponse) -> Result<(), CacheError> {
        Err(CacheError::NotImplemented("put"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WorkerMessage;
    use crate::provider::{ModelFile, ModelFileError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Spawn a fake host answering `GetModelFile` with `answer`, counting
    /// lookups.
    fn fake_host(
        answer: Result<ModelFile, ModelFileError>,
    ) -> (WorkerHost, Arc<AtomicUsize>) {
        let (host, mut rx) = WorkerHost::channel();
        let lookups = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&lookups);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let WorkerMessage::GetModelFile { reply, .. } = message {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = reply.send(answer.clone());
                }
            }
        });
        (host, lookups)
    }

    #[tokio::test]
    async fn remote_only_key_misses_without_asking_host() {
        let (host, lookups) = fake_host(Ok(ModelFile::for_key("x", vec![1])));
        let cache = SessionModelCache::new(SessionId::new(), host, "NO_LOCAL");

        assert!(cache.match_key("NO_LOCALhttps://hub/model.bin").await.is_none());
        assert_eq!(lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_failure_is_a_miss() {
        let (host, lookups) = fake_host(Err(ModelFileError::NotFound("model.bin".into())));
        let cache = SessionModelCache::new(SessionId::new(), host, "NO_LOCAL");

        assert!(cache.match_key("model.bin").await.is_none());
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hit_keeps_mime_type() {
        let (host, _) = fake_host(Ok(ModelFile::for_key("config.json", b"{}".to_vec())));
        let cache = SessionModelCache::new(SessionId::new(), host, "NO_LOCAL");

        let response = cache.match_key("config.json").await.unwrap();
        assert_eq!(response.mime_type, "application/json");
        assert_eq!(response.body, b"{}".to_vec());
    }

    #[tokio::test]
    async fn disconnected_host_is_a_miss() {
        let (host, rx) = WorkerHost::channel();
        drop(rx);
        let cache = SessionModelCache::new(SessionId::new(), host, "NO_LOCAL");
        assert!(cache.match_key("model.bin").await.is_none());
    }

    #[tokio::test]
    async fn put_is_not_implemented() {
        let (host, _rx) = WorkerHost::channel();
        let cache = SessionModelCache::new(SessionId::new(), host, "NO_LOCAL");
        let err = cache
            .put("model.bin", CachedResponse::default())
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::NotImplemented("put"));
    }

    #[test]
    fn empty_prefix_never_matches() {
        let (host, _rx) = WorkerHost::channel();
        let cache = SessionModelCache::new(SessionId::new(), host, "");
        assert!(!cache.is_remote_only("anything"));
    }
}
