//! Worker → host RPC handle.
//!
//! [`WorkerHost`] wraps the worker's outbound channel.  Queries pair the
//! message with a `oneshot` reply and await it; notifications are
//! fire-and-forget.  If the host side has gone away, queries fail and
//! notifications are dropped with a debug log.

use tokio::sync::{mpsc, oneshot};

use crate::protocol::{
    EnginePayload, EngineStatus, Generation, InnerWindowId, LanguagePair, PerformanceReport, SessionId,
    WorkerMessage,
};
use crate::provider::{ModelFile, ModelFileError};

#[derive(Debug, Clone)]
pub struct WorkerHost {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerHost {
    pub fn new(tx: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self { tx }
    }

    /// Connected host handle plus the receiving end the host drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    pub async fn request_engine_payload(
        &self,
        language_pair: &LanguagePair,
    ) -> Result<EnginePayload, ModelFileError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(WorkerMessage::RequestEnginePayload {
                language_pair: language_pair.clone(),
                reply,
            })
            .map_err(|_| ModelFileError::Unavailable)?;
        response.await.map_err(|_| ModelFileError::Unavailable)?
    }

    pub async fn get_model_file(
        &self,
        key: &str,
        session_id: SessionId,
    ) -> Result<ModelFile, ModelFileError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(WorkerMessage::GetModelFile {
                key: key.to_string(),
                session_id,
                reply,
            })
            .map_err(|_| ModelFileError::Unavailable)?;
        response.await.map_err(|_| ModelFileError::Unavailable)?
    }

    pub fn notify_model_download_complete(&self, session_id: SessionId) {
        self.notify(WorkerMessage::NotifyModelDownloadComplete { session_id });
    }

    pub fn report_engine_status(
        &self,
        inner_window_id: InnerWindowId,
        generation: Generation,
        status: EngineStatus,
    ) {
        self.notify(WorkerMessage::ReportEngineStatus {
            inner_window_id,
            generation,
            status,
        });
    }

    pub fn report_engine_performance(&self, report: PerformanceReport) {
        self.notify(WorkerMessage::ReportEnginePerformance(report));
    }

    pub fn destroy_engine_process(&self, last_started: Option<Generation>) {
        self.notify(WorkerMessage::DestroyEngineProcess { last_started });
    }

    fn notify(&self, message: WorkerMessage) {
        if let Err(e) = self.tx.send(message) {
            log::debug!("worker: host is gone, dropping {:?}", e.0);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_fails_when_host_is_gone() {
        let (host, rx) = WorkerHost::channel();
        drop(rx);
        assert!(!host.is_connected());
        let err = host
            .get_model_file("model.bin", SessionId::new())
            .await
            .unwrap_err();
        assert_eq!(err, ModelFileError::Unavailable);
    }

    #[tokio::test]
    async fn query_fails_when_reply_is_dropped() {
        let (host, mut rx) = WorkerHost::channel();
        tokio::spawn(async move {
            // Receive and drop the query without answering.
            let _ = rx.recv().await;
        });
        let err = host
            .request_engine_payload(&LanguagePair::new("en", "fr"))
            .await
            .unwrap_err();
        assert_eq!(err, ModelFileError::Unavailable);
    }

    #[tokio::test]
    async fn notifications_are_delivered_in_order() {
        let (host, mut rx) = WorkerHost::channel();
        let session = SessionId::new();
        host.notify_model_download_complete(session);
        host.report_engine_status(InnerWindowId(4), Generation(2), EngineStatus::Ready);
        host.destroy_engine_process(Some(Generation(2)));

        assert!(matches!(
            rx.recv().await,
            Some(WorkerMessage::NotifyModelDownloadComplete { session_id }) if session_id == session
        ));
        assert!(matches!(
            rx.recv().await,
            Some(WorkerMessage::ReportEngineStatus {
                inner_window_id: InnerWindowId(4),
                generation: Generation(2),
                status: EngineStatus::Ready,
            })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(WorkerMessage::DestroyEngineProcess { last_started: Some(Generation(2)) })
        ));
    }

    #[test]
    fn notify_without_host_does_not_panic() {
        let (host, rx) = WorkerHost::channel();
        drop(rx);
        host.destroy_engine_process(None);
    }
}
