//! Analyzer engine thread.
//!
//! `FaceAnalyzer` implementations may hold mutable inference state, so the
//! analyzer runs on a dedicated OS thread behind an mpsc/oneshot bridge.
//! Callers await [`AnalyzerHandle::detect`] without holding any roster or
//! store lock.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use rollcall_core::{AnalyzerError, DetectedFace, FaceAnalyzer};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("analyzer error: {0}")]
    Analyzer(#[from] AnalyzerError),
    #[error("analyzer thread exited")]
    ChannelClosed,
}

/// Messages sent from service callers to the analyzer thread.
enum EngineRequest {
    Detect {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<DetectedFace>, EngineError>>,
    },
}

/// Clone-safe handle to the analyzer thread.
#[derive(Clone)]
pub struct AnalyzerHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl AnalyzerHandle {
    /// Detect faces and extract embeddings from raw image bytes.
    pub async fn detect(&self, image: Vec<u8>) -> Result<Vec<DetectedFace>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the analyzer on a dedicated OS thread and return its handle.
///
/// The thread exits when every handle has been dropped.
pub fn spawn_analyzer<A>(mut analyzer: A) -> AnalyzerHandle
where
    A: FaceAnalyzer + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-analyzer".into())
        .spawn(move || {
            tracing::info!("analyzer thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect { image, reply } => {
                        let result = analyzer
                            .detect_faces(&image)
                            .map_err(EngineError::Analyzer);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("analyzer thread exiting");
        })
        .expect("failed to spawn analyzer thread");

    AnalyzerHandle { tx }
}
