//! Inference engine thread.
//!
//! ONNX sessions need `&mut self` to run, so both models live on one
//! dedicated OS thread; HTTP handlers talk to it through a channel and
//! get replies over oneshots. The handle is the daemon's `Extractor`.

use image::RgbImage;
use lineup_core::{ExtractError, Extractor, OnnxExtractor};
use std::future::Future;
use tokio::sync::{mpsc, oneshot};

/// Messages sent from handlers to the engine thread.
enum EngineRequest {
    Extract {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<f32>, ExtractError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl Extractor for EngineHandle {
    fn extract(
        &self,
        image: RgbImage,
    ) -> impl Future<Output = Result<Vec<f32>, ExtractError>> + Send {
        let tx = self.tx.clone();
        async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(EngineRequest::Extract {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ExtractError::Unavailable("engine thread exited".into()))?;
            reply_rx
                .await
                .map_err(|_| ExtractError::Unavailable("engine thread exited".into()))?
        }
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads both ONNX models synchronously so a missing model fails the
/// daemon at startup, then enters the request loop until every handle
/// is dropped.
pub fn spawn_engine(detector_path: &str, embedder_path: &str) -> Result<EngineHandle, ExtractError> {
    let mut extractor = OnnxExtractor::load(detector_path, embedder_path)?;
    tracing::info!(detector = detector_path, embedder = embedder_path, "models loaded");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("lineup-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { image, reply } => {
                        let result = extractor.extract_descriptor(&image);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}
