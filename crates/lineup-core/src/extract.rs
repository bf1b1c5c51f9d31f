//! Descriptor extraction — detection, alignment and embedding composed
//! behind one boundary.

use crate::align::align_face;
use crate::detect::{DetectorError, OnnxFaceDetector};
use crate::embed::{EmbedderError, OnnxEmbedder};
use crate::types::validate_vector;
use image::RgbImage;
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// Zero usable faces in the image. Terminal for the attempt; callers
    /// must not proceed to similarity search.
    #[error("no face detected")]
    NoFaceDetected,
    #[error("extraction failed: {0}")]
    Inference(String),
    #[error("extractor unavailable: {0}")]
    Unavailable(String),
}

impl From<DetectorError> for ExtractError {
    fn from(e: DetectorError) -> Self {
        match e {
            e @ DetectorError::ModelNotFound(_) => ExtractError::Unavailable(e.to_string()),
            other => ExtractError::Inference(other.to_string()),
        }
    }
}

impl From<EmbedderError> for ExtractError {
    fn from(e: EmbedderError) -> Self {
        match e {
            e @ EmbedderError::ModelNotFound(_) => ExtractError::Unavailable(e.to_string()),
            other => ExtractError::Inference(other.to_string()),
        }
    }
}

/// Model-invocation boundary: a normalized image in, a 128-dimension
/// descriptor out, or a typed no-face failure.
///
/// Implementations must be idempotent and side-effect free so that a
/// retry at the caller's discretion is always safe.
pub trait Extractor {
    fn extract(&self, image: RgbImage) -> impl Future<Output = Result<Vec<f32>, ExtractError>> + Send;
}

/// ONNX-backed extractor owning both model sessions.
///
/// Sessions take `&mut self` to run, so this type lives on a dedicated
/// thread in the daemon; the async [`Extractor`] seam is implemented by
/// the engine handle that fronts it.
pub struct OnnxExtractor {
    detector: OnnxFaceDetector,
    embedder: OnnxEmbedder,
}

impl OnnxExtractor {
    /// Load both models, failing fast on a missing artifact.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, ExtractError> {
        Ok(Self {
            detector: OnnxFaceDetector::load(detector_path)?,
            embedder: OnnxEmbedder::load(embedder_path)?,
        })
    }

    /// Extract the descriptor for the most prominent face.
    ///
    /// When several faces are present, the most confident detection wins
    /// and the rest are ignored — never averaged. Zero detections is the
    /// typed [`ExtractError::NoFaceDetected`], not a zero vector.
    pub fn extract_descriptor(&mut self, image: &RgbImage) -> Result<Vec<f32>, ExtractError> {
        let regions = self.detector.detect(image)?;
        let Some(face) = regions.first() else {
            return Err(ExtractError::NoFaceDetected);
        };
        if regions.len() > 1 {
            tracing::debug!(
                detections = regions.len(),
                confidence = face.confidence,
                "multiple faces; using the most confident"
            );
        }

        let aligned = align_face(image, &face.landmarks);
        let vector = self.embedder.embed(&aligned)?;
        validate_vector(&vector).map_err(|e| ExtractError::Inference(e.to_string()))?;
        Ok(vector)
    }
}
