//! 128-dimension face embedding via ONNX Runtime.
//!
//! Consumes a 112×112 aligned RGB crop and produces the L2-normalized
//! descriptor vector. The model is an external pretrained artifact; this
//! module only invokes it and validates its numeric output.

use crate::align::ALIGNED_SIZE;
use crate::types::DESCRIPTOR_DIM;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const EMBED_INPUT_SIZE: usize = ALIGNED_SIZE as usize;
// Symmetric normalization: pixel 127.5 maps to 0.0.
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 127.5;
/// Model version tag recorded alongside descriptors.
pub const EMBEDDER_VERSION: &str = "mfn128-v2";

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedder model not found: {0}")]
    ModelNotFound(String),
    #[error("embedder inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct OnnxEmbedder {
    session: Session,
}

impl OnnxEmbedder {
    /// Load the embedding model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedderError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, version = EMBEDDER_VERSION, "embedder model loaded");
        Ok(Self { session })
    }

    /// Produce the descriptor for an aligned face crop.
    ///
    /// A model emitting anything other than exactly [`DESCRIPTOR_DIM`]
    /// values is an inference failure, never a truncated descriptor.
    pub fn embed(&mut self, aligned: &RgbImage) -> Result<Vec<f32>, EmbedderError> {
        let input = preprocess(aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("descriptor output: {e}")))?;
        let raw: Vec<f32> = raw.to_vec();

        if raw.len() != DESCRIPTOR_DIM {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {DESCRIPTOR_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }

        Ok(l2_normalize(raw))
    }
}

/// Convert the aligned crop to a normalized NCHW tensor. Crops that are
/// not 112×112 (callers bypassing alignment) are resized first.
fn preprocess(aligned: &RgbImage) -> Array4<f32> {
    let resized;
    let crop = if aligned.dimensions() == (ALIGNED_SIZE, ALIGNED_SIZE) {
        aligned
    } else {
        resized = imageops::resize(aligned, ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle);
        &resized
    };

    let mut tensor = Array4::<f32>::zeros((1, 3, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - EMBED_MEAN) / EMBED_STD;
        }
    }
    tensor
}

/// Scale the vector to unit length. A zero vector is left untouched.
fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
    vector
}
