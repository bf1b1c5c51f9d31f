//! Anchor-free face detection via ONNX Runtime.
//!
//! Runs an SCRFD-family detector over a letterboxed 640×640 RGB input.
//! The model emits score/box/landmark tensors per stride (8, 16, 32);
//! decoded detections are de-letterboxed back to source coordinates,
//! de-duplicated with NMS and sorted by confidence.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DET_INPUT_SIZE: usize = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_CONFIDENCE: f32 = 0.5;
const DET_NMS_IOU: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;
/// score/box/landmark tensors per stride.
const DET_OUTPUTS: usize = DET_STRIDES.len() * 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0}")]
    ModelNotFound(String),
    #[error("detector inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face region in source-image coordinates.
#[derive(Debug, Clone)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: [(f32, f32); 5],
}

/// Coordinate mapping from letterboxed input back to the source image.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub struct OnnxFaceDetector {
    session: Session,
}

impl OnnxFaceDetector {
    /// Load the detection model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        tracing::info!(path = model_path, outputs = num_outputs, "detector model loaded");

        if num_outputs < DET_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "detector must emit {DET_OUTPUTS} tensors (3 strides x score/box/landmarks), got {num_outputs}"
            )));
        }

        Ok(Self { session })
    }

    /// Detect faces, most confident first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>, DetectorError> {
        let (tensor, letterbox) = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;

        // Positional tensor layout: [0-2] scores, [3-5] boxes, [6-8] landmarks.
        let mut regions = Vec::new();
        for (pos, &stride) in DET_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[pos + DET_STRIDES.len()]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;
            let (_, points) = outputs[pos + DET_STRIDES.len() * 2]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("landmarks stride {stride}: {e}")))?;

            decode_stride(scores, boxes, points, stride, &letterbox, &mut regions);
        }

        let mut kept = suppress(regions, DET_NMS_IOU);
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(kept)
    }
}

/// Letterbox the image into a 640×640 NCHW tensor.
///
/// The tensor is zero-initialized; zero is exactly the normalized value
/// of the mean pixel, so padding reads as neutral to the model.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (w, h) = image.dimensions();
    let side = DET_INPUT_SIZE as f32;
    let scale = (side / w as f32).min(side / h as f32);

    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let pad_x = (DET_INPUT_SIZE - new_w as usize) / 2;
    let pad_y = (DET_INPUT_SIZE - new_h as usize) / 2;

    let mut tensor = Array4::<f32>::zeros((1, 3, DET_INPUT_SIZE, DET_INPUT_SIZE));
    for (px, py, pixel) in resized.enumerate_pixels() {
        let x = px as usize + pad_x;
        let y = py as usize + pad_y;
        for c in 0..3 {
            tensor[[0, c, y, x]] = (pixel[c] as f32 - DET_MEAN) / DET_STD;
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Decode one stride level: anchor centers on a `stride`-spaced grid,
/// box offsets and landmark offsets expressed in stride units.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    points: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    out: &mut Vec<FaceRegion>,
) {
    let cells = DET_INPUT_SIZE / stride;
    let anchors = cells * cells * DET_ANCHORS_PER_CELL;
    let unit = stride as f32;

    for idx in 0..anchors.min(scores.len()) {
        let confidence = scores[idx];
        if confidence <= DET_CONFIDENCE {
            continue;
        }

        let cell = idx / DET_ANCHORS_PER_CELL;
        let anchor_x = (cell % cells) as f32 * unit;
        let anchor_y = (cell / cells) as f32 * unit;

        let b = idx * 4;
        let k = idx * 10;
        if b + 3 >= boxes.len() || k + 9 >= points.len() {
            break;
        }

        let (x1, y1) = letterbox.to_source(anchor_x - boxes[b] * unit, anchor_y - boxes[b + 1] * unit);
        let (x2, y2) =
            letterbox.to_source(anchor_x + boxes[b + 2] * unit, anchor_y + boxes[b + 3] * unit);

        let mut landmarks = [(0.0f32, 0.0f32); 5];
        for (i, lm) in landmarks.iter_mut().enumerate() {
            *lm = letterbox.to_source(
                anchor_x + points[k + i * 2] * unit,
                anchor_y + points[k + i * 2 + 1] * unit,
            );
        }

        out.push(FaceRegion {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence,
            landmarks,
        });
    }
}

/// Intersection-over-union of two regions.
fn iou(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Greedy NMS: keep a region unless it overlaps an already-kept,
/// higher-confidence region beyond the IoU limit.
fn suppress(mut regions: Vec<FaceRegion>, iou_limit: f32) -> Vec<FaceRegion> {
    regions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<FaceRegion> = Vec::new();
    for region in regions {
        if kept.iter().all(|k| iou(k, &region) <= iou_limit) {
            kept.push(region);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            confidence,
            landmarks: [(0.0, 0.0); 5],
        }
    }

    #[test]
    fn iou_of_identical_regions_is_one() {
        let a = region(10.0, 10.0, 50.0, 50.0, 0.9);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_regions_is_zero() {
        let a = region(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = region(100.0, 100.0, 10.0, 10.0, 0.9);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = region(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = region(5.0, 0.0, 10.0, 10.0, 0.9);
        let expected = 50.0 / 150.0;
        assert!((iou(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn suppress_drops_overlapping_weaker_region() {
        let regions = vec![
            region(0.0, 0.0, 100.0, 100.0, 0.8),
            region(5.0, 5.0, 100.0, 100.0, 0.9),
            region(300.0, 300.0, 40.0, 40.0, 0.6),
        ];
        let kept = suppress(regions, DET_NMS_IOU);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn suppress_keeps_everything_when_disjoint() {
        let regions = vec![
            region(0.0, 0.0, 10.0, 10.0, 0.7),
            region(50.0, 50.0, 10.0, 10.0, 0.9),
        ];
        assert_eq!(suppress(regions, DET_NMS_IOU).len(), 2);
    }

    #[test]
    fn letterbox_roundtrip() {
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0.0,
            pad_y: 80.0,
        };
        // A point at (100, 50) in a 320x240 source lands at (200, 180)
        // in the 640x640 letterboxed input.
        let (sx, sy) = lb.to_source(200.0, 180.0);
        assert!((sx - 100.0).abs() < 1e-4);
        assert!((sy - 50.0).abs() < 1e-4);
    }

    #[test]
    fn preprocess_shape_and_padding() {
        let image = RgbImage::from_pixel(320, 240, image::Rgb([255, 255, 255]));
        let (tensor, lb) = preprocess(&image);

        assert_eq!(tensor.shape(), &[1, 3, DET_INPUT_SIZE, DET_INPUT_SIZE]);
        assert!((lb.scale - 2.0).abs() < 1e-6);

        // Padding rows above the image stay at the neutral value.
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        // Image center is bright: (255 - 127.5) / 128.
        let expected = (255.0 - DET_MEAN) / DET_STD;
        assert!((tensor[[0, 0, 320, 320]] - expected).abs() < 1e-6);
    }

    #[test]
    fn decode_stride_maps_offsets_to_source() {
        // Single anchor above threshold at stride 32, cell (1, 1).
        let cells = DET_INPUT_SIZE / 32;
        let anchors = cells * cells * DET_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let mut boxes = vec![0.0f32; anchors * 4];
        let points = vec![0.0f32; anchors * 10];

        let idx = (cells + 1) * DET_ANCHORS_PER_CELL; // cell (x=1, y=1), first anchor
        scores[idx] = 0.9;
        // One stride-unit in every direction: a 64x64 box centered on the anchor.
        boxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let mut out = Vec::new();
        decode_stride(&scores, &boxes, &points, 32, &lb, &mut out);

        assert_eq!(out.len(), 1);
        let face = &out[0];
        assert!((face.x - 0.0).abs() < 1e-4);
        assert!((face.y - 0.0).abs() < 1e-4);
        assert!((face.width - 64.0).abs() < 1e-4);
        assert!((face.height - 64.0).abs() < 1e-4);
        // Landmarks with zero offsets sit on the anchor center.
        assert!((face.landmarks[0].0 - 32.0).abs() < 1e-4);
        assert!((face.landmarks[0].1 - 32.0).abs() < 1e-4);
    }
}
