//! Face alignment — similarity transform to the canonical crop.
//!
//! The embedder expects faces in a fixed 112×112 layout. Alignment fits
//! a 4-DOF similarity transform (scale, rotation, translation) from the
//! detected five landmarks to the canonical positions and warps the face
//! region through it.

use image::{Rgb, RgbImage};

/// Canonical five-landmark layout for a 112×112 aligned crop
/// (InsightFace convention: eyes, nose, mouth corners).
const CANONICAL_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

pub const ALIGNED_SIZE: u32 = 112;

/// Fit the similarity transform mapping `src` onto `dst` by closed-form
/// least squares over centered coordinates.
///
/// Returns `(a, b, tx, ty)` for the matrix
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn fit_similarity(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> (f32, f32, f32, f32) {
    let n = src.len() as f32;
    let (mut sx, mut sy, mut dx, mut dy) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for i in 0..src.len() {
        sx += src[i].0;
        sy += src[i].1;
        dx += dst[i].0;
        dy += dst[i].1;
    }
    let (msx, msy, mdx, mdy) = (sx / n, sy / n, dx / n, dy / n);

    let mut spread = 0.0f32;
    let mut along = 0.0f32;
    let mut across = 0.0f32;
    for i in 0..src.len() {
        let (ux, uy) = (src[i].0 - msx, src[i].1 - msy);
        let (vx, vy) = (dst[i].0 - mdx, dst[i].1 - mdy);
        spread += ux * ux + uy * uy;
        along += ux * vx + uy * vy;
        across += ux * vy - uy * vx;
    }

    if spread <= f32::EPSILON {
        // Degenerate landmarks (all coincident): translate only.
        return (1.0, 0.0, mdx - msx, mdy - msy);
    }

    let a = along / spread;
    let b = across / spread;
    let tx = mdx - a * msx + b * msy;
    let ty = mdy - b * msx - a * msy;
    (a, b, tx, ty)
}

/// Align a detected face to the canonical 112×112 crop.
///
/// Warps through the inverse transform with bilinear sampling per
/// channel; pixels outside the source frame come out black.
pub fn align_face(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let (a, b, tx, ty) = fit_similarity(landmarks, &CANONICAL_LANDMARKS);

    let det = a * a + b * b;
    if det <= f32::EPSILON {
        return RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    }
    let ia = a / det;
    let ib = b / det;

    let mut out = RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    for (ox, oy, pixel) in out.enumerate_pixels_mut() {
        let rx = ox as f32 - tx;
        let ry = oy as f32 - ty;
        let src_x = ia * rx + ib * ry;
        let src_y = -ib * rx + ia * ry;
        *pixel = sample_bilinear(image, src_x, src_y);
    }
    out
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let fetch = |xx: i64, yy: i64, c: usize| -> f32 {
        if xx >= 0 && yy >= 0 && (xx as u32) < image.width() && (yy as u32) < image.height() {
            image.get_pixel(xx as u32, yy as u32)[c] as f32
        } else {
            0.0
        }
    };

    let mut channels = [0u8; 3];
    for (c, value) in channels.iter_mut().enumerate() {
        let top = fetch(x0, y0, c) * (1.0 - fx) + fetch(x0 + 1, y0, c) * fx;
        let bottom = fetch(x0, y0 + 1, c) * (1.0 - fx) + fetch(x0 + 1, y0 + 1, c) * fx;
        *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(channels)
}
