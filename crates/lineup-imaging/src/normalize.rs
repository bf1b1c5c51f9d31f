//! Capture normalization — decode, dimension capping, JPEG re-encode.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use thiserror::Error;

/// Default dimension cap for normalized captures.
pub const DEFAULT_MAX_WIDTH: u32 = 800;
pub const DEFAULT_MAX_HEIGHT: u32 = 600;
/// Default JPEG quality factor for the transport form.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("image could not be decoded: {0}")]
    Undecodable(String),
    #[error("image re-encode failed: {0}")]
    EncodeFailed(String),
    #[error("transport payload is not valid base64: {0}")]
    BadTransportEncoding(String),
    #[error("frame source failed: {0}")]
    SourceFailed(String),
    #[error("capture session already released")]
    SessionReleased,
}

/// Normalization parameters, overridable per deployment.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// A decoded capture with its bounded transport form.
pub struct NormalizedImage {
    /// Decoded pixels, dimensions within the configured cap.
    pub image: RgbImage,
    /// JPEG re-encode of `image` at the configured quality.
    pub jpeg: Vec<u8>,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Base64 transport form of the JPEG bytes.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.jpeg)
    }
}

/// Normalize a raw capture (uploaded file or encoded camera frame).
///
/// Decodes the buffer, downscales so neither dimension exceeds the cap
/// (aspect ratio preserved), and re-encodes as JPEG to bound the payload
/// for transport. Images already within the cap are still re-encoded.
pub fn normalize(bytes: &[u8], opts: NormalizeOptions) -> Result<NormalizedImage, AcquisitionError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| AcquisitionError::Undecodable(e.to_string()))?;

    let (orig_w, orig_h) = (decoded.width(), decoded.height());
    let image = downscale(decoded, opts.max_width, opts.max_height);
    if image.width() != orig_w {
        tracing::debug!(
            from = format!("{orig_w}x{orig_h}"),
            to = format!("{}x{}", image.width(), image.height()),
            "capture downscaled"
        );
    }

    let jpeg = encode_jpeg(&image, opts.jpeg_quality)?;
    Ok(NormalizedImage { image, jpeg })
}

/// Decode the transport form of an image: bare base64, or a
/// `data:image/...;base64,` URL as produced by canvas captures.
pub fn decode_transport(payload: &str) -> Result<Vec<u8>, AcquisitionError> {
    let b64 = match payload.split_once(";base64,") {
        Some((head, rest)) if head.starts_with("data:") => rest,
        _ => payload,
    };
    BASE64
        .decode(b64.trim())
        .map_err(|e| AcquisitionError::BadTransportEncoding(e.to_string()))
}

fn downscale(img: DynamicImage, max_width: u32, max_height: u32) -> RgbImage {
    if img.width() <= max_width && img.height() <= max_height {
        return img.into_rgb8();
    }
    // `resize` fits within the bounds preserving aspect ratio.
    img.resize(max_width, max_height, FilterType::Triangle)
        .into_rgb8()
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, AcquisitionError> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(image)
        .map_err(|e| AcquisitionError::EncodeFailed(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut out = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn oversized_capture_is_capped() {
        let bytes = png_bytes(4000, 3000);
        let norm = normalize(&bytes, NormalizeOptions::default()).unwrap();
        assert!(norm.width() <= 800, "width {} exceeds cap", norm.width());
        assert!(norm.height() <= 600, "height {} exceeds cap", norm.height());

        // Aspect ratio preserved within rounding.
        let ratio = norm.width() as f32 / norm.height() as f32;
        assert!((ratio - 4.0 / 3.0).abs() < 0.02, "ratio {ratio}");
    }

    #[test]
    fn small_capture_keeps_dimensions() {
        let bytes = png_bytes(320, 240);
        let norm = normalize(&bytes, NormalizeOptions::default()).unwrap();
        assert_eq!(norm.width(), 320);
        assert_eq!(norm.height(), 240);
    }

    #[test]
    fn transport_form_is_bounded() {
        let bytes = png_bytes(1600, 1200);
        let norm = normalize(&bytes, NormalizeOptions::default()).unwrap();
        let raw_size = (norm.width() * norm.height() * 3) as usize;
        assert!(
            norm.jpeg.len() < raw_size,
            "jpeg {} not smaller than raw {raw_size}",
            norm.jpeg.len()
        );
    }

    #[test]
    fn garbage_input_is_an_acquisition_error() {
        let result = normalize(b"not an image at all", NormalizeOptions::default());
        assert!(matches!(result, Err(AcquisitionError::Undecodable(_))));
    }

    #[test]
    fn transport_roundtrip() {
        let bytes = png_bytes(64, 64);
        let norm = normalize(&bytes, NormalizeOptions::default()).unwrap();
        let decoded = decode_transport(&norm.to_base64()).unwrap();
        assert_eq!(decoded, norm.jpeg);
    }

    #[test]
    fn transport_accepts_data_urls() {
        let payload = format!("data:image/jpeg;base64,{}", BASE64.encode(b"hello"));
        assert_eq!(decode_transport(&payload).unwrap(), b"hello");
    }

    #[test]
    fn transport_rejects_bad_base64() {
        let result = decode_transport("@@not-base64@@");
        assert!(matches!(
            result,
            Err(AcquisitionError::BadTransportEncoding(_))
        ));
    }
}
