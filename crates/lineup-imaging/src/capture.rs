//! Live-capture sessions with guaranteed device release.
//!
//! A `CaptureSession` wraps a `FrameSource` and releases it on every
//! exit path — explicit stop, grab failure, or drop — so a cancelled or
//! failed capture can never leave the device held.

use crate::normalize::{normalize, AcquisitionError, NormalizeOptions, NormalizedImage};

/// A device or stream that yields encoded image frames.
pub trait FrameSource {
    /// Grab the next encoded frame.
    fn next_frame(&mut self) -> Result<Vec<u8>, AcquisitionError>;

    /// Release the underlying device. Must be idempotent.
    fn release(&mut self);
}

/// One acquisition attempt over a frame source.
pub struct CaptureSession<S: FrameSource> {
    source: S,
    opts: NormalizeOptions,
    released: bool,
}

impl<S: FrameSource> CaptureSession<S> {
    pub fn start(source: S, opts: NormalizeOptions) -> Self {
        Self {
            source,
            opts,
            released: false,
        }
    }

    /// Grab one frame and normalize it.
    ///
    /// Any failure releases the source before returning: acquisition
    /// errors are terminal for the attempt and are never retried here.
    pub fn grab(&mut self) -> Result<NormalizedImage, AcquisitionError> {
        if self.released {
            return Err(AcquisitionError::SessionReleased);
        }

        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.release_now();
                return Err(e);
            }
        };

        match normalize(&frame, self.opts) {
            Ok(image) => Ok(image),
            Err(e) => {
                self.release_now();
                Err(e)
            }
        }
    }

    /// Stop the session, releasing the source (user cancellation path).
    pub fn stop(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if !self.released {
            self.released = true;
            self.source.release();
            tracing::debug!("frame source released");
        }
    }
}

impl<S: FrameSource> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        self.release_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeSource {
        frames: Vec<Result<Vec<u8>, AcquisitionError>>,
        released: Arc<AtomicUsize>,
    }

    impl FrameSource for FakeSource {
        fn next_frame(&mut self) -> Result<Vec<u8>, AcquisitionError> {
            self.frames.remove(0)
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn encoded_frame() -> Vec<u8> {
        let img = RgbImage::from_pixel(32, 32, image::Rgb([90, 90, 90]));
        let mut out = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn stop_releases_exactly_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let source = FakeSource {
            frames: vec![Ok(encoded_frame())],
            released: released.clone(),
        };

        let mut session = CaptureSession::start(source, NormalizeOptions::default());
        session.grab().unwrap();
        session.stop();

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_the_source() {
        let released = Arc::new(AtomicUsize::new(0));
        let source = FakeSource {
            frames: vec![],
            released: released.clone(),
        };

        let session = CaptureSession::start(source, NormalizeOptions::default());
        drop(session);

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn source_failure_releases_before_returning() {
        let released = Arc::new(AtomicUsize::new(0));
        let source = FakeSource {
            frames: vec![Err(AcquisitionError::SourceFailed("permission denied".into()))],
            released: released.clone(),
        };

        let mut session = CaptureSession::start(source, NormalizeOptions::default());
        let result = session.grab();

        assert!(matches!(result, Err(AcquisitionError::SourceFailed(_))));
        assert_eq!(released.load(Ordering::SeqCst), 1);

        // A grab after release reports the session as dead, not a fresh capture.
        assert!(matches!(
            session.grab(),
            Err(AcquisitionError::SessionReleased)
        ));
    }

    #[test]
    fn undecodable_frame_releases_before_returning() {
        let released = Arc::new(AtomicUsize::new(0));
        let source = FakeSource {
            frames: vec![Ok(b"garbage".to_vec())],
            released: released.clone(),
        };

        let mut session = CaptureSession::start(source, NormalizeOptions::default());
        let result = session.grab();

        assert!(matches!(result, Err(AcquisitionError::Undecodable(_))));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
