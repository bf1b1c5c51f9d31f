//! lineup-imaging — Image acquisition and normalization.
//!
//! Turns camera frames and uploaded files into bounded, compressed
//! images ready for descriptor extraction, and provides the base64
//! transport codec used between clients and the service.

pub mod capture;
pub mod normalize;

pub use capture::{CaptureSession, FrameSource};
pub use normalize::{
    decode_transport, normalize, AcquisitionError, NormalizeOptions, NormalizedImage,
};
