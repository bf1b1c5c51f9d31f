//! lineup-core — Face descriptor extraction, similarity search and
//! decision gating.
//!
//! Detection and embedding run via ONNX Runtime against external
//! pretrained models; search is a brute-force cosine scan over the
//! active descriptor roster; the decision gate turns ranked candidates
//! into a single accept/reject outcome.

pub mod align;
pub mod decision;
pub mod detect;
pub mod embed;
pub mod extract;
pub mod search;
pub mod service;
pub mod store;
pub mod types;

pub use decision::decide;
pub use extract::{ExtractError, Extractor, OnnxExtractor};
pub use search::{cosine_similarity, search};
pub use service::{EnrollOptions, EnrollOutcome, RecognitionService, ServiceError};
pub use store::{DescriptorStore, MemoryStore, StoreError};
pub use types::{
    validate_vector, DescriptorError, DescriptorRecord, FaceDescriptor, NewDescriptor,
    RejectReason, SimilarityCandidate, VerificationOutcome, DESCRIPTOR_DIM,
};
