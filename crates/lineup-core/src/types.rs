use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed length of every face descriptor vector.
pub const DESCRIPTOR_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("descriptor has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("descriptor value at index {index} is not finite")]
    NonFinite { index: usize },
}

/// Validate descriptor shape: exactly [`DESCRIPTOR_DIM`] finite floats.
///
/// Applied at construction and again at every ingress from storage —
/// stored rows are not trusted to still be well-formed.
pub fn validate_vector(vector: &[f32]) -> Result<(), DescriptorError> {
    if vector.len() != DESCRIPTOR_DIM {
        return Err(DescriptorError::DimensionMismatch {
            expected: DESCRIPTOR_DIM,
            actual: vector.len(),
        });
    }
    if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
        return Err(DescriptorError::NonFinite { index });
    }
    Ok(())
}

/// A stored face descriptor with lifecycle metadata.
///
/// Only `active` is ever mutated after creation; re-enrollment and
/// removal deactivate rather than delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceDescriptor {
    pub id: String,
    pub owner_id: String,
    pub vector: Vec<f32>,
    pub captured_at: DateTime<Utc>,
    pub active: bool,
    pub source_image: Option<String>,
}

/// Input for a store write; id and timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewDescriptor {
    pub owner_id: String,
    pub vector: Vec<f32>,
    pub source_image: Option<String>,
}

/// An active descriptor row as returned by the store.
#[derive(Debug, Clone)]
pub struct DescriptorRecord {
    pub id: String,
    pub owner_id: String,
    pub vector: Vec<f32>,
    pub captured_at: DateTime<Utc>,
    pub source_image: Option<String>,
}

/// One ranked hit from a similarity search. Computed per call, never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityCandidate {
    pub owner_id: String,
    /// Cosine similarity in [-1, 1].
    pub similarity: f32,
    /// 1-based position after the descending sort.
    pub rank: usize,
}

/// Why a verification attempt was rejected. Each class maps to a
/// different user-facing message and corrective action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoFaceDetected,
    BelowThreshold,
    NoEnrolledDescriptors,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            RejectReason::NoFaceDetected => "no face detected",
            RejectReason::BelowThreshold => "below threshold",
            RejectReason::NoEnrolledDescriptors => "no enrolled descriptors",
        };
        f.write_str(text)
    }
}

/// Outcome of one verification attempt.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub accepted: bool,
    /// Present only when accepted.
    pub matched_owner: Option<String>,
    /// Similarity of the best match, 0.0 when nothing was compared.
    pub similarity: f32,
    pub reason: Option<RejectReason>,
}

impl VerificationOutcome {
    pub fn accepted(owner_id: String, similarity: f32) -> Self {
        Self {
            accepted: true,
            matched_owner: Some(owner_id),
            similarity,
            reason: None,
        }
    }

    pub fn rejected(reason: RejectReason, similarity: f32) -> Self {
        Self {
            accepted: false,
            matched_owner: None,
            similarity,
            reason: Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_well_formed_vector() {
        let v = vec![0.5f32; DESCRIPTOR_DIM];
        assert!(validate_vector(&v).is_ok());
    }

    #[test]
    fn validate_rejects_wrong_length() {
        let v = vec![0.5f32; 64];
        assert!(matches!(
            validate_vector(&v),
            Err(DescriptorError::DimensionMismatch {
                expected: DESCRIPTOR_DIM,
                actual: 64
            })
        ));
    }

    #[test]
    fn validate_rejects_nan_and_infinity() {
        let mut v = vec![0.0f32; DESCRIPTOR_DIM];
        v[7] = f32::NAN;
        assert!(matches!(
            validate_vector(&v),
            Err(DescriptorError::NonFinite { index: 7 })
        ));

        v[7] = f32::INFINITY;
        assert!(matches!(
            validate_vector(&v),
            Err(DescriptorError::NonFinite { index: 7 })
        ));
    }

    #[test]
    fn reject_reasons_have_distinct_messages() {
        assert_eq!(RejectReason::NoFaceDetected.to_string(), "no face detected");
        assert_eq!(RejectReason::BelowThreshold.to_string(), "below threshold");
        assert_eq!(
            RejectReason::NoEnrolledDescriptors.to_string(),
            "no enrolled descriptors"
        );
    }
}
