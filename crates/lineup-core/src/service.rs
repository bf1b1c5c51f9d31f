//! Recognition service — the single reusable enrollment/verification
//! interface.
//!
//! Consolidates the capture → extract → compare flow behind one type,
//! generic over the model boundary and the store boundary. Thresholds
//! are explicit parameters at every call site; nothing here hardcodes a
//! policy.

use crate::decision::decide;
use crate::extract::{ExtractError, Extractor};
use crate::search::search;
use crate::store::{DescriptorStore, StoreError};
use crate::types::{
    validate_vector, DescriptorError, DescriptorRecord, NewDescriptor, RejectReason,
    SimilarityCandidate, VerificationOutcome,
};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    /// The face is already enrolled under a different identity.
    #[error("face already enrolled for '{existing_owner}' (similarity {similarity:.3})")]
    DuplicateIdentity {
        existing_owner: String,
        similarity: f32,
    },
}

#[derive(Debug, Clone, Default)]
pub struct EnrollOptions {
    /// Deactivate the owner's previous descriptors before writing.
    pub replace: bool,
    pub source_image: Option<String>,
    /// Reject enrollment when the face matches a *different* owner at or
    /// above this similarity.
    pub duplicate_threshold: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct EnrollOutcome {
    pub descriptor_id: String,
    pub owner_id: String,
    /// Previous descriptors deactivated by `replace`.
    pub deactivated: u64,
}

pub struct RecognitionService<X, S> {
    extractor: X,
    store: S,
}

impl<X: Extractor, S: DescriptorStore> RecognitionService<X, S> {
    pub fn new(extractor: X, store: S) -> Self {
        Self { extractor, store }
    }

    /// Enroll a face for `owner_id`.
    ///
    /// A no-face extraction is terminal here — enrollment never stores a
    /// placeholder vector.
    pub async fn enroll(
        &self,
        owner_id: &str,
        image: RgbImage,
        opts: EnrollOptions,
    ) -> Result<EnrollOutcome, ServiceError> {
        let vector = self.extractor.extract(image).await?;
        validate_vector(&vector)?;

        if let Some(threshold) = opts.duplicate_threshold {
            let others: Vec<DescriptorRecord> = self
                .store
                .read_all_active()
                .await?
                .into_iter()
                .filter(|record| record.owner_id != owner_id)
                .collect();
            if let Some(hit) = search(&vector, &others, threshold, 1).into_iter().next() {
                tracing::warn!(
                    owner = owner_id,
                    existing = %hit.owner_id,
                    similarity = hit.similarity,
                    "enrollment rejected: face already enrolled elsewhere"
                );
                return Err(ServiceError::DuplicateIdentity {
                    existing_owner: hit.owner_id,
                    similarity: hit.similarity,
                });
            }
        }

        let deactivated = if opts.replace {
            self.store.deactivate(owner_id).await?
        } else {
            0
        };

        let descriptor_id = self
            .store
            .write(NewDescriptor {
                owner_id: owner_id.to_string(),
                vector,
                source_image: opts.source_image,
            })
            .await?;

        tracing::info!(owner = owner_id, id = %descriptor_id, deactivated, "descriptor enrolled");
        Ok(EnrollOutcome {
            descriptor_id,
            owner_id: owner_id.to_string(),
            deactivated,
        })
    }

    /// One verification attempt: extract, search, decide.
    ///
    /// A no-face extraction becomes a rejected outcome and never reaches
    /// the store. An unavailable store is an error — never folded into a
    /// silent reject, which would be indistinguishable from a genuine
    /// no-match.
    pub async fn verify(
        &self,
        image: RgbImage,
        threshold: f32,
        limit: usize,
    ) -> Result<VerificationOutcome, ServiceError> {
        let vector = match self.extractor.extract(image).await {
            Ok(vector) => vector,
            Err(ExtractError::NoFaceDetected) => {
                return Ok(VerificationOutcome::rejected(RejectReason::NoFaceDetected, 0.0));
            }
            Err(e) => return Err(e.into()),
        };
        validate_vector(&vector)?;

        let gallery = self.store.read_all_active().await?;
        if gallery.is_empty() {
            return Ok(VerificationOutcome::rejected(
                RejectReason::NoEnrolledDescriptors,
                0.0,
            ));
        }

        let candidates = search(&vector, &gallery, threshold, limit);
        let outcome = decide(&candidates, threshold);
        tracing::info!(
            accepted = outcome.accepted,
            similarity = outcome.similarity,
            gallery = gallery.len(),
            "verification decided"
        );
        Ok(outcome)
    }

    /// Watchlist identification: the ranked candidate list for the
    /// caller to act on. A no-face extraction is an error here — there
    /// is nothing to rank.
    pub async fn identify(
        &self,
        image: RgbImage,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarityCandidate>, ServiceError> {
        let vector = self.extractor.extract(image).await?;
        validate_vector(&vector)?;

        let gallery = self.store.read_all_active().await?;
        let candidates = search(&vector, &gallery, threshold, limit);
        tracing::info!(hits = candidates.len(), gallery = gallery.len(), "identification ranked");
        Ok(candidates)
    }

    /// Deactivate all of an owner's descriptors.
    pub async fn deactivate(&self, owner_id: &str) -> Result<u64, ServiceError> {
        let flipped = self.store.deactivate(owner_id).await?;
        tracing::info!(owner = owner_id, flipped, "descriptors deactivated");
        Ok(flipped)
    }

    /// Active roster metadata (vectors included; callers expose only
    /// what their surface needs).
    pub async fn roster(&self) -> Result<Vec<DescriptorRecord>, ServiceError> {
        Ok(self.store.read_all_active().await?)
    }
}
