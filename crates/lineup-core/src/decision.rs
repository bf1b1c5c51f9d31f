//! Decision gate — ranked candidates to a single outcome.

use crate::types::{RejectReason, SimilarityCandidate, VerificationOutcome};

/// Convert a ranked candidate list into an accept/reject outcome.
///
/// Stateless: one call, one outcome. The threshold is re-checked against
/// the top candidate even when the search already filtered by it. Retry
/// policy ("let the user recapture") belongs to the caller.
pub fn decide(candidates: &[SimilarityCandidate], threshold: f32) -> VerificationOutcome {
    match candidates.first() {
        Some(top) if top.similarity >= threshold => {
            VerificationOutcome::accepted(top.owner_id.clone(), top.similarity)
        }
        Some(top) => VerificationOutcome::rejected(RejectReason::BelowThreshold, top.similarity),
        None => VerificationOutcome::rejected(RejectReason::BelowThreshold, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(owner: &str, similarity: f32, rank: usize) -> SimilarityCandidate {
        SimilarityCandidate {
            owner_id: owner.to_string(),
            similarity,
            rank,
        }
    }

    #[test]
    fn empty_list_rejects_below_threshold() {
        let outcome = decide(&[], 0.6);
        assert!(!outcome.accepted);
        assert_eq!(outcome.matched_owner, None);
        assert_eq!(outcome.reason, Some(RejectReason::BelowThreshold));
        assert_eq!(outcome.similarity, 0.0);
    }

    #[test]
    fn top_candidate_wins() {
        let candidates = vec![candidate("c-101", 0.82, 1), candidate("c-077", 0.64, 2)];
        let outcome = decide(&candidates, 0.6);
        assert!(outcome.accepted);
        assert_eq!(outcome.matched_owner.as_deref(), Some("c-101"));
        assert!((outcome.similarity - 0.82).abs() < 1e-6);
        assert_eq!(outcome.reason, None);
    }

    #[test]
    fn unfiltered_weak_top_is_still_rejected() {
        // Safety net: the gate does not trust the caller to have filtered.
        let candidates = vec![candidate("c-101", 0.41, 1)];
        let outcome = decide(&candidates, 0.6);
        assert!(!outcome.accepted);
        assert_eq!(outcome.reason, Some(RejectReason::BelowThreshold));
        assert!((outcome.similarity - 0.41).abs() < 1e-6);
    }

    #[test]
    fn threshold_boundary_accepts() {
        let candidates = vec![candidate("c-101", 0.6, 1)];
        assert!(decide(&candidates, 0.6).accepted);
    }
}
