//! Brute-force cosine similarity search over the active roster.

use crate::types::{DescriptorRecord, SimilarityCandidate, DESCRIPTOR_DIM};

/// Cosine similarity between two vectors, in [-1, 1].
///
/// If either vector has zero magnitude the similarity is defined as 0.0
/// — never a division by zero, never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

/// Rank every gallery record against the query.
///
/// Linear scan over all records — no index structure. Acceptable for a
/// department roster (hundreds to low thousands of descriptors); a
/// scalability ceiling beyond that.
///
/// Records whose vector is not [`DESCRIPTOR_DIM`] long are skipped with
/// a warning; one malformed row never fails the whole scan. Equal scores
/// keep encounter order (the sort is stable, no secondary key exists).
pub fn search(
    query: &[f32],
    gallery: &[DescriptorRecord],
    threshold: f32,
    limit: usize,
) -> Vec<SimilarityCandidate> {
    let mut scored: Vec<(usize, f32)> = Vec::with_capacity(gallery.len());

    for (idx, record) in gallery.iter().enumerate() {
        if record.vector.len() != DESCRIPTOR_DIM {
            tracing::warn!(
                id = %record.id,
                owner = %record.owner_id,
                len = record.vector.len(),
                "skipping descriptor with wrong dimension"
            );
            continue;
        }
        scored.push((idx, cosine_similarity(query, &record.vector)));
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .filter(|(_, similarity)| *similarity >= threshold)
        .take(limit)
        .enumerate()
        .map(|(i, (idx, similarity))| SimilarityCandidate {
            owner_id: gallery[idx].owner_id.clone(),
            similarity,
            rank: i + 1,
        })
        .collect()
}
