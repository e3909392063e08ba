//! Similarity computation for embeddings.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::error::{EmbeddingError, Result};
use crate::index::{Embedded, Scored};

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical vectors
/// - 0.0 means orthogonal vectors
/// - -1.0 means opposite vectors
///
/// Similarity against a zero-magnitude vector is undefined; this returns 0.0
/// for that case rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot_product / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0))
}

/// Find the top-k candidates by cosine similarity to `query`.
///
/// Only candidates scoring strictly above `min_similarity` are kept. The
/// result is ordered by similarity descending; equal scores keep candidate
/// order. Candidates whose dimension differs from the query are skipped.
pub fn find_top_k<'a, T, I>(
    query: &[f32],
    candidates: I,
    k: usize,
    min_similarity: f32,
) -> Vec<Scored<&'a T>>
where
    T: Embedded + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut scored: Vec<Scored<&'a T>> = Vec::new();

    for candidate in candidates {
        match cosine_similarity(query, candidate.embedding()) {
            Ok(similarity) if similarity > min_similarity => scored.push(Scored {
                item: candidate,
                similarity,
            }),
            Ok(_) => {}
            Err(e) => debug!("Skipping candidate: {e}"),
        }
    }

    // Stable sort, so ties stay in candidate order.
    scored.sort_by_key(|s| Reverse(OrderedFloat(s.similarity)));
    scored.truncate(k);
    scored
}
