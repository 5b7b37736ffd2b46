//! Vector scorer and similarity utilities.
//!
//! Ranks fragments by cosine similarity between the query embedding and
//! each fragment's stored embedding. Fragments without an embedding are
//! scored by a shared-token Jaccard overlap with the query instead of being
//! dropped, so partial embedding coverage degrades ranking quality rather
//! than silently losing candidates.
//!
//! Embeddings are produced by an external service; nothing here generates them.

use std::collections::HashSet;
use std::sync::Arc;

use crate::models::{Fragment, ScoredFragment};
use crate::tokenize::{jaccard, token_set};

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine similarity of two optional vectors; `0.0` when either is absent.
pub fn optional_cosine(a: Option<&[f32]>, b: Option<&[f32]>) -> f32 {
    match (a, b) {
        (Some(a), Some(b)) => cosine_similarity(a, b),
        _ => 0.0,
    }
}

/// Output of [`rank_by_vector`].
#[derive(Debug, Default)]
pub struct VectorRanking {
    pub ranked: Vec<ScoredFragment>,
    /// Ranked fragments scored by embedding cosine similarity.
    pub embedded: usize,
    /// Ranked fragments scored by the token-overlap fallback.
    pub fallback: usize,
}

/// Rank fragments against a query embedding.
///
/// A fragment is scored by cosine similarity when its embedding has the
/// query's dimensionality, otherwise by Jaccard overlap between query and
/// fragment terms. `similarity` is the score clipped to `[0, 1]`.
pub fn rank_by_vector<'a, I>(query: &str, query_vec: &[f32], fragments: I, limit: usize) -> VectorRanking
where
    I: IntoIterator<Item = &'a Arc<Fragment>>,
{
    let query_terms = token_set(query);

    let mut scored: Vec<(Arc<Fragment>, f64, bool)> = fragments
        .into_iter()
        .map(|fragment| match fragment.embedding.as_deref() {
            Some(v) if v.len() == query_vec.len() && !v.is_empty() => (
                Arc::clone(fragment),
                cosine_similarity(query_vec, v) as f64,
                true,
            ),
            _ => (
                Arc::clone(fragment),
                overlap_score(&query_terms, &fragment.text),
                false,
            ),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.0.salience
                    .partial_cmp(&a.0.salience)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.0.id.cmp(&b.0.id))
    });
    scored.truncate(limit);

    let embedded = scored.iter().filter(|(_, _, by_cosine)| *by_cosine).count();
    VectorRanking {
        fallback: scored.len() - embedded,
        embedded,
        ranked: scored
            .into_iter()
            .enumerate()
            .map(|(rank, (fragment, score, _))| ScoredFragment {
                fragment,
                score,
                similarity: score.clamp(0.0, 1.0),
                rank,
            })
            .collect(),
    }
}

/// Coarse lexical stand-in for a missing embedding.
pub fn overlap_score(query_terms: &HashSet<String>, text: &str) -> f64 {
    jaccard(query_terms, &token_set(text))
}
