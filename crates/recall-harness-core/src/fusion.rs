//! Reciprocal Rank Fusion of the lexical and vector rankings.
//!
//! ```text
//! rrf(d) = Σ_list weight_list / (k + rank_list(d) + 1)
//! ```
//!
//! A fragment found by both scorers accumulates both contributions and is
//! tagged [`Provenance::Hybrid`]. Scores are then divided by the best
//! attainable score, `Σ weight_list / (k + 1)` over the non-empty lists, so
//! the fused score lands in `[0, 1]` and the per-type boosts applied later
//! have a stable scale.
//!
//! When the vector list is empty the lexical ranking is passed through in
//! its original order and the result is marked lexical-only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::models::{Fragment, Provenance, ScoredFragment};
use crate::params::RrfParams;

/// A candidate after fusion.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub fragment: Arc<Fragment>,
    /// Raw weighted RRF sum.
    pub rrf_score: f64,
    /// `rrf_score` divided by the best attainable score, in `[0, 1]`.
    pub fused_score: f64,
    pub provenance: Provenance,
    pub lexical_rank: Option<usize>,
    pub vector_rank: Option<usize>,
}

/// Fused ranking plus whether it came from the lexical list alone.
#[derive(Debug, Clone, Default)]
pub struct Fusion {
    pub candidates: Vec<FusedCandidate>,
    pub lexical_only: bool,
}

/// Fuse two ranked lists. Each list is expected to be sorted with `rank`
/// set to the 0-based position.
pub fn fuse(lexical: &[ScoredFragment], vector: &[ScoredFragment], params: &RrfParams) -> Fusion {
    if vector.is_empty() {
        return pass_through(lexical, params);
    }

    let mut order: Vec<FusedCandidate> = Vec::with_capacity(lexical.len() + vector.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for item in lexical {
        let contribution = params.lexical_weight / (params.k + item.rank as f64 + 1.0);
        let pos = *positions
            .entry(item.fragment.id.clone())
            .or_insert_with(|| {
                order.push(empty_candidate(&item.fragment));
                order.len() - 1
            });
        let cand = &mut order[pos];
        cand.rrf_score += contribution;
        cand.lexical_rank = Some(cand.lexical_rank.map_or(item.rank, |r| r.min(item.rank)));
    }

    for item in vector {
        let contribution = params.vector_weight / (params.k + item.rank as f64 + 1.0);
        let pos = *positions
            .entry(item.fragment.id.clone())
            .or_insert_with(|| {
                order.push(empty_candidate(&item.fragment));
                order.len() - 1
            });
        let cand = &mut order[pos];
        cand.rrf_score += contribution;
        cand.vector_rank = Some(cand.vector_rank.map_or(item.rank, |r| r.min(item.rank)));
    }

    let mut best = 0.0;
    if !lexical.is_empty() {
        best += params.lexical_weight / (params.k + 1.0);
    }
    best += params.vector_weight / (params.k + 1.0);

    for cand in &mut order {
        cand.provenance = match (cand.lexical_rank, cand.vector_rank) {
            (Some(_), Some(_)) => Provenance::Hybrid,
            (Some(_), None) => Provenance::Lexical,
            _ => Provenance::Vector,
        };
        cand.fused_score = if best > 0.0 {
            (cand.rrf_score / best).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    sort_candidates(&mut order);

    Fusion {
        candidates: order,
        lexical_only: false,
    }
}

fn pass_through(lexical: &[ScoredFragment], params: &RrfParams) -> Fusion {
    let mut seen: HashSet<&str> = HashSet::new();
    let candidates = lexical
        .iter()
        .filter(|item| seen.insert(item.fragment.id.as_str()))
        .map(|item| {
            let denom = params.k + item.rank as f64 + 1.0;
            FusedCandidate {
                fragment: Arc::clone(&item.fragment),
                rrf_score: params.lexical_weight / denom,
                fused_score: (params.k + 1.0) / denom,
                provenance: Provenance::Lexical,
                lexical_rank: Some(item.rank),
                vector_rank: None,
            }
        })
        .collect();

    Fusion {
        candidates,
        lexical_only: true,
    }
}

fn empty_candidate(fragment: &Arc<Fragment>) -> FusedCandidate {
    FusedCandidate {
        fragment: Arc::clone(fragment),
        rrf_score: 0.0,
        fused_score: 0.0,
        provenance: Provenance::Lexical,
        lexical_rank: None,
        vector_rank: None,
    }
}

/// Sort by fused score (desc), salience (desc), id (asc).
pub fn sort_candidates(candidates: &mut [FusedCandidate]) {
    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.fragment
                    .salience
                    .partial_cmp(&a.fragment.salience)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.fragment.id.cmp(&b.fragment.id))
    });
}

/// Min-max normalize raw scores to `[0.0, 1.0]`.
///
/// If all scores are equal, they are normalized to `1.0`.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let s_min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    scores
        .iter()
        .map(|&s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}
