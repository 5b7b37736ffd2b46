//! Maximal-marginal-relevance selection and the query-kind λ policy.
//!
//! Starting from the most relevant candidate, MMR repeatedly picks
//!
//! ```text
//! argmax  (1 - λ) · relevance(d) + λ · (1 - mean_sim(d, selected))
//! ```
//!
//! where `relevance` is the min-max normalized boosted score and
//! similarity is embedding cosine when both fragments carry compatible
//! vectors, token Jaccard overlap otherwise. `λ = 0` reproduces relevance
//! order; `λ = 1` picks purely for dissimilarity.

use std::collections::HashSet;

use crate::classify::BoostedCandidate;
use crate::fusion::normalize_scores;
use crate::models::Fragment;
use crate::tokenize::{jaccard, token_set};
use crate::vector::cosine_similarity;

/// Coarse query intent used to pick λ when the caller gives none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Factual,
    Definition,
    Comparison,
    Analysis,
    General,
}

const COMPARISON_CUES: &[&str] = &[
    " vs ", " vs. ", "versus", "compare", "comparison", "difference between", "differ",
    "better than", "pros and cons", "trade-off", "tradeoff",
];
const ANALYSIS_PREFIXES: &[&str] = &[
    "why", "analyze", "analyse", "explain", "evaluate", "assess", "how does", "how do",
];
const ANALYSIS_CUES: &[&str] = &["implications", "impact of", "root cause", "reasoning behind"];
const DEFINITION_PREFIXES: &[&str] = &[
    "what is", "what are", "what's", "define", "definition of", "meaning of",
];
const FACTUAL_PREFIXES: &[&str] = &[
    "who", "when", "where", "which", "how many", "how much", "what", "list", "is ", "does ",
];

/// Infer the query kind from cue words. Comparison cues win over analysis,
/// analysis over definition, definition over plain factual lookups.
pub fn classify_query(query: &str) -> QueryKind {
    let q = format!(" {} ", query.trim().to_lowercase());
    let head = q.trim_start();

    if COMPARISON_CUES.iter().any(|cue| q.contains(cue)) {
        QueryKind::Comparison
    } else if ANALYSIS_PREFIXES.iter().any(|p| head.starts_with(p))
        || ANALYSIS_CUES.iter().any(|cue| q.contains(cue))
    {
        QueryKind::Analysis
    } else if DEFINITION_PREFIXES.iter().any(|p| head.starts_with(p)) {
        QueryKind::Definition
    } else if FACTUAL_PREFIXES.iter().any(|p| head.starts_with(p)) {
        QueryKind::Factual
    } else {
        QueryKind::General
    }
}

/// Drop later occurrences of an id; first occurrence wins.
pub fn dedup_by_id(candidates: Vec<BoostedCandidate>) -> Vec<BoostedCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.candidate.fragment.id.clone()))
        .collect()
}

/// Pairwise similarity in `[0, 1]`: cosine for two compatible embeddings,
/// otherwise Jaccard over the given term sets.
pub fn fragment_similarity(
    a: &Fragment,
    b: &Fragment,
    a_terms: &HashSet<String>,
    b_terms: &HashSet<String>,
) -> f64 {
    match (a.embedding.as_deref(), b.embedding.as_deref()) {
        (Some(va), Some(vb)) if va.len() == vb.len() && !va.is_empty() => {
            (cosine_similarity(va, vb) as f64).clamp(0.0, 1.0)
        }
        _ => jaccard(a_terms, b_terms),
    }
}

/// Select up to `k` candidates by MMR. Input order is the relevance order
/// used for tie-breaking; output is in selection order.
pub fn mmr_select(candidates: &[BoostedCandidate], k: usize, lambda: f64) -> Vec<BoostedCandidate> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let raw: Vec<f64> = candidates.iter().map(|c| c.score).collect();
    let relevance = normalize_scores(&raw);
    let terms: Vec<HashSet<String>> = candidates
        .iter()
        .map(|c| token_set(&c.candidate.fragment.text))
        .collect();

    let n = candidates.len();
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(n));
    let mut remaining: Vec<usize> = (0..n).collect();
    // sim_sum[i] = Σ similarity(i, s) over selected s
    let mut sim_sum = vec![0.0f64; n];

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0usize;
        let mut best_score = f64::NEG_INFINITY;
        for (pos, &i) in remaining.iter().enumerate() {
            let score = if selected.is_empty() {
                relevance[i]
            } else {
                let mean_sim = sim_sum[i] / selected.len() as f64;
                (1.0 - lambda) * relevance[i] + lambda * (1.0 - mean_sim)
            };
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        let chosen = remaining.remove(best_pos);
        selected.push(chosen);
        let chosen_fragment = &candidates[chosen].candidate.fragment;
        for &i in &remaining {
            sim_sum[i] += fragment_similarity(
                &candidates[i].candidate.fragment,
                chosen_fragment,
                &terms[i],
                &terms[chosen],
            );
        }
    }

    selected.into_iter().map(|i| candidates[i].clone()).collect()
}
