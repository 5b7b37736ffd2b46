//! The synchronous ranking pipeline.
//!
//! [`rank_facts`] runs every stage for one query against one index
//! snapshot: BM25 and vector scoring, fusion, document-type boosts, quota
//! admission, MMR, compression, and budget fitting. All intermediate state
//! is local to the call.
//!
//! Quota admission fills a pool of [`RetrievalParams::mmr_pool_size`]
//! candidates and MMR picks the final `k` from it, so λ decides which
//! near-duplicates are dropped, not just their order.
//!
//! Callers that obtain the query embedding concurrently with lexical
//! scoring can split the work with [`check_request`], [`lexical_candidates`],
//! and [`rank_from_lexical`].

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::budget::fit_to_budget;
use crate::classify::{apply_boosts, select_with_quotas, BoostedCandidate};
use crate::compress::compress;
use crate::diversity::{classify_query, dedup_by_id, mmr_select};
use crate::error::{RetrievalError, RetrievalResult};
use crate::fusion::{fuse, FusedCandidate, Fusion};
use crate::lexical::LexicalIndex;
use crate::models::{
    DegradationFlags, FactExplanation, FactRecord, Fragment, Provenance, Retrieval, RetrievalMode,
    RetrievalStats, ScoredFragment,
};
use crate::params::RetrievalParams;
use crate::vector::{rank_by_vector, VectorRanking};

/// Per-call inputs besides the index and parameters.
#[derive(Debug, Clone, Copy)]
pub struct RankInput<'a> {
    pub query: &'a str,
    /// Query embedding, if one was obtained.
    pub query_vec: Option<&'a [f32]>,
    /// Restrict retrieval to these fragment ids.
    pub scope: Option<&'a HashSet<String>>,
    /// Attach a [`FactExplanation`] to every fact.
    pub explain: bool,
}

impl<'a> RankInput<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            query_vec: None,
            scope: None,
            explain: false,
        }
    }

    pub fn with_vector(mut self, query_vec: &'a [f32]) -> Self {
        self.query_vec = Some(query_vec);
        self
    }

    pub fn with_scope(mut self, scope: &'a HashSet<String>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }
}

/// Reject empty queries and out-of-range parameters.
pub fn check_request(query: &str, params: &RetrievalParams) -> RetrievalResult<()> {
    if query.trim().is_empty() {
        return Err(RetrievalError::EmptyQuery);
    }
    params.validate()
}

/// BM25 stage on its own.
pub fn lexical_candidates(
    index: &LexicalIndex,
    query: &str,
    scope: Option<&HashSet<String>>,
    params: &RetrievalParams,
) -> Vec<ScoredFragment> {
    index.search(query, &params.bm25, params.candidate_k, scope)
}

/// Run the full pipeline for one query.
pub fn rank_facts(
    index: &LexicalIndex,
    input: RankInput<'_>,
    params: &RetrievalParams,
) -> RetrievalResult<Retrieval> {
    check_request(input.query, params)?;
    let lexical = lexical_candidates(index, input.query, input.scope, params);
    Ok(rank_from_lexical(index, input, lexical, params))
}

/// Every stage after BM25. The request must already have passed
/// [`check_request`].
pub fn rank_from_lexical(
    index: &LexicalIndex,
    input: RankInput<'_>,
    lexical: Vec<ScoredFragment>,
    params: &RetrievalParams,
) -> Retrieval {
    let in_scope = |f: &&Arc<Fragment>| input.scope.is_none_or(|s| s.contains(&f.id));
    let corpus_size = index.fragments().filter(in_scope).count();

    let query_vec = input.query_vec.filter(|v| has_magnitude(v));
    let mode = match (query_vec, lexical.is_empty()) {
        (Some(_), _) => RetrievalMode::Full,
        (None, false) => RetrievalMode::LexicalOnly,
        (None, true) => RetrievalMode::Degraded,
    };

    if corpus_size == 0 {
        debug!("empty corpus, nothing to rank");
        return Retrieval::empty(if query_vec.is_some() {
            RetrievalMode::Full
        } else {
            RetrievalMode::LexicalOnly
        });
    }

    let vector = match query_vec {
        Some(qv) => rank_by_vector(
            input.query,
            qv,
            index.fragments().filter(in_scope),
            params.candidate_k,
        ),
        None => VectorRanking::default(),
    };

    let fusion = match mode {
        RetrievalMode::Degraded => Fusion {
            candidates: prior_candidates(index.fragments().filter(in_scope), params),
            lexical_only: true,
        },
        _ => fuse(&lexical, &vector.ranked, &params.rrf),
    };

    let mut stats = RetrievalStats {
        corpus_size,
        lexical_candidates: lexical.len(),
        vector_candidates: vector.embedded,
        overlap_fallbacks: vector.fallback,
        fused_candidates: fusion.candidates.len(),
        ..RetrievalStats::default()
    };

    let boosted = dedup_by_id(apply_boosts(fusion.candidates, params));
    let selection = select_with_quotas(&boosted, params.mmr_pool_size(), &params.quotas);
    stats.admitted = selection.admitted.len();

    let kind = classify_query(input.query);
    let lambda = params.lambda_for(kind);
    let picked = mmr_select(&selection.admitted, params.k, lambda);

    let mut facts = Vec::with_capacity(picked.len());
    for item in &picked {
        match compress(
            &item.candidate.fragment.text,
            params.max_chars_per_fact,
            &params.compression,
        ) {
            Some(compressed) => facts.push(to_fact(item, compressed.text, input.explain)),
            None => stats.compression_dropped += 1,
        }
    }

    let fit = fit_to_budget(facts, params.token_budget, &params.budget);
    stats.estimated_tokens = fit.tokens;

    let flags = DegradationFlags {
        lexical_only: fusion.lexical_only,
        forced_inclusion: fit.forced,
        quota_backfilled: selection.backfilled,
    };

    debug!(
        ?mode,
        ?kind,
        lambda,
        corpus = stats.corpus_size,
        lexical = stats.lexical_candidates,
        vector = stats.vector_candidates,
        overlap = stats.overlap_fallbacks,
        fused = stats.fused_candidates,
        admitted = stats.admitted,
        dropped = stats.compression_dropped,
        facts = fit.selected.len(),
        tokens = stats.estimated_tokens,
        "ranked facts"
    );

    Retrieval {
        facts: fit.selected,
        flags,
        mode,
        stats,
        embedding_error: None,
    }
}

/// False for empty and all-zero vectors, which carry no direction to rank by.
pub fn has_magnitude(vector: &[f32]) -> bool {
    vector.iter().any(|x| *x != 0.0 && x.is_finite())
}

/// Rank by salience prior alone, for queries nothing else could score.
fn prior_candidates<'a, I>(fragments: I, params: &RetrievalParams) -> Vec<FusedCandidate>
where
    I: IntoIterator<Item = &'a Arc<Fragment>>,
{
    let mut pool: Vec<&Arc<Fragment>> = fragments.into_iter().collect();
    pool.sort_by(|a, b| {
        b.salience
            .partial_cmp(&a.salience)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    pool.truncate(params.candidate_k);

    let k = params.rrf.k;
    pool.into_iter()
        .enumerate()
        .map(|(rank, fragment)| FusedCandidate {
            fragment: Arc::clone(fragment),
            rrf_score: 0.0,
            fused_score: (k + 1.0) / (k + rank as f64 + 1.0),
            provenance: Provenance::Lexical,
            lexical_rank: None,
            vector_rank: None,
        })
        .collect()
}

fn to_fact(item: &BoostedCandidate, fact: String, explain: bool) -> FactRecord {
    let candidate = &item.candidate;
    FactRecord {
        id: candidate.fragment.id.clone(),
        score: round2(item.score),
        source: candidate.fragment.source_uri.clone(),
        fact,
        explain: explain.then(|| FactExplanation {
            provenance: candidate.provenance,
            doc_type: item.doc_type,
            lexical_rank: candidate.lexical_rank,
            vector_rank: candidate.vector_rank,
            fused_score: candidate.fused_score,
            boost: item.boost,
        }),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
