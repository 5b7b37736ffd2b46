use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use proptest::prelude::*;
use recall_harness_core::address::content_id;
use recall_harness_core::budget::{estimate_tokens, fit_to_budget};
use recall_harness_core::classify::{select_with_quotas, BoostedCandidate};
use recall_harness_core::compress::compress;
use recall_harness_core::diversity::mmr_select;
use recall_harness_core::fusion::{fuse, FusedCandidate};
use recall_harness_core::lexical::LexicalIndex;
use recall_harness_core::models::{
    DocumentType, FactRecord, Fragment, Provenance, ScoredFragment,
};
use recall_harness_core::params::{BudgetParams, Bm25Params, CompressionParams, RrfParams};

fn arb_word() -> impl Strategy<Value = String> {
    "[a-z]{2,8}"
}

fn arb_doc_type() -> impl Strategy<Value = DocumentType> {
    prop_oneof![
        Just(DocumentType::ReadmeOverview),
        Just(DocumentType::ApiExamples),
        Just(DocumentType::Metadata),
        Just(DocumentType::Paper),
        Just(DocumentType::Code),
        Just(DocumentType::Documentation),
    ]
}

fn ranked(ids: &[usize]) -> Vec<ScoredFragment> {
    ids.iter()
        .enumerate()
        .map(|(rank, id)| ScoredFragment {
            fragment: Arc::new(Fragment::new(format!("item {id}"), "mem://p", "v1")),
            score: 1.0,
            similarity: 1.0,
            rank,
        })
        .collect()
}

fn boosted(i: usize, doc_type: DocumentType, score: f64) -> BoostedCandidate {
    BoostedCandidate {
        candidate: FusedCandidate {
            fragment: Arc::new(Fragment::new(format!("item {i} word{i}"), "mem://p", "v1")),
            rrf_score: score,
            fused_score: score,
            provenance: Provenance::Hybrid,
            lexical_rank: Some(i),
            vector_rank: Some(i),
        },
        doc_type,
        boost: 0.0,
        score,
    }
}

// ── Addressing ignores whitespace runs and casing ───────────────────────

proptest! {
    #[test]
    fn content_id_is_normalization_invariant(
        words in prop::collection::vec(arb_word(), 1..12),
        gaps in prop::collection::vec(1usize..5, 12),
        uri in "[a-z]{1,10}://[a-z]{1,10}",
        version in "v[0-9]{1,3}",
    ) {
        let single = words.join(" ");
        let spaced: String = words
            .iter()
            .zip(gaps.iter())
            .map(|(w, g)| format!("{}{}", w.to_uppercase(), " ".repeat(*g)))
            .collect();
        let a = content_id(&single, &uri, &version);
        let b = content_id(&format!("  {spaced}"), &uri, &version);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a, content_id(&single, &uri, &version));
    }
}

// ── BM25 score never drops when a query term's frequency rises ──────────

proptest! {
    #[test]
    fn bm25_monotone_in_term_frequency(
        len in 3usize..12,
        tf in 1usize..10,
        others in prop::collection::vec(any::<bool>(), 1..6),
    ) {
        prop_assume!(tf + 1 < len);
        let target_doc = |tf: usize| {
            let mut words = vec!["target"; tf];
            words.extend(vec!["filler"; len - tf]);
            Fragment::new(words.join(" "), "mem://target", "v1")
        };
        let corpus = |tf: usize| {
            let mut frags = vec![target_doc(tf)];
            for (i, has_target) in others.iter().enumerate() {
                let text = if *has_target {
                    format!("target alpha note{i}")
                } else {
                    format!("alpha beta note{i}")
                };
                frags.push(Fragment::new(text, format!("mem://other/{i}"), "v1"));
            }
            LexicalIndex::build(frags)
        };
        let score_of = |tf: usize| {
            corpus(tf)
                .search("target", &Bm25Params::default(), 100, None)
                .into_iter()
                .find(|r| r.fragment.source_uri == "mem://target")
                .map(|r| r.score)
                .unwrap_or(0.0)
        };
        let lower = score_of(tf);
        let higher = score_of(tf + 1);
        prop_assert!(lower > 0.0);
        prop_assert!(higher + 1e-12 >= lower, "tf {} → {}: {} < {}", tf, tf + 1, higher, lower);
    }
}

// ── Fusion: overlap never hurts, nothing falls below the floor ──────────

proptest! {
    #[test]
    fn fusion_overlap_dominates_and_respects_floor(
        lexical_ids in prop::sample::subsequence((0..20).collect::<Vec<usize>>(), 0..15),
        vector_ids in prop::sample::subsequence((0..20).collect::<Vec<usize>>(), 1..15),
    ) {
        let params = RrfParams::default();
        let lexical = ranked(&lexical_ids);
        let vector = ranked(&vector_ids);
        let fusion = fuse(&lexical, &vector, &params);

        let floor_lex = params.lexical_weight / (params.k + lexical.len() as f64);
        let floor_vec = params.vector_weight / (params.k + vector.len() as f64);
        let floor = floor_lex.min(floor_vec);

        for c in &fusion.candidates {
            prop_assert!(c.rrf_score + 1e-12 >= floor);
            prop_assert!((0.0..=1.0).contains(&c.fused_score));
            if let (Some(lr), Some(vr)) = (c.lexical_rank, c.vector_rank) {
                prop_assert_eq!(c.provenance, Provenance::Hybrid);
                let lex_only = params.lexical_weight / (params.k + lr as f64 + 1.0);
                let vec_only = params.vector_weight / (params.k + vr as f64 + 1.0);
                prop_assert!(c.rrf_score >= lex_only);
                prop_assert!(c.rrf_score >= vec_only);
            }
        }
    }
}

// ── Quotas hold unless backfill was needed ──────────────────────────────

proptest! {
    #[test]
    fn quotas_bound_admission(
        types in prop::collection::vec(arb_doc_type(), 0..40),
        k in 1usize..12,
        quota_values in prop::collection::vec(0usize..4, 6),
    ) {
        let ranking: Vec<BoostedCandidate> = types
            .iter()
            .enumerate()
            .map(|(i, t)| boosted(i, *t, 1.0 - i as f64 / 100.0))
            .collect();
        let quotas: BTreeMap<DocumentType, usize> = DocumentType::ALL
            .iter()
            .copied()
            .zip(quota_values.iter().copied())
            .collect();

        let selection = select_with_quotas(&ranking, k, &quotas);
        prop_assert!(selection.admitted.len() <= k);
        prop_assert_eq!(selection.admitted.len(), k.min(ranking.len()));

        if !selection.backfilled {
            let mut counts: HashMap<DocumentType, usize> = HashMap::new();
            for c in &selection.admitted {
                *counts.entry(c.doc_type).or_insert(0) += 1;
            }
            for (doc_type, count) in counts {
                prop_assert!(count <= quotas[&doc_type]);
            }
        }
    }
}

// ── MMR with λ = 0 is pure relevance order ──────────────────────────────

proptest! {
    #[test]
    fn mmr_lambda_zero_keeps_relevance_order(
        mut scores in prop::collection::vec(0.0f64..1.0, 1..25),
        k in 1usize..10,
    ) {
        scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let pool: Vec<BoostedCandidate> = scores
            .iter()
            .enumerate()
            .map(|(i, s)| boosted(i, DocumentType::Documentation, *s))
            .collect();
        let picked = mmr_select(&pool, k, 0.0);
        prop_assert_eq!(picked.len(), k.min(pool.len()));
        for (got, want) in picked.iter().zip(pool.iter()) {
            prop_assert_eq!(&got.candidate.fragment.id, &want.candidate.fragment.id);
        }
    }
}

// ── Compressed facts stay within their bounds ───────────────────────────

proptest! {
    #[test]
    fn compression_respects_bounds(
        sentences in prop::collection::vec(prop::collection::vec(arb_word(), 1..30), 1..8),
        max_chars in 10usize..400,
    ) {
        let text = sentences
            .iter()
            .map(|words| format!("{}.", words.join(" ")))
            .collect::<Vec<_>>()
            .join(" ");
        let params = CompressionParams::default();
        if let Some(fact) = compress(&text, max_chars, &params) {
            let limit = (max_chars as f64 * (1.0 + params.overrun)).floor() as usize;
            prop_assert!(fact.text.chars().count() <= limit);
            prop_assert!(fact.sentences >= 1 && fact.sentences <= params.max_sentences);
            prop_assert!(!fact.text.trim().is_empty());
        }
    }
}

// ── The budget fitter never returns nothing for something ───────────────

proptest! {
    #[test]
    fn budget_fit_is_never_empty(
        lengths in prop::collection::vec(1usize..2000, 1..10),
        budget in 1usize..600,
    ) {
        let params = BudgetParams::default();
        let facts: Vec<FactRecord> = lengths
            .iter()
            .enumerate()
            .map(|(i, len)| FactRecord {
                id: format!("f{i}"),
                score: 0.5,
                source: "mem://p".to_string(),
                fact: "x".repeat(*len),
                explain: None,
            })
            .collect();
        let any_fits = lengths
            .iter()
            .any(|len| estimate_tokens(&"x".repeat(*len), params.chars_per_token) <= budget);

        let fit = fit_to_budget(facts, budget, &params);
        prop_assert!(!fit.selected.is_empty());
        prop_assert_eq!(fit.forced, !any_fits);
        if !fit.forced {
            prop_assert!(fit.tokens <= budget);
        } else {
            prop_assert!(fit.selected.len() <= params.max_forced);
        }
    }
}
