//! BM25 lexical index over a fragment corpus.
//!
//! The index is built once from a fragment set and is read-only afterwards;
//! a corpus change means building a new index (see `IndexHandle` in the
//! application crate for the copy-on-rebuild swap).
//!
//! # Scoring
//!
//! For each distinct query term `t` present in a fragment:
//!
//! ```text
//! idf(t)   = ln((N - df(t) + 0.5) / (df(t) + 0.5))      (non-positive → ε × mean idf)
//! score   += idf(t) · tf·(k1 + 1) / (tf + k1·(1 - b + b·len/avgLen))
//! ```
//!
//! Fragments sharing no term with the query are excluded, not scored zero.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::models::{Fragment, ScoredFragment};
use crate::params::Bm25Params;
use crate::tokenize::tokenize;

/// Aggregate statistics BM25 needs, owned by the index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusStatistics {
    pub doc_count: usize,
    pub avg_doc_len: f64,
    /// term → number of fragments containing it
    pub doc_freq: HashMap<String, usize>,
}

impl CorpusStatistics {
    /// Raw Okapi idf, which is negative for terms in more than half the corpus.
    pub fn raw_idf(&self, term: &str) -> Option<f64> {
        let df = *self.doc_freq.get(term)? as f64;
        let n = self.doc_count as f64;
        Some(((n - df + 0.5) / (df + 0.5)).ln())
    }

    /// Mean raw idf over the vocabulary, used as the floor base.
    pub fn mean_idf(&self) -> f64 {
        if self.doc_freq.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.doc_freq.keys().filter_map(|t| self.raw_idf(t)).sum();
        sum / self.doc_freq.len() as f64
    }
}

#[derive(Debug)]
struct IndexedFragment {
    fragment: Arc<Fragment>,
    term_freqs: HashMap<String, u32>,
    len: usize,
}

/// Immutable BM25 index plus the fragments it covers.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    entries: Vec<IndexedFragment>,
    by_id: HashMap<String, usize>,
    /// term → (entry position, term frequency)
    postings: HashMap<String, Vec<(usize, u32)>>,
    stats: CorpusStatistics,
    mean_idf: f64,
}

impl LexicalIndex {
    /// Build an index. Fragments are deduplicated by id; first occurrence wins.
    pub fn build<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = Fragment>,
    {
        Self::build_shared(fragments.into_iter().map(Arc::new))
    }

    /// Build an index from already-shared fragments.
    pub fn build_shared<I>(fragments: I) -> Self
    where
        I: IntoIterator<Item = Arc<Fragment>>,
    {
        let mut entries: Vec<IndexedFragment> = Vec::new();
        let mut by_id: HashMap<String, usize> = HashMap::new();
        let mut postings: HashMap<String, Vec<(usize, u32)>> = HashMap::new();
        let mut total_len = 0usize;

        for fragment in fragments {
            if by_id.contains_key(&fragment.id) {
                continue;
            }
            let tokens = tokenize(&fragment.text);
            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }

            let pos = entries.len();
            for (term, tf) in &term_freqs {
                postings.entry(term.clone()).or_default().push((pos, *tf));
            }
            total_len += tokens.len();
            by_id.insert(fragment.id.clone(), pos);
            entries.push(IndexedFragment {
                fragment,
                term_freqs,
                len: tokens.len(),
            });
        }

        let doc_count = entries.len();
        let stats = CorpusStatistics {
            doc_count,
            avg_doc_len: if doc_count == 0 {
                0.0
            } else {
                total_len as f64 / doc_count as f64
            },
            doc_freq: postings
                .iter()
                .map(|(term, list)| (term.clone(), list.len()))
                .collect(),
        };
        let mean_idf = stats.mean_idf();

        Self {
            entries,
            by_id,
            postings,
            stats,
            mean_idf,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &CorpusStatistics {
        &self.stats
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Fragment>> {
        self.by_id.get(id).map(|&pos| &self.entries[pos].fragment)
    }

    /// All indexed fragments, in insertion order.
    pub fn fragments(&self) -> impl Iterator<Item = &Arc<Fragment>> + '_ {
        self.entries.iter().map(|e| &e.fragment)
    }

    /// Distinct terms of an indexed fragment.
    pub fn terms_of(&self, id: &str) -> Option<HashSet<String>> {
        self.by_id
            .get(id)
            .map(|&pos| self.entries[pos].term_freqs.keys().cloned().collect())
    }

    /// Effective idf: the raw value, floored to `ε × mean idf` when non-positive.
    pub fn idf(&self, term: &str, params: &Bm25Params) -> Option<f64> {
        let raw = self.stats.raw_idf(term)?;
        if raw > 0.0 {
            return Some(raw);
        }
        Some((params.epsilon * self.mean_idf).max(f64::EPSILON))
    }

    /// Score `query` against the index and return the top `limit` fragments.
    ///
    /// `scope`, when given, restricts results to the listed fragment ids.
    /// Results are sorted by score (desc), salience (desc), id (asc); each
    /// carries `similarity = score / top_score`, clipped to `[0, 1]`.
    pub fn search(
        &self,
        query: &str,
        params: &Bm25Params,
        limit: usize,
        scope: Option<&HashSet<String>>,
    ) -> Vec<ScoredFragment> {
        let mut query_terms = tokenize(query);
        query_terms.sort();
        query_terms.dedup();
        if query_terms.is_empty() || self.entries.is_empty() || limit == 0 {
            return Vec::new();
        }

        let avg_len = if self.stats.avg_doc_len > 0.0 {
            self.stats.avg_doc_len
        } else {
            1.0
        };
        let mut scores: HashMap<usize, f64> = HashMap::new();

        for term in &query_terms {
            let (Some(list), Some(idf)) = (self.postings.get(term), self.idf(term, params)) else {
                continue;
            };
            for &(pos, tf) in list {
                let entry = &self.entries[pos];
                if let Some(scope) = scope {
                    if !scope.contains(&entry.fragment.id) {
                        continue;
                    }
                }
                let tf = tf as f64;
                let norm = params.k1 * (1.0 - params.b + params.b * entry.len as f64 / avg_len);
                *scores.entry(pos).or_insert(0.0) += idf * tf * (params.k1 + 1.0) / (tf + norm);
            }
        }

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            let fa = &self.entries[a.0].fragment;
            let fb = &self.entries[b.0].fragment;
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    fb.salience
                        .partial_cmp(&fa.salience)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(fa.id.cmp(&fb.id))
        });
        ranked.truncate(limit);

        let top = ranked.first().map(|(_, s)| *s).unwrap_or(0.0);
        ranked
            .into_iter()
            .enumerate()
            .map(|(rank, (pos, score))| ScoredFragment {
                fragment: Arc::clone(&self.entries[pos].fragment),
                score,
                similarity: if top > 0.0 {
                    (score / top).clamp(0.0, 1.0)
                } else {
                    0.0
                },
                rank,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str) -> Fragment {
        Fragment::new(text, "mem://test", "v1")
    }

    fn build_corpus() -> LexicalIndex {
        LexicalIndex::build(vec![
            frag("rust programming systems language fast"),
            frag("python programming scripting easy"),
            frag("java enterprise programming verbose"),
            frag("rust memory safety zero cost abstractions"),
        ])
    }

    #[test]
    fn test_statistics() {
        let idx = build_corpus();
        let stats = idx.stats();
        assert_eq!(stats.doc_count, 4);
        assert_eq!(stats.doc_freq["programming"], 3);
        assert_eq!(stats.doc_freq["rust"], 2);
        assert!((stats.avg_doc_len - 19.0 / 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_dedup_first_wins() {
        let a = frag("Hello world again");
        let b = frag("hello   WORLD again");
        assert_eq!(a.id, b.id);
        let idx = LexicalIndex::build(vec![a.clone(), b]);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get(&a.id).unwrap().text, "Hello world again");
    }

    #[test]
    fn test_empty_query_and_empty_index() {
        let idx = build_corpus();
        assert!(idx.search("", &Bm25Params::default(), 10, None).is_empty());
        let empty = LexicalIndex::default();
        assert!(empty.search("rust", &Bm25Params::default(), 10, None).is_empty());
    }

    #[test]
    fn test_excludes_non_overlapping() {
        let idx = build_corpus();
        let results = idx.search("rust", &Bm25Params::default(), 10, None);
        assert_eq!(results.len(), 2);
        for r in &results {
            assert!(r.fragment.text.contains("rust"));
            assert!(r.score > 0.0);
        }
    }

    #[test]
    fn test_higher_tf_ranks_first() {
        let idx = LexicalIndex::build(vec![frag("rust rust rust"), frag("rust programming")]);
        let results = idx.search("rust", &Bm25Params::default(), 10, None);
        assert_eq!(results[0].fragment.text, "rust rust rust");
        assert_eq!(results[0].rank, 0);
        assert_eq!(results[1].rank, 1);
    }

    #[test]
    fn test_common_term_still_scores_positive() {
        // "programming" appears in 3 of 4 fragments: raw idf is negative.
        let idx = build_corpus();
        assert!(idx.stats().raw_idf("programming").unwrap() < 0.0);
        let results = idx.search("programming", &Bm25Params::default(), 10, None);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.score > 0.0));
    }

    #[test]
    fn test_similarity_in_unit_range() {
        let idx = build_corpus();
        let results = idx.search("rust programming", &Bm25Params::default(), 10, None);
        assert!((results[0].similarity - 1.0).abs() < 1e-9);
        for r in &results {
            assert!(r.similarity >= 0.0 && r.similarity <= 1.0);
        }
    }

    #[test]
    fn test_limit_and_scope() {
        let idx = build_corpus();
        assert!(idx.search("programming", &Bm25Params::default(), 2, None).len() <= 2);

        let only = frag("python programming scripting easy").id;
        let scope: HashSet<String> = [only.clone()].into_iter().collect();
        let results = idx.search("programming", &Bm25Params::default(), 10, Some(&scope));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fragment.id, only);
    }
}
