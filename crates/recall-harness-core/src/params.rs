//! Retrieval tuning parameters, decoupled from application config.
//!
//! None of these constants has a principled derivation; they are policy
//! knobs tuned empirically, so every one of them is a named, overridable
//! field with a default.

use std::collections::BTreeMap;

use crate::diversity::QueryKind;
use crate::error::{RetrievalError, RetrievalResult};
use crate::models::DocumentType;

/// BM25 Okapi parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    /// Non-positive idf values are replaced by `epsilon × mean idf`, so a
    /// matching term always contributes a positive amount.
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// Reciprocal rank fusion parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfParams {
    pub k: f64,
    pub lexical_weight: f64,
    pub vector_weight: f64,
}

impl Default for RrfParams {
    fn default() -> Self {
        Self {
            k: 60.0,
            lexical_weight: 0.4,
            vector_weight: 0.6,
        }
    }
}

/// Sentence-compression bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionParams {
    pub max_sentences: usize,
    /// Fraction of `max_chars_per_fact` the last sentence may overrun by.
    pub overrun: f64,
    /// Sentences shorter than this (in chars) are never used.
    pub min_sentence_chars: usize,
}

impl Default for CompressionParams {
    fn default() -> Self {
        Self {
            max_sentences: 3,
            overrun: 0.2,
            min_sentence_chars: 20,
        }
    }
}

/// Token-budget fitting parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetParams {
    pub chars_per_token: usize,
    /// Upper bound on facts force-included when nothing fits.
    pub max_forced: usize,
    /// Length (in chars) of a force-included "tiny" fact.
    pub tiny_fact_chars: usize,
}

impl Default for BudgetParams {
    fn default() -> Self {
        Self {
            chars_per_token: 4,
            max_forced: 3,
            tiny_fact_chars: 160,
        }
    }
}

/// Diversity weight λ per query kind.
///
/// Narrow factual and definition lookups favor focus; comparison and
/// analysis queries favor breadth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiversityPolicy {
    pub factual: f64,
    pub definition: f64,
    pub general: f64,
    pub analysis: f64,
    pub comparison: f64,
}

impl Default for DiversityPolicy {
    fn default() -> Self {
        Self {
            factual: 0.2,
            definition: 0.2,
            general: 0.35,
            analysis: 0.5,
            comparison: 0.65,
        }
    }
}

impl DiversityPolicy {
    pub fn lambda_for(&self, kind: QueryKind) -> f64 {
        match kind {
            QueryKind::Factual => self.factual,
            QueryKind::Definition => self.definition,
            QueryKind::General => self.general,
            QueryKind::Analysis => self.analysis,
            QueryKind::Comparison => self.comparison,
        }
    }

    fn values(&self) -> [(&'static str, f64); 5] {
        [
            ("diversity_by_kind.factual", self.factual),
            ("diversity_by_kind.definition", self.definition),
            ("diversity_by_kind.general", self.general),
            ("diversity_by_kind.analysis", self.analysis),
            ("diversity_by_kind.comparison", self.comparison),
        ]
    }
}

/// Default MMR pool size as a multiple of `k`.
pub const MMR_POOL_FACTOR: usize = 3;

/// All knobs for a single retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalParams {
    /// Number of facts requested.
    pub k: usize,
    /// Explicit λ; when `None` the [`DiversityPolicy`] decides per query kind.
    pub diversity: Option<f64>,
    pub max_chars_per_fact: usize,
    pub token_budget: usize,
    /// Maximum entries taken from each of the lexical and vector rankings.
    pub candidate_k: usize,
    /// Size of the quota-admitted pool MMR picks `k` from. `None` means
    /// `MMR_POOL_FACTOR × k`, capped at `candidate_k`.
    pub mmr_pool: Option<usize>,
    pub bm25: Bm25Params,
    pub rrf: RrfParams,
    /// Per-bucket admission quotas. Buckets without an entry are unlimited.
    pub quotas: BTreeMap<DocumentType, usize>,
    /// Per-type boost added to the normalized fused score.
    pub doc_weights: BTreeMap<DocumentType, f64>,
    pub compression: CompressionParams,
    pub budget: BudgetParams,
    pub diversity_by_kind: DiversityPolicy,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: 5,
            diversity: None,
            max_chars_per_fact: 280,
            token_budget: 512,
            candidate_k: 80,
            mmr_pool: None,
            bm25: Bm25Params::default(),
            rrf: RrfParams::default(),
            quotas: default_quotas(),
            doc_weights: default_doc_weights(),
            compression: CompressionParams::default(),
            budget: BudgetParams::default(),
            diversity_by_kind: DiversityPolicy::default(),
        }
    }
}

/// Default per-bucket quotas (`documentation` is unlimited).
pub fn default_quotas() -> BTreeMap<DocumentType, usize> {
    BTreeMap::from([
        (DocumentType::ReadmeOverview, 2),
        (DocumentType::ApiExamples, 3),
        (DocumentType::Paper, 3),
        (DocumentType::Metadata, 1),
        (DocumentType::Code, 4),
    ])
}

/// Default per-type relevance boosts.
///
/// `code` carries a small positive weight; it has been tuned both ways in
/// the past and is expected to be overridden per deployment.
pub fn default_doc_weights() -> BTreeMap<DocumentType, f64> {
    BTreeMap::from([
        (DocumentType::ReadmeOverview, 0.15),
        (DocumentType::ApiExamples, 0.10),
        (DocumentType::Paper, 0.05),
        (DocumentType::Documentation, 0.05),
        (DocumentType::Metadata, 0.0),
        (DocumentType::Code, 0.02),
    ])
}

impl RetrievalParams {
    pub fn quota_for(&self, doc_type: DocumentType) -> Option<usize> {
        self.quotas.get(&doc_type).copied()
    }

    pub fn weight_for(&self, doc_type: DocumentType) -> f64 {
        self.doc_weights.get(&doc_type).copied().unwrap_or(0.0)
    }

    /// Number of candidates quota selection admits for MMR. Never below `k`.
    pub fn mmr_pool_size(&self) -> usize {
        self.mmr_pool
            .unwrap_or_else(|| self.k.saturating_mul(MMR_POOL_FACTOR).min(self.candidate_k))
            .max(self.k)
    }

    /// λ for a query: the explicit override if set, else the per-kind policy.
    pub fn lambda_for(&self, kind: QueryKind) -> f64 {
        self.diversity
            .unwrap_or_else(|| self.diversity_by_kind.lambda_for(kind))
    }

    /// Reject out-of-range values before any retrieval work starts.
    pub fn validate(&self) -> RetrievalResult<()> {
        if self.k == 0 {
            return Err(RetrievalError::invalid("k", "must be >= 1"));
        }
        if let Some(lambda) = self.diversity {
            check_unit("diversity", lambda)?;
        }
        for (name, lambda) in self.diversity_by_kind.values() {
            check_unit(name, lambda)?;
        }
        if self.max_chars_per_fact == 0 {
            return Err(RetrievalError::invalid("max_chars_per_fact", "must be >= 1"));
        }
        if self.token_budget == 0 {
            return Err(RetrievalError::invalid("token_budget", "must be >= 1"));
        }
        if self.candidate_k == 0 {
            return Err(RetrievalError::invalid("candidate_k", "must be >= 1"));
        }
        if let Some(pool) = self.mmr_pool {
            if pool < self.k {
                return Err(RetrievalError::invalid("mmr_pool", "must be >= k"));
            }
        }
        if !self.bm25.k1.is_finite() || self.bm25.k1 < 0.0 {
            return Err(RetrievalError::invalid("bm25.k1", "must be a finite value >= 0"));
        }
        check_unit("bm25.b", self.bm25.b)?;
        check_weight("bm25.epsilon", self.bm25.epsilon)?;
        if !self.rrf.k.is_finite() || self.rrf.k < 0.0 {
            return Err(RetrievalError::invalid("rrf.k", "must be a finite value >= 0"));
        }
        check_weight("rrf.lexical_weight", self.rrf.lexical_weight)?;
        check_weight("rrf.vector_weight", self.rrf.vector_weight)?;
        if self.rrf.lexical_weight + self.rrf.vector_weight <= 0.0 {
            return Err(RetrievalError::invalid(
                "rrf",
                "lexical_weight and vector_weight cannot both be zero",
            ));
        }
        for (doc_type, weight) in &self.doc_weights {
            if !weight.is_finite() {
                return Err(RetrievalError::invalid(
                    format!("doc_weights.{doc_type}"),
                    "must be finite",
                ));
            }
        }
        if self.compression.max_sentences == 0 {
            return Err(RetrievalError::invalid(
                "compression.max_sentences",
                "must be >= 1",
            ));
        }
        if !self.compression.overrun.is_finite() || self.compression.overrun < 0.0 {
            return Err(RetrievalError::invalid(
                "compression.overrun",
                "must be a finite value >= 0",
            ));
        }
        if self.budget.chars_per_token == 0 {
            return Err(RetrievalError::invalid("budget.chars_per_token", "must be >= 1"));
        }
        if self.budget.max_forced == 0 {
            return Err(RetrievalError::invalid("budget.max_forced", "must be >= 1"));
        }
        if self.budget.tiny_fact_chars == 0 {
            return Err(RetrievalError::invalid("budget.tiny_fact_chars", "must be >= 1"));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> RetrievalResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(RetrievalError::invalid(name, "must be in [0.0, 1.0]"));
    }
    Ok(())
}

fn check_weight(name: &str, value: f64) -> RetrievalResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(RetrievalError::invalid(name, "must be a finite value >= 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(RetrievalParams::default().validate().is_ok());
    }

    #[test]
    fn test_mmr_pool_size() {
        let params = RetrievalParams::default();
        assert_eq!(params.mmr_pool_size(), 15);

        let capped = RetrievalParams {
            k: 10,
            candidate_k: 12,
            ..RetrievalParams::default()
        };
        assert_eq!(capped.mmr_pool_size(), 12);

        let tiny_candidates = RetrievalParams {
            k: 10,
            candidate_k: 4,
            ..RetrievalParams::default()
        };
        assert_eq!(tiny_candidates.mmr_pool_size(), 10);

        let explicit = RetrievalParams {
            mmr_pool: Some(7),
            ..RetrievalParams::default()
        };
        assert_eq!(explicit.mmr_pool_size(), 7);
    }

    #[test]
    fn test_mmr_pool_below_k_rejected() {
        let params = RetrievalParams {
            k: 5,
            mmr_pool: Some(4),
            ..RetrievalParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(RetrievalError::InvalidParameter { name, .. }) if name == "mmr_pool"
        ));
    }

    #[test]
    fn test_zero_k_rejected() {
        let params = RetrievalParams {
            k: 0,
            ..RetrievalParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(RetrievalError::InvalidParameter { name, .. }) if name == "k"
        ));
    }

    #[test]
    fn test_diversity_out_of_range_rejected() {
        let params = RetrievalParams {
            diversity: Some(1.5),
            ..RetrievalParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_nan_diversity_rejected() {
        let params = RetrievalParams {
            diversity: Some(f64::NAN),
            ..RetrievalParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_explicit_diversity_overrides_policy() {
        let mut params = RetrievalParams::default();
        assert_eq!(params.lambda_for(QueryKind::Comparison), 0.65);
        params.diversity = Some(0.1);
        assert_eq!(params.lambda_for(QueryKind::Comparison), 0.1);
    }

    #[test]
    fn test_documentation_unlimited_by_default() {
        let params = RetrievalParams::default();
        assert_eq!(params.quota_for(DocumentType::Documentation), None);
        assert_eq!(params.quota_for(DocumentType::Code), Some(4));
    }
}
