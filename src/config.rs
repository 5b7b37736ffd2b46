//! TOML configuration.
//!
//! ```toml
//! [retrieval]
//! k = 5
//! max_chars_per_fact = 280
//! token_budget = 512
//!
//! [retrieval.rrf]
//! lexical_weight = 0.4
//! vector_weight = 0.6
//!
//! [retrieval.quotas]
//! code = 4
//! readme_overview = 2
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```
//!
//! Every key is optional. Integer knobs are read as signed integers so a
//! negative value is reported as an invalid parameter instead of a parse
//! failure. `quotas` and `doc_weights` entries merge over the defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use recall_harness_core::error::{RetrievalError, RetrievalResult};
use recall_harness_core::models::DocumentType;
use recall_harness_core::params::{
    default_doc_weights, default_quotas, BudgetParams, Bm25Params, CompressionParams,
    DiversityPolicy, RetrievalParams, RrfParams,
};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: i64,
    pub diversity: Option<f64>,
    pub max_chars_per_fact: i64,
    pub token_budget: i64,
    pub candidate_k: i64,
    pub mmr_pool: Option<i64>,
    pub bm25: Bm25Config,
    pub rrf: RrfConfig,
    /// Keyed by document type name, e.g. `readme_overview`.
    pub quotas: BTreeMap<String, i64>,
    pub doc_weights: BTreeMap<String, f64>,
    pub compression: CompressionConfig,
    pub budget: BudgetConfig,
    pub diversity_by_kind: DiversityPolicyConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let params = RetrievalParams::default();
        Self {
            k: params.k as i64,
            diversity: params.diversity,
            max_chars_per_fact: params.max_chars_per_fact as i64,
            token_budget: params.token_budget as i64,
            candidate_k: params.candidate_k as i64,
            mmr_pool: None,
            bm25: Bm25Config::default(),
            rrf: RrfConfig::default(),
            quotas: BTreeMap::new(),
            doc_weights: BTreeMap::new(),
            compression: CompressionConfig::default(),
            budget: BudgetConfig::default(),
            diversity_by_kind: DiversityPolicyConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Bm25Config {
    pub k1: f64,
    pub b: f64,
    pub epsilon: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        let p = Bm25Params::default();
        Self {
            k1: p.k1,
            b: p.b,
            epsilon: p.epsilon,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RrfConfig {
    pub k: f64,
    pub lexical_weight: f64,
    pub vector_weight: f64,
}

impl Default for RrfConfig {
    fn default() -> Self {
        let p = RrfParams::default();
        Self {
            k: p.k,
            lexical_weight: p.lexical_weight,
            vector_weight: p.vector_weight,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompressionConfig {
    pub max_sentences: i64,
    pub overrun: f64,
    pub min_sentence_chars: i64,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        let p = CompressionParams::default();
        Self {
            max_sentences: p.max_sentences as i64,
            overrun: p.overrun,
            min_sentence_chars: p.min_sentence_chars as i64,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BudgetConfig {
    pub chars_per_token: i64,
    pub max_forced: i64,
    pub tiny_fact_chars: i64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let p = BudgetParams::default();
        Self {
            chars_per_token: p.chars_per_token as i64,
            max_forced: p.max_forced as i64,
            tiny_fact_chars: p.tiny_fact_chars as i64,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DiversityPolicyConfig {
    pub factual: f64,
    pub definition: f64,
    pub general: f64,
    pub analysis: f64,
    pub comparison: f64,
}

impl Default for DiversityPolicyConfig {
    fn default() -> Self {
        let p = DiversityPolicy::default();
        Self {
            factual: p.factual,
            definition: p.definition,
            general: p.general,
            analysis: p.analysis,
            comparison: p.comparison,
        }
    }
}

fn count(name: &str, value: i64) -> RetrievalResult<usize> {
    usize::try_from(value).map_err(|_| RetrievalError::invalid(name, "must be >= 0"))
}

fn doc_type(table: &str, key: &str) -> RetrievalResult<DocumentType> {
    key.parse()
        .map_err(|reason: String| RetrievalError::invalid(format!("{table}.{key}"), reason))
}

impl RetrievalConfig {
    /// Convert to validated core parameters.
    pub fn to_params(&self) -> RetrievalResult<RetrievalParams> {
        let mut quotas = default_quotas();
        for (key, quota) in &self.quotas {
            quotas.insert(doc_type("quotas", key)?, count(&format!("quotas.{key}"), *quota)?);
        }
        let mut doc_weights = default_doc_weights();
        for (key, weight) in &self.doc_weights {
            doc_weights.insert(doc_type("doc_weights", key)?, *weight);
        }

        let params = RetrievalParams {
            k: count("k", self.k)?,
            diversity: self.diversity,
            max_chars_per_fact: count("max_chars_per_fact", self.max_chars_per_fact)?,
            token_budget: count("token_budget", self.token_budget)?,
            candidate_k: count("candidate_k", self.candidate_k)?,
            mmr_pool: self.mmr_pool.map(|n| count("mmr_pool", n)).transpose()?,
            bm25: Bm25Params {
                k1: self.bm25.k1,
                b: self.bm25.b,
                epsilon: self.bm25.epsilon,
            },
            rrf: RrfParams {
                k: self.rrf.k,
                lexical_weight: self.rrf.lexical_weight,
                vector_weight: self.rrf.vector_weight,
            },
            quotas,
            doc_weights,
            compression: CompressionParams {
                max_sentences: count("compression.max_sentences", self.compression.max_sentences)?,
                overrun: self.compression.overrun,
                min_sentence_chars: count(
                    "compression.min_sentence_chars",
                    self.compression.min_sentence_chars,
                )?,
            },
            budget: BudgetParams {
                chars_per_token: count("budget.chars_per_token", self.budget.chars_per_token)?,
                max_forced: count("budget.max_forced", self.budget.max_forced)?,
                tiny_fact_chars: count("budget.tiny_fact_chars", self.budget.tiny_fact_chars)?,
            },
            diversity_by_kind: DiversityPolicy {
                factual: self.diversity_by_kind.factual,
                definition: self.diversity_by_kind.definition,
                general: self.diversity_by_kind.general,
                analysis: self.diversity_by_kind.analysis,
                comparison: self.diversity_by_kind.comparison,
            },
        };
        params.validate()?;
        Ok(params)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Deadline for embedding one query.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_ms() -> u64 {
    2000
}
fn default_max_retries() -> u32 {
    2
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Validated retrieval parameters.
    pub fn retrieval_params(&self) -> RetrievalResult<RetrievalParams> {
        self.retrieval.to_params()
    }

    fn validate(&self) -> Result<()> {
        self.retrieval_params()?;

        if self.embedding.timeout_ms == 0 {
            anyhow::bail!("embedding.timeout_ms must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled or openai.",
                other
            ),
        }

        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    Config::from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.retrieval_params().unwrap(), RetrievalParams::default());
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.embedding.timeout_ms, 2000);
    }

    #[test]
    fn test_quota_override_merges() {
        let config = Config::from_toml_str(
            r#"
            [retrieval.quotas]
            code = 20
            "#,
        )
        .unwrap();
        let params = config.retrieval_params().unwrap();
        assert_eq!(params.quota_for(DocumentType::Code), Some(20));
        assert_eq!(params.quota_for(DocumentType::ReadmeOverview), Some(2));
    }

    #[test]
    fn test_negative_k_is_invalid_parameter() {
        let err = Config::from_toml_str("[retrieval]\nk = -3\n").unwrap_err();
        let retrieval_err = err.downcast_ref::<RetrievalError>().unwrap();
        assert!(matches!(
            retrieval_err,
            RetrievalError::InvalidParameter { name, .. } if name == "k"
        ));
    }

    #[test]
    fn test_mmr_pool_setting() {
        let config = Config::from_toml_str("[retrieval]\nk = 4\nmmr_pool = 9\n").unwrap();
        assert_eq!(config.retrieval_params().unwrap().mmr_pool_size(), 9);

        let err = Config::from_toml_str("[retrieval]\nk = 4\nmmr_pool = 2\n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RetrievalError>(),
            Some(RetrievalError::InvalidParameter { name, .. }) if name == "mmr_pool"
        ));
    }

    #[test]
    fn test_unknown_document_type_rejected() {
        assert!(Config::from_toml_str("[retrieval.quotas]\nsource = 1\n").is_err());
    }

    #[test]
    fn test_openai_requires_model_and_dims() {
        assert!(Config::from_toml_str("[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(Config::from_toml_str("[embedding]\nprovider = \"tract\"\n").is_err());
    }
}
