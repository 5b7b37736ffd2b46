//! Core data models used throughout Recall Harness.
//!
//! These types represent the fragments, scored candidates, and fact records
//! that flow through the retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::address::content_id;

/// An immutable unit of retrievable knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Content address, see [`crate::address::content_id`].
    pub id: String,
    pub text: String,
    pub source_uri: String,
    pub version_tag: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    /// Pre-computed embedding, if the memory store has one.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Explicit document type; inferred by the classifier when absent.
    #[serde(default)]
    pub doc_type: Option<DocumentType>,
    /// Externally supplied prior relevance weight.
    #[serde(default)]
    pub salience: f64,
}

impl Fragment {
    /// Create a fragment whose id is derived from its content and provenance.
    pub fn new(
        text: impl Into<String>,
        source_uri: impl Into<String>,
        version_tag: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let source_uri = source_uri.into();
        let version_tag = version_tag.into();
        Self {
            id: content_id(&text, &source_uri, &version_tag),
            text,
            source_uri,
            version_tag,
            path: None,
            repo: None,
            embedding: None,
            doc_type: None,
            salience: 0.0,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_doc_type(mut self, doc_type: DocumentType) -> Self {
        self.doc_type = Some(doc_type);
        self
    }

    pub fn with_salience(mut self, salience: f64) -> Self {
        self.salience = salience;
        self
    }
}

/// A fragment with a score and its 0-based rank within one ranked list.
#[derive(Debug, Clone)]
pub struct ScoredFragment {
    pub fragment: Arc<Fragment>,
    /// Raw score from the producing scorer (BM25, cosine, or overlap).
    pub score: f64,
    /// Score mapped into `[0, 1]` for cross-scorer comparability.
    pub similarity: f64,
    pub rank: usize,
}

/// Closed set of document-type labels used for quota bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    ReadmeOverview,
    ApiExamples,
    Metadata,
    Paper,
    Code,
    Documentation,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        DocumentType::ReadmeOverview,
        DocumentType::ApiExamples,
        DocumentType::Metadata,
        DocumentType::Paper,
        DocumentType::Code,
        DocumentType::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::ReadmeOverview => "readme_overview",
            DocumentType::ApiExamples => "api_examples",
            DocumentType::Metadata => "metadata",
            DocumentType::Paper => "paper",
            DocumentType::Code => "code",
            DocumentType::Documentation => "documentation",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown document type: {s}"))
    }
}

/// Which ranked list(s) a fused candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Lexical,
    Vector,
    Hybrid,
}

/// How much of the retrieval machinery was available for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// A query embedding was obtained; lexical and vector rankings were fused.
    Full,
    /// No query embedding; the lexical ranking was passed through.
    LexicalOnly,
    /// No query embedding and no lexical match; ranked by salience prior.
    Degraded,
}

/// The terminal output unit: a compressed, attributable fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRecord {
    pub id: String,
    /// Boosted fused score, rounded to 2 decimals.
    pub score: f64,
    pub source: String,
    pub fact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<FactExplanation>,
}

/// Scoring breakdown for a fact (populated when `explain` is requested).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactExplanation {
    pub provenance: Provenance,
    pub doc_type: DocumentType,
    /// 0-based rank in the lexical list, if present there.
    pub lexical_rank: Option<usize>,
    /// 0-based rank in the vector list, if present there.
    pub vector_rank: Option<usize>,
    /// Normalized RRF score before the document-type boost.
    pub fused_score: f64,
    pub boost: f64,
}

/// Flags that let callers tell full-quality retrieval from degraded paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DegradationFlags {
    pub lexical_only: bool,
    pub forced_inclusion: bool,
    pub quota_backfilled: bool,
}

/// Per-call counters for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetrievalStats {
    pub corpus_size: usize,
    pub lexical_candidates: usize,
    /// Vector candidates scored by embedding cosine similarity.
    pub vector_candidates: usize,
    /// Vector candidates scored by the token-overlap fallback.
    pub overlap_fallbacks: usize,
    pub fused_candidates: usize,
    pub admitted: usize,
    pub compression_dropped: usize,
    pub estimated_tokens: usize,
}

/// Result of a retrieval call.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub facts: Vec<FactRecord>,
    pub flags: DegradationFlags,
    pub mode: RetrievalMode,
    pub stats: RetrievalStats,
    /// Why the query embedding was unavailable, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_error: Option<String>,
}

impl Retrieval {
    /// An empty, non-degraded result (e.g. for an empty corpus).
    pub fn empty(mode: RetrievalMode) -> Self {
        Self {
            facts: Vec::new(),
            flags: DegradationFlags {
                lexical_only: mode != RetrievalMode::Full,
                ..DegradationFlags::default()
            },
            mode,
            stats: RetrievalStats::default(),
            embedding_error: None,
        }
    }
}
