//! Retrieval error taxonomy.
//!
//! Only input errors and cancellation surface as `Err`. Embedding outages,
//! empty corpora, empty compressions, and budget exhaustion all have
//! defined non-error outcomes (see [`crate::models::DegradationFlags`]).

/// Errors surfaced to the caller of a retrieval.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetrievalError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("retrieval cancelled")]
    Cancelled,
}

impl RetrievalError {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        RetrievalError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Why a query embedding could not be obtained.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,

    #[error("embedding timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("embedding provider failed: {0}")]
    Provider(String),
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;
