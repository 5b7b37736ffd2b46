//! Async retrieval front end.
//!
//! A [`Retriever`] pairs an [`IndexHandle`] with an [`EmbeddingProvider`].
//! Each call:
//!
//! 1. Validates the request ([`RetrievalError::EmptyQuery`],
//!    [`RetrievalError::InvalidParameter`]).
//! 2. Takes an index snapshot.
//! 3. Runs BM25 on a blocking thread while the query embedding is fetched
//!    under a timeout, and joins both.
//! 4. Hands both rankings to the core pipeline. A missing embedding, for
//!    any reason, degrades the call to lexical-only; it never fails it.
//!
//! Dropping the returned future cancels the call. [`Retriever::retrieve_until`]
//! does the same on a caller-supplied signal and reports it as
//! [`RetrievalError::Cancelled`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use recall_harness_core::error::{EmbeddingError, RetrievalError, RetrievalResult};
use recall_harness_core::models::Retrieval;
use recall_harness_core::params::RetrievalParams;
use recall_harness_core::pipeline::{
    check_request, has_magnitude, lexical_candidates, rank_from_lexical, RankInput,
};

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::index::IndexHandle;

/// One retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    /// Restrict retrieval to these fragment ids.
    pub scope: Option<HashSet<String>>,
    pub params: RetrievalParams,
    /// Attach scoring breakdowns to every fact.
    pub explain: bool,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: None,
            params: RetrievalParams::default(),
            explain: false,
        }
    }

    pub fn with_params(mut self, params: RetrievalParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_scope(mut self, scope: HashSet<String>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }
}

pub struct Retriever {
    index: Arc<IndexHandle>,
    provider: Arc<dyn EmbeddingProvider>,
    embed_timeout: Duration,
}

impl Retriever {
    pub fn new(index: Arc<IndexHandle>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            provider,
            embed_timeout: Duration::from_millis(2000),
        }
    }

    /// Build a retriever with the provider and timeout from `config`.
    pub fn from_config(config: &Config, index: Arc<IndexHandle>) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        Ok(Self::new(index, provider).with_timeout(Duration::from_millis(config.embedding.timeout_ms)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn index(&self) -> &Arc<IndexHandle> {
        &self.index
    }

    /// Retrieve facts for one request.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> RetrievalResult<Retrieval> {
        check_request(&request.query, &request.params)?;
        let snapshot = self.index.snapshot();

        let lexical_task = {
            let snapshot = Arc::clone(&snapshot);
            let query = request.query.clone();
            let scope = request.scope.clone();
            let params = request.params.clone();
            tokio::task::spawn_blocking(move || {
                lexical_candidates(&snapshot, &query, scope.as_ref(), &params)
            })
        };

        let (lexical, embedding) = tokio::join!(lexical_task, self.embed(&request.query));

        let lexical = match lexical {
            Ok(lexical) => lexical,
            Err(e) => {
                warn!(error = %e, "lexical scoring task failed, scoring inline");
                lexical_candidates(&snapshot, &request.query, request.scope.as_ref(), &request.params)
            }
        };

        let (query_vec, embedding_error) = match embedding {
            Ok(vector) => (Some(vector), None),
            Err(EmbeddingError::Disabled) => {
                debug!("embedding disabled, ranking lexical-only");
                (None, Some(EmbeddingError::Disabled.to_string()))
            }
            Err(e) => {
                warn!(error = %e, "query embedding unavailable, falling back to lexical-only");
                (None, Some(e.to_string()))
            }
        };

        let mut input = RankInput::new(&request.query).with_explain(request.explain);
        if let Some(vector) = query_vec.as_deref() {
            input = input.with_vector(vector);
        }
        if let Some(scope) = request.scope.as_ref() {
            input = input.with_scope(scope);
        }

        let mut retrieval = rank_from_lexical(&snapshot, input, lexical, &request.params);
        retrieval.embedding_error = embedding_error;
        Ok(retrieval)
    }

    /// Like [`retrieve`](Self::retrieve), but abandons the call with
    /// [`RetrievalError::Cancelled`] as soon as `cancel` completes.
    pub async fn retrieve_until<F>(
        &self,
        request: &RetrievalRequest,
        cancel: F,
    ) -> RetrievalResult<Retrieval>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                debug!(query = %request.query, "retrieval cancelled");
                Err(RetrievalError::Cancelled)
            }
            result = self.retrieve(request) => result,
        }
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        match tokio::time::timeout(self.embed_timeout, self.provider.embed_query(query)).await {
            Ok(Ok(vector)) if vector.is_empty() => {
                Err(EmbeddingError::Provider("empty embedding".to_string()))
            }
            Ok(Ok(vector)) if !has_magnitude(&vector) => {
                Err(EmbeddingError::Provider("zero-magnitude embedding".to_string()))
            }
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout {
                after_ms: self.embed_timeout.as_millis() as u64,
            }),
        }
    }
}
