//! # Recall Harness
//!
//! Hybrid memory retrieval for AI agents.
//!
//! Given a query and a pool of stored fragments, Recall Harness returns a
//! small, diverse, token-budgeted list of compressed facts with source
//! attribution, ready to be placed in a prompt.
//!
//! ## Architecture
//!
//! ```text
//!  FragmentPool ──▶ IndexHandle (BM25 snapshot) ──┐
//!                                                 ├──▶ fuse ──▶ quotas ──▶ MMR ──▶ compress ──▶ budget
//!  query ──▶ EmbeddingProvider (with timeout) ────┘
//!
//!  output: FactRecord list + degradation flags
//! ```
//!
//! The ranking algorithms live in [`recall_harness_core`]; this crate adds
//! configuration, embedding providers, the swappable index, and the async
//! call surface.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Query embedding providers |
//! | [`index`] | Copy-on-rebuild lexical index handle |
//! | [`retrieve`] | Async retrieval with timeout and cancellation |

pub mod config;
pub mod embedding;
pub mod index;
pub mod retrieve;

pub use recall_harness_core as core;
pub use recall_harness_core::models::{
    DegradationFlags, FactRecord, Fragment, Retrieval, RetrievalMode,
};
pub use recall_harness_core::params::RetrievalParams;
pub use retrieve::{RetrievalRequest, Retriever};
