//! # Recall Harness Core
//!
//! Pure retrieval logic for Recall Harness: content addressing, the BM25
//! lexical index, vector scoring, reciprocal rank fusion, document-type
//! quotas, MMR diversity selection, fact compression, and token budgeting.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. The calling
//! application obtains the query embedding, builds [`params::RetrievalParams`],
//! and hands both to [`pipeline::rank_facts`] together with an index snapshot.
//!
//! ```text
//!  query ──┬──▶ lexical (BM25) ──┐
//!          │                     ├──▶ fuse (RRF) ──▶ classify + quotas ──▶ MMR ──▶ compress ──▶ budget
//!  qvec ───┴──▶ vector (cosine) ─┘
//! ```

pub mod address;
pub mod budget;
pub mod classify;
pub mod compress;
pub mod diversity;
pub mod error;
pub mod fusion;
pub mod lexical;
pub mod models;
pub mod params;
pub mod pipeline;
pub mod pool;
pub mod tokenize;
pub mod vector;
