//! # clawboard-search
//!
//! Hybrid search over topics, tasks, and logs: semantic similarity from the
//! vector index, BM25 and Jaccard over the candidate window, RRF fusion, an
//! optional rerank blend, parent/child score propagation, curated-note
//! weighting, session-continuity boosts, and space scoping, all behind a
//! single-flight admission gate with a degraded busy fallback.

mod bm25;
mod error;
mod gate;
mod pipeline;
mod rerank;
mod rrf;
mod text;

pub use bm25::{best_chunk, BestChunk, Bm25Window};
pub use error::SearchError;
pub use gate::{Admission, AdmissionGate, DEFAULT_GATE_WAIT};
pub use pipeline::{Explain, Hit, SearchEngine, SearchLimits, SearchMeta, SearchOutcome, SearchRequest};
pub use rerank::Reranker;
pub use rrf::{fuse, RRF_K};
pub use text::{lexical_similarity, normalize, session_matches, token_set};
