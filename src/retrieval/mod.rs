//! Multi-collection retrieval, fusion and reranking
//!
//! Searches run per collection in parallel, then weighted reciprocal rank fusion
//! merges the ranked lists, the diversity enforcer reshapes the result so no single
//! source dominates, and an optional reranker reorders each collection's slice.

mod adaptation;
mod deduplication;
mod diversity;
mod fusion;
mod multi_collection;
mod reranker;
mod variants;

pub use adaptation::{AdaptationCache, QueryAdapter};
pub use deduplication::{deduplicate_documents, deduplicate_scored};
pub use diversity::{DiversityConfig, DiversityEnforcer, DiversityStrategy};
pub use fusion::{FusionConfig, FusionError, WeightedRankFusion};
pub use multi_collection::{
    MultiCollectionOutput, MultiCollectionRetriever, RetrievalSettings, MAX_CONCURRENCY, MIN_CONCURRENCY,
};
pub use reranker::{CollectionReranker, RerankSettings};
pub use variants::{VariantSearch, VariantSearchOutput};

use crate::document::Document;
use serde::{Deserialize, Serialize};

/// Ranked hits from one collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSearchResult {
    pub vendor: String,
    pub weight: f32,

    /// Query text actually sent to the store (after adaptation)
    pub query: String,

    /// `(document, relevance)` pairs, best first
    pub documents: Vec<(Document, f32)>,

    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CollectionSearchResult {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}
