//! Concrete stages of the retrieval pipeline
//!
//! Every stage reads and extends one [`RagState`]. The default order is
//! analysis, fast-path retrieval, routing, retrieval, fusion, reranking and context
//! building; stages that do not apply to a request pass the state through.

mod analysis;
mod context;
mod fusion;
mod rerank;
mod retrieval;
mod routing;
mod simple;

pub use analysis::QueryAnalysisStage;
pub use context::ContextBuildingStage;
pub use fusion::FusionStage;
pub use rerank::RerankingStage;
pub use retrieval::RetrievalStage;
pub use routing::CollectionRoutingStage;
pub use simple::SimpleRetrievalStage;

use crate::analysis::{ConversationTurn, QueryIntent};
use crate::cache::SemanticCache;
use crate::document::{RetrievalMetadata, RetrievalOutput, RoutingResult, WeightedDocument};
use crate::providers::SearchFilter;
use crate::retrieval::CollectionSearchResult;
use crate::temporal::BuiltContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const QUERY_ANALYSIS: &str = "query-analysis";
pub const SIMPLE_RETRIEVAL: &str = "simple-retrieval";
pub const COLLECTION_ROUTING: &str = "collection-routing";
pub const RETRIEVAL: &str = "retrieval";
pub const FUSION: &str = "fusion";
pub const RERANKING: &str = "reranking";
pub const CONTEXT_BUILDING: &str = "context-building";

/// Per-collection results memoized by normalized query and collection context
pub type RetrievalCache = SemanticCache<Vec<CollectionSearchResult>>;

/// Retrieval bookkeeping accumulated by the stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub queries_executed: usize,
    pub duration_ms: u64,
    pub failed_collections: Vec<String>,
    pub missing_collections: Vec<String>,
    pub time_filter_dropped: bool,
}

/// State threaded through the retrieval pipeline
#[derive(Debug, Clone)]
pub struct RagState {
    /// Query as the caller sent it
    pub query: String,
    /// Query used for routing and search (rewritten when a rewrite happened)
    pub effective_query: String,
    pub messages: Vec<ConversationTurn>,
    pub limit: usize,
    /// Reference time for resolving relative time phrases
    pub now: DateTime<Utc>,

    pub intent: Option<QueryIntent>,
    pub rewritten: bool,
    pub filter: Option<SearchFilter>,

    pub routing: Option<RoutingResult>,
    /// `collections:<sorted vendors>` when the semantic cache is in use
    pub cache_context: Option<String>,
    pub from_cache: bool,
    pub fast_path: bool,

    pub collection_results: Vec<CollectionSearchResult>,
    pub stats: RetrievalStats,
    pub documents: Vec<WeightedDocument>,
    pub reranked: bool,
    pub context: Option<BuiltContext>,

    /// Why the run degraded, when it did
    pub fallback_reason: Option<String>,
}

impl RagState {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        let query = query.into();
        Self {
            effective_query: query.clone(),
            query,
            messages: Vec::new(),
            limit,
            now: Utc::now(),
            intent: None,
            rewritten: false,
            filter: None,
            routing: None,
            cache_context: None,
            from_cache: false,
            fast_path: false,
            collection_results: Vec::new(),
            stats: RetrievalStats::default(),
            documents: Vec::new(),
            reranked: false,
            context: None,
            fallback_reason: None,
        }
    }

    pub fn with_messages(mut self, messages: Vec<ConversationTurn>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Greetings skip retrieval; an unanalyzed query is assumed to need it
    pub fn needs_retrieval(&self) -> bool {
        self.intent
            .as_ref()
            .map(QueryIntent::needs_retrieval)
            .unwrap_or(true)
    }

    /// Retrieval ran through the full path (not the fast path, not the cache)
    pub fn needs_search(&self) -> bool {
        self.needs_retrieval() && !self.fast_path && !self.from_cache
    }

    pub fn retrieval_metadata(&self) -> RetrievalMetadata {
        RetrievalMetadata {
            queries_executed: self.stats.queries_executed,
            total_duration_ms: self.stats.duration_ms,
            documents_per_collection: self
                .collection_results
                .iter()
                .map(|r| (r.vendor.clone(), r.documents.len()))
                .collect(),
            from_cache: self.from_cache,
        }
    }

    /// Final documents with their bookkeeping
    pub fn retrieval_output(&self) -> RetrievalOutput {
        RetrievalOutput {
            documents: self.documents.clone(),
            retrieval_metadata: self.retrieval_metadata(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::document::Document;
    use crate::providers::{GenerationModel, MemoryVectorStore, ModelError};
    use async_trait::async_trait;
    use serde_json::Value;

    /// Store with a few github and spotify documents from October 2026
    pub fn sample_store() -> MemoryVectorStore {
        let store = MemoryVectorStore::new();
        store.insert_collection(
            "github_collection",
            vec![
                Document::new("Merged cache eviction fix")
                    .with_id("pr-1")
                    .with_type("pull_request")
                    .with_attr("title", "Cache eviction fix")
                    .with_attr("number", 41)
                    .with_attr("merged", true)
                    .with_attr("mergedAt", "2026-10-12T15:00:00Z"),
                Document::new("Merged retry logic for parser")
                    .with_id("pr-2")
                    .with_type("pull_request")
                    .with_attr("title", "Parser retry")
                    .with_attr("number", 42)
                    .with_attr("merged", true)
                    .with_attr("mergedAt", "2026-10-14T09:00:00Z"),
            ],
        );
        store.insert_collection(
            "spotify_collection",
            vec![Document::new("Played Teardrop by Massive Attack")
                .with_id("rp-1")
                .with_type("recently_played")
                .with_attr("trackName", "Teardrop")
                .with_attr("artist", "Massive Attack")
                .with_attr("playedAt", "2026-10-14T09:30:00Z")],
        );
        store
    }

    /// Generation model that is always offline
    pub struct OfflineModel;

    #[async_trait]
    impl GenerationModel for OfflineModel {
        async fn generate_structured(
            &self,
            _schema: &Value,
            _prompt: &str,
            _temperature: f32,
        ) -> Result<Value, ModelError> {
            Err(ModelError::Generation("offline".to_string()))
        }
    }
}
