//! Parallel search over the routed collections

use super::{RagState, RetrievalCache, RetrievalStats, RETRIEVAL};
use crate::pipeline::{PipelineContext, Stage, StageError};
use crate::providers::SpanKind;
use crate::retrieval::MultiCollectionRetriever;
use crate::routing::CollectionRouter;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

pub struct RetrievalStage {
    retriever: Arc<MultiCollectionRetriever>,
    router: Arc<CollectionRouter>,
    cache: Option<Arc<RetrievalCache>>,
}

impl RetrievalStage {
    pub fn new(retriever: Arc<MultiCollectionRetriever>, router: Arc<CollectionRouter>) -> Self {
        Self {
            retriever,
            router,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<RetrievalCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

#[async_trait]
impl Stage<RagState> for RetrievalStage {
    fn name(&self) -> &str {
        RETRIEVAL
    }

    async fn can_execute(&self, state: &RagState, _ctx: &PipelineContext) -> bool {
        state.needs_search() && state.routing.is_some()
    }

    async fn execute(
        &self,
        mut state: RagState,
        ctx: &mut PipelineContext,
    ) -> Result<RagState, StageError> {
        let routing = state
            .routing
            .as_ref()
            .ok_or_else(|| StageError::missing_input(RETRIEVAL, "routing"))?;

        let output = self
            .retriever
            .retrieve(
                &state.effective_query,
                &routing.selected_collections,
                state.filter.as_ref(),
                Some(state.limit),
            )
            .await;

        ctx.record_span(
            RETRIEVAL,
            SpanKind::Retrieval,
            json!({
                "query": state.effective_query,
                "collections": routing.vendor_list(),
                "time_filtered": state.filter.as_ref().map(|f| f.time_range.is_some()).unwrap_or(false),
            }),
            json!({
                "documents_per_collection": output.documents_per_collection(),
                "failed": output.failed_collections,
                "time_filter_dropped": output.time_filter_dropped,
                "duration_ms": output.duration.as_millis() as u64,
            }),
        );

        // a vanished collection makes every cached routing and result suspect
        if !output.missing_collections.is_empty() {
            warn!(
                "Collections missing from the store: {:?}, invalidating caches",
                output.missing_collections
            );
            self.router.invalidate_existence();
            if let Some(cache) = &self.cache {
                cache.invalidate_all();
            }
        }

        if output.all_failed() {
            return Err(StageError::failed(
                RETRIEVAL,
                format!(
                    "every collection search failed: {}",
                    output.failed_collections.join(", ")
                ),
            ));
        }

        let total = output.total_documents();
        if let (Some(cache), Some(context)) = (&self.cache, &state.cache_context) {
            if total > 0 && output.missing_collections.is_empty() {
                cache.set(&state.effective_query, context, output.results.clone());
            }
        }

        info!("Retrieval produced {} documents", total);
        state.stats = RetrievalStats {
            queries_executed: output.queries_executed,
            duration_ms: output.duration.as_millis() as u64,
            failed_collections: output.failed_collections,
            missing_collections: output.missing_collections,
            time_filter_dropped: output.time_filter_dropped,
        };
        state.collection_results = output.results;
        Ok(state)
    }

    async fn on_error(
        &self,
        error: &StageError,
        input: &RagState,
        _ctx: &mut PipelineContext,
    ) -> Option<RagState> {
        let mut state = input.clone();
        state.fallback_reason = Some(format!("retrieval unavailable: {}", error));
        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::collection_context;
    use crate::collections::CollectionRegistry;
    use crate::document::{CollectionWeight, RoutingResult, RoutingStrategy};
    use crate::providers::{MemoryVectorStore, SearchFilter, TimeRange, VectorStore};
    use crate::retrieval::RetrievalSettings;
    use crate::routing::RouterSettings;
    use crate::stages::test_support::sample_store;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    struct Fixture {
        stage: RetrievalStage,
        cache: Arc<RetrievalCache>,
    }

    fn fixture(store: Arc<dyn VectorStore>) -> Fixture {
        let registry = Arc::new(CollectionRegistry::builtin());
        let router = Arc::new(
            CollectionRouter::new(registry.clone(), store.clone(), RouterSettings::default()).unwrap(),
        );
        let retriever = Arc::new(MultiCollectionRetriever::new(
            store,
            registry,
            RetrievalSettings::default(),
        ));
        let cache = Arc::new(RetrievalCache::new(Duration::from_secs(60), 8));
        Fixture {
            stage: RetrievalStage::new(retriever, router).with_cache(cache.clone()),
            cache,
        }
    }

    fn routed(query: &str, vendors: &[&str]) -> RagState {
        let mut state = RagState::new(query, 10);
        state.routing = Some(RoutingResult {
            selected_collections: vendors.iter().map(|v| CollectionWeight::new(*v, 1.0)).collect(),
            strategy: RoutingStrategy::infer(vendors.len()),
            confidence: 0.9,
            reasoning: "test".to_string(),
            suggested_entity_types: None,
        });
        state.cache_context = Some(collection_context(vendors));
        state
    }

    #[tokio::test]
    async fn test_results_are_cached() {
        let f = fixture(Arc::new(sample_store()));
        let mut ctx = PipelineContext::new();
        let state = f
            .stage
            .execute(routed("merged parser retry", &["github", "spotify"]), &mut ctx)
            .await
            .unwrap();

        assert_eq!(state.collection_results.len(), 2);
        assert_eq!(state.stats.queries_executed, 2);
        let cached = f.cache.get("merged parser retry", "collections:github,spotify");
        assert_eq!(cached, Some(state.collection_results));
    }

    #[tokio::test]
    async fn test_missing_collection_invalidates_cache() {
        let f = fixture(Arc::new(sample_store()));
        f.cache.set("older query", "collections:github", Vec::new());

        let mut ctx = PipelineContext::new();
        let state = f
            .stage
            .execute(routed("merged parser retry", &["github", "linear"]), &mut ctx)
            .await
            .unwrap();

        assert_eq!(state.stats.missing_collections, vec!["linear".to_string()]);
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn test_total_failure_recovers_with_fallback_reason() {
        let f = fixture(Arc::new(MemoryVectorStore::new()));
        let mut ctx = PipelineContext::new();
        let input = routed("merged parser retry", &["github"]);
        let err = f.stage.execute(input.clone(), &mut ctx).await.unwrap_err();

        let recovered = f.stage.on_error(&err, &input, &mut ctx).await.unwrap();
        assert!(recovered.fallback_reason.unwrap().contains("retrieval unavailable"));
        assert!(recovered.collection_results.is_empty());
    }

    #[tokio::test]
    async fn test_empty_time_window_drops_filter() {
        let f = fixture(Arc::new(sample_store()));
        let mut state = routed("merged parser retry", &["github"]);
        state.filter = Some(SearchFilter {
            types: None,
            time_range: Some(TimeRange::new(
                Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            )),
        });

        let mut ctx = PipelineContext::new();
        let state = f.stage.execute(state, &mut ctx).await.unwrap();
        assert!(state.stats.time_filter_dropped);
        assert_eq!(state.stats.queries_executed, 2);
        assert!(!state.collection_results[0].documents.is_empty());
    }
}
