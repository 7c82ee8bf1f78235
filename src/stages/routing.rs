//! Collection routing, fronted by the semantic cache

use super::{RagState, RetrievalCache, COLLECTION_ROUTING};
use crate::cache::collection_context;
use crate::document::{CollectionWeight, RoutingResult, RoutingStrategy};
use crate::pipeline::{PipelineContext, Stage, StageError};
use crate::providers::SpanKind;
use crate::retrieval::CollectionSearchResult;
use crate::routing::CollectionRouter;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

pub struct CollectionRoutingStage {
    router: Arc<CollectionRouter>,
    cache: Option<Arc<RetrievalCache>>,
}

impl CollectionRoutingStage {
    pub fn new(router: Arc<CollectionRouter>) -> Self {
        Self {
            router,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<RetrievalCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Routing reconstructed from cached per-collection results
fn cached_routing(results: &[CollectionSearchResult]) -> RoutingResult {
    let selected: Vec<CollectionWeight> = results
        .iter()
        .map(|r| CollectionWeight::new(r.vendor.clone(), r.weight))
        .collect();
    RoutingResult {
        strategy: RoutingStrategy::infer(selected.len()),
        selected_collections: selected,
        confidence: 1.0,
        reasoning: "Served from semantic cache".to_string(),
        suggested_entity_types: None,
    }
}

#[async_trait]
impl Stage<RagState> for CollectionRoutingStage {
    fn name(&self) -> &str {
        COLLECTION_ROUTING
    }

    async fn can_execute(&self, state: &RagState, _ctx: &PipelineContext) -> bool {
        state.needs_retrieval() && !state.fast_path
    }

    async fn execute(
        &self,
        mut state: RagState,
        ctx: &mut PipelineContext,
    ) -> Result<RagState, StageError> {
        if let Some(cache) = &self.cache {
            let context = collection_context(&self.router.existing_vendors().await);
            if let Some(results) = cache.get(&state.effective_query, &context) {
                info!("Semantic cache hit for {:?} ({})", state.effective_query, context);
                state.routing = Some(cached_routing(&results));
                state.collection_results = results;
                state.from_cache = true;
                state.cache_context = Some(context);
                return Ok(state);
            }
            debug!("Semantic cache miss ({})", context);
            state.cache_context = Some(context);
        }

        let routing = self
            .router
            .route(&state.effective_query, state.intent.as_ref())
            .await;

        ctx.record_span(
            COLLECTION_ROUTING,
            SpanKind::Routing,
            json!({ "query": state.effective_query }),
            json!({
                "strategy": routing.strategy,
                "confidence": routing.confidence,
                "collections": routing.vendor_list(),
                "reasoning": routing.reasoning,
            }),
        );

        if routing.selected_collections.is_empty() {
            return Err(StageError::failed(
                COLLECTION_ROUTING,
                "no collections available for this query",
            ));
        }

        state.routing = Some(routing);
        Ok(state)
    }
}
