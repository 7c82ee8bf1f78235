//! Fast-path retrieval from a single collection

use super::{RagState, RetrievalStats, SIMPLE_RETRIEVAL};
use crate::collections::{CollectionRegistry, GENERAL_VENDOR};
use crate::document::{CollectionWeight, RoutingResult, RoutingStrategy, WeightedDocument};
use crate::pipeline::{PipelineContext, Stage, StageError};
use crate::providers::{SpanKind, VectorStore};
use crate::retrieval::{CollectionSearchResult, VariantSearch};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Searches one collection directly for simple, single-entity queries
///
/// Skips routing, fusion and reranking. When the collection yields nothing the
/// state is left untouched so the full pipeline runs instead.
pub struct SimpleRetrievalStage {
    registry: Arc<CollectionRegistry>,
    store: Arc<dyn VectorStore>,
    search: VariantSearch,
}

impl SimpleRetrievalStage {
    pub fn new(registry: Arc<CollectionRegistry>, store: Arc<dyn VectorStore>, search: VariantSearch) -> Self {
        Self {
            registry,
            store,
            search,
        }
    }

    /// Collection owning the first detected entity type, else the general collection
    pub fn select_vendor(&self, entity_types: &[String]) -> String {
        entity_types
            .first()
            .and_then(|t| self.registry.vendor_for_entity_type(t))
            .filter(|c| c.enabled)
            .map(|c| c.vendor.clone())
            .unwrap_or_else(|| GENERAL_VENDOR.to_string())
    }

    fn variants(state: &RagState) -> Vec<String> {
        let mut variants = vec![state.effective_query.clone()];
        if let Some(intent) = &state.intent {
            let focus = intent.primary_focus.trim();
            if !focus.is_empty() && !focus.eq_ignore_ascii_case(state.effective_query.trim()) {
                variants.push(focus.to_string());
            }
        }
        variants
    }
}

#[async_trait]
impl Stage<RagState> for SimpleRetrievalStage {
    fn name(&self) -> &str {
        SIMPLE_RETRIEVAL
    }

    async fn can_execute(&self, state: &RagState, _ctx: &PipelineContext) -> bool {
        state
            .intent
            .as_ref()
            .map(|i| i.needs_retrieval() && i.should_use_fast_path())
            .unwrap_or(false)
    }

    async fn execute(
        &self,
        mut state: RagState,
        ctx: &mut PipelineContext,
    ) -> Result<RagState, StageError> {
        let started = Instant::now();
        let entity_types = state
            .intent
            .as_ref()
            .map(|i| i.entity_types.clone())
            .unwrap_or_default();
        let vendor = self.select_vendor(&entity_types);
        let collection = self.registry.collection_name(&vendor);
        let variants = Self::variants(&state);

        info!("Fast path: searching {} directly", vendor);
        let output = self
            .search
            .run(
                self.store.as_ref(),
                &collection,
                &variants,
                state.limit,
                state.filter.as_ref(),
            )
            .await;

        let mut hits = output.merged();
        hits.truncate(state.limit);
        let duration_ms = started.elapsed().as_millis() as u64;

        ctx.record_span(
            SIMPLE_RETRIEVAL,
            SpanKind::Retrieval,
            json!({ "query": state.effective_query, "vendor": vendor, "fast_path": true }),
            json!({ "documents": hits.len(), "duration_ms": duration_ms }),
        );

        if hits.is_empty() {
            debug!("Fast path found nothing in {}, continuing with full retrieval", vendor);
            return Ok(state);
        }

        state.documents = hits
            .iter()
            .map(|(doc, score)| WeightedDocument::single(doc.clone(), vendor.clone(), 1.0, *score))
            .collect();
        state.collection_results = vec![CollectionSearchResult {
            vendor: vendor.clone(),
            weight: 1.0,
            query: state.effective_query.clone(),
            documents: hits,
            duration_ms,
            error: None,
        }];
        state.routing = Some(RoutingResult {
            selected_collections: vec![CollectionWeight::new(vendor, 1.0)
                .with_reasoning("Fast path heuristic selection")],
            strategy: RoutingStrategy::Single,
            confidence: 1.0,
            reasoning: "Simple query using heuristic-based collection selection".to_string(),
            suggested_entity_types: (!entity_types.is_empty()).then_some(entity_types),
        });
        state.stats = RetrievalStats {
            queries_executed: output.queries_executed,
            duration_ms,
            ..RetrievalStats::default()
        };
        state.fast_path = true;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::QueryAnalyzer;
    use crate::stages::test_support::sample_store;
    use std::time::Duration;

    fn stage() -> SimpleRetrievalStage {
        SimpleRetrievalStage::new(
            Arc::new(CollectionRegistry::builtin()),
            Arc::new(sample_store()),
            VariantSearch::new(2, Duration::from_secs(1)),
        )
    }

    fn analyzed(query: &str) -> RagState {
        let mut state = RagState::new(query, 10);
        state.intent = Some(QueryAnalyzer::builtin().unwrap().analyze(query));
        state
    }

    #[test]
    fn test_vendor_selection() {
        let stage = stage();
        assert_eq!(stage.select_vendor(&["recently_played".to_string()]), "spotify");
        assert_eq!(stage.select_vendor(&["pull_request".to_string()]), "github");
        assert_eq!(stage.select_vendor(&[]), GENERAL_VENDOR);
        assert_eq!(stage.select_vendor(&["hologram".to_string()]), GENERAL_VENDOR);
    }

    #[tokio::test]
    async fn test_fast_path_fills_single_collection() {
        let state = analyzed("show my merged prs");
        let ctx = PipelineContext::new();
        assert!(stage().can_execute(&state, &ctx).await);

        let mut ctx = ctx;
        let state = stage().execute(state, &mut ctx).await.unwrap();
        assert!(state.fast_path);
        assert_eq!(state.documents.len(), 2);
        assert!(state.documents.iter().all(|d| d.collection_vendor == "github"));
        assert_eq!(state.routing.unwrap().strategy, RoutingStrategy::Single);
    }

    #[tokio::test]
    async fn test_empty_fast_path_defers_to_full_pipeline() {
        let state = analyzed("show my kubernetes prs");
        let mut ctx = PipelineContext::new();
        let mut state = stage().execute(state, &mut ctx).await.unwrap();
        assert!(!state.fast_path);
        assert!(state.documents.is_empty());
        assert!(state.routing.is_none());

        // temporal queries never take the fast path
        state.intent = Some(QueryAnalyzer::builtin().unwrap().analyze("prs merged yesterday"));
        assert!(!stage().can_execute(&state, &ctx).await);
    }
}
