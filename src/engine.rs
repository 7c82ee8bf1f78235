//! Retrieval engine: the single entry point of the crate
//!
//! [`RetrievalEngine`] wires the stages into one continue-on-error pipeline, runs a
//! request through it and turns the final [`RagState`] into a [`RetrievalResponse`].
//! Collaborators (vector store, generation and rerank models, recorder) are injected
//! through [`EngineBuilder`]; caches are created per engine unless one is supplied.

use crate::analysis::{ConversationTurn, QueryIntent, QueryRewriter};
use crate::collections::CollectionRegistry;
use crate::config::Config;
use crate::document::{RetrievalMetadata, RetrievalOutput, RoutingResult, WeightedDocument};
use crate::error::{RecallError, Result};
use crate::pipeline::{ExecuteOptions, Pipeline, PipelineContext, StageResult};
use crate::providers::{GenerationModel, Recorder, RerankModel, TraceHandle, VectorStore};
use crate::retrieval::{
    AdaptationCache, CollectionReranker, DiversityEnforcer, MultiCollectionRetriever,
    QueryAdapter, VariantSearch, WeightedRankFusion,
};
use crate::routing::CollectionRouter;
use crate::stages::{
    CollectionRoutingStage, ContextBuildingStage, FusionStage, QueryAnalysisStage, RagState,
    RerankingStage, RetrievalCache, RetrievalStage, SimpleRetrievalStage,
};
use crate::temporal::{ContextBuilder, ContextMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const PIPELINE_NAME: &str = "rag-retrieval";

/// One retrieval request
#[derive(Debug, Clone, Default)]
pub struct RetrievalRequest {
    pub query: String,
    /// Prior conversation, oldest first
    pub messages: Vec<ConversationTurn>,
    /// Overrides `retrieval.limit`
    pub limit: Option<usize>,
    pub trace: Option<TraceHandle>,
    pub skip_stages: Vec<String>,
    pub metadata: Map<String, Value>,
    /// Reference time for relative phrases; the current time when absent
    pub now: Option<DateTime<Utc>>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_messages(mut self, messages: Vec<ConversationTurn>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_trace(mut self, trace: TraceHandle) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn skip_stage(mut self, stage: impl Into<String>) -> Self {
        self.skip_stages.push(stage.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

/// Evidence for one query, ready for the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub documents: Vec<WeightedDocument>,
    /// Rendered context; empty when nothing was retrieved
    pub context: String,
    pub retrieval_metadata: RetrievalMetadata,
    pub context_metadata: ContextMetadata,
    pub routing: Option<RoutingResult>,
    pub intent: Option<QueryIntent>,
    /// Query actually searched when a rewrite happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_query: Option<String>,
    pub fast_path: bool,
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub stage_results: Vec<StageResult>,
}

impl RetrievalResponse {
    /// Degraded response produced without running the pipeline
    fn degraded(reason: impl Into<String>) -> Self {
        Self {
            documents: Vec::new(),
            context: String::new(),
            retrieval_metadata: RetrievalMetadata::default(),
            context_metadata: ContextMetadata::default(),
            routing: None,
            intent: None,
            rewritten_query: None,
            fast_path: false,
            fallback_used: true,
            fallback_reason: Some(reason.into()),
            stage_results: Vec::new(),
        }
    }

    fn from_state(state: RagState, stage_error: Option<String>, stage_results: Vec<StageResult>) -> Self {
        let RetrievalOutput {
            documents,
            retrieval_metadata,
        } = state.retrieval_output();
        let fallback_reason = state.fallback_reason.clone().or(stage_error);
        let (context, context_metadata) = match state.context {
            Some(built) => (built.text, built.metadata),
            None => (String::new(), ContextMetadata::default()),
        };

        Self {
            documents,
            context,
            retrieval_metadata,
            context_metadata,
            routing: state.routing,
            intent: state.intent,
            rewritten_query: state.rewritten.then_some(state.effective_query),
            fast_path: state.fast_path,
            fallback_used: fallback_reason.is_some(),
            fallback_reason,
            stage_results,
        }
    }
}

/// Runs retrieval requests through the stage pipeline
pub struct RetrievalEngine {
    pipeline: Pipeline<RagState>,
    router: Arc<CollectionRouter>,
    cache: Option<Arc<RetrievalCache>>,
    recorder: Option<Arc<dyn Recorder>>,
    limit: usize,
    telemetry: bool,
}

impl RetrievalEngine {
    pub fn builder(store: Arc<dyn VectorStore>) -> EngineBuilder {
        EngineBuilder::new(store)
    }

    /// Retrieve evidence for a request
    ///
    /// Never fails: collaborator outages degrade the response and are reported
    /// through `fallback_used` and `fallback_reason`.
    pub async fn retrieve(&self, request: RetrievalRequest) -> RetrievalResponse {
        if request.query.trim().is_empty() {
            warn!("Empty query, skipping retrieval");
            return RetrievalResponse::degraded("empty query");
        }

        let limit = request.limit.filter(|l| *l > 0).unwrap_or(self.limit);
        let mut state = RagState::new(request.query, limit).with_messages(request.messages);
        if let Some(now) = request.now {
            state = state.with_now(now);
        }

        let mut ctx = PipelineContext::new().with_metadata(request.metadata);
        if let Some(trace) = request.trace {
            ctx = ctx.with_trace(trace);
        }
        if let Some(recorder) = &self.recorder {
            ctx = ctx.with_recorder(Arc::clone(recorder));
        }

        let options = ExecuteOptions::default()
            .skip(request.skip_stages)
            .with_telemetry(self.telemetry);
        let fallback_state = state.clone();
        let result = self.pipeline.execute(state, &mut ctx, &options).await;

        let stage_error = result.error.as_ref().map(|e| e.to_string());
        let final_state = result.data.unwrap_or(fallback_state);
        let response = RetrievalResponse::from_state(final_state, stage_error, result.stage_results);

        info!(
            "Retrieved {} documents in {:?} (fast path: {}, cache: {}, fallback: {})",
            response.documents.len(),
            result.total_duration,
            response.fast_path,
            response.retrieval_metadata.from_cache,
            response.fallback_used
        );
        response
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.pipeline.stage_names()
    }

    pub fn cache(&self) -> Option<&Arc<RetrievalCache>> {
        self.cache.as_ref()
    }

    pub fn router(&self) -> &CollectionRouter {
        &self.router
    }

    /// Drop cached results and the collection existence snapshot
    pub fn invalidate_caches(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
        self.router.invalidate_existence();
    }
}

/// Assembles a [`RetrievalEngine`] from configuration and collaborators
pub struct EngineBuilder {
    store: Arc<dyn VectorStore>,
    config: Config,
    registry: Option<Arc<CollectionRegistry>>,
    generation: Option<Arc<dyn GenerationModel>>,
    rerank: Option<Arc<dyn RerankModel>>,
    recorder: Option<Arc<dyn Recorder>>,
    cache: Option<Arc<RetrievalCache>>,
}

impl EngineBuilder {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            config: Config::default(),
            registry: None,
            generation: None,
            rerank: None,
            recorder: None,
            cache: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use this registry instead of the one derived from the configuration
    pub fn registry(mut self, registry: Arc<CollectionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn generation_model(mut self, model: Arc<dyn GenerationModel>) -> Self {
        self.generation = Some(model);
        self
    }

    pub fn rerank_model(mut self, model: Arc<dyn RerankModel>) -> Self {
        self.rerank = Some(model);
        self
    }

    pub fn recorder(mut self, recorder: Arc<dyn Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Share a retrieval cache between engines
    pub fn cache(mut self, cache: Arc<RetrievalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<RetrievalEngine> {
        let config = &self.config;
        let registry = match &self.registry {
            Some(registry) => Arc::clone(registry),
            None => Arc::new(config.registry()?),
        };

        let mut analysis = QueryAnalysisStage::new(config.analyzer.build_analyzer()?);
        let mut router = CollectionRouter::new(
            Arc::clone(&registry),
            Arc::clone(&self.store),
            config.router.clone(),
        )?;
        let mut retriever = MultiCollectionRetriever::new(
            Arc::clone(&self.store),
            Arc::clone(&registry),
            config.retrieval.clone(),
        );

        if let Some(model) = &self.generation {
            if config.analyzer.rewrite {
                analysis = analysis.with_rewriter(QueryRewriter::new(
                    Arc::clone(model),
                    config.analyzer.temperature,
                    Duration::from_millis(config.analyzer.timeout_ms),
                ));
            }
            router = router.with_model(Arc::clone(model));
            retriever = retriever.with_adapter(Arc::new(QueryAdapter::new(
                Arc::clone(model),
                Arc::clone(&registry),
                Arc::new(AdaptationCache::default()),
                Duration::from_millis(config.retrieval.search_timeout_ms),
            )));
        }

        let router = Arc::new(router);
        let retriever = Arc::new(retriever);

        let cache = if config.cache.enabled {
            Some(
                self.cache
                    .clone()
                    .unwrap_or_else(|| Arc::new(RetrievalCache::from_settings(&config.cache))),
            )
        } else {
            None
        };

        let mut routing_stage = CollectionRoutingStage::new(Arc::clone(&router));
        let mut retrieval_stage = RetrievalStage::new(retriever, Arc::clone(&router));
        if let Some(cache) = &cache {
            routing_stage = routing_stage.with_cache(Arc::clone(cache));
            retrieval_stage = retrieval_stage.with_cache(Arc::clone(cache));
        }

        let fusion = WeightedRankFusion::new(config.fusion.clone())
            .map_err(|e| RecallError::Config(e.to_string()))?;
        let diversity = DiversityEnforcer::new(config.diversity.clone());

        let reranker = self.rerank.as_ref().map(|model| {
            Arc::new(CollectionReranker::new(
                Arc::clone(model),
                Arc::clone(&registry),
                diversity.clone(),
                config.rerank.clone(),
            ))
        });

        let context_builder = ContextBuilder::new(config.context.clone())?;

        let mut builder = Pipeline::builder(PIPELINE_NAME)
            .failure_mode(config.pipeline.failure_mode)
            .stage(analysis);
        if config.pipeline.fast_path {
            let search = VariantSearch::new(
                config.retrieval.concurrency,
                Duration::from_millis(config.pipeline.fast_path_timeout_ms),
            )
            .with_target(config.retrieval.limit)
            .with_score_threshold(config.retrieval.score_threshold);
            builder = builder.stage(SimpleRetrievalStage::new(
                Arc::clone(&registry),
                Arc::clone(&self.store),
                search,
            ));
        }
        let pipeline = builder
            .stage(routing_stage)
            .stage(retrieval_stage)
            .stage(FusionStage::new(fusion, diversity))
            .stage(RerankingStage::new(reranker))
            .stage(ContextBuildingStage::new(context_builder))
            .build()?;

        info!(
            "Retrieval engine ready: {} stages, {} collections enabled, cache {}",
            pipeline.stage_names().len(),
            registry.enabled().count(),
            if cache.is_some() { "on" } else { "off" }
        );

        Ok(RetrievalEngine {
            pipeline,
            router,
            cache,
            recorder: self.recorder,
            limit: config.retrieval.limit,
            telemetry: config.pipeline.telemetry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FailureMode;
    use crate::stages::test_support::{sample_store, OfflineModel};
    use crate::stages::{FUSION, QUERY_ANALYSIS, RERANKING, SIMPLE_RETRIEVAL};
    use chrono::TimeZone;

    fn sample_engine(config: Config) -> RetrievalEngine {
        RetrievalEngine::builder(Arc::new(sample_store()))
            .config(config)
            .build()
            .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_stage_order() {
        let engine = sample_engine(Config::default());
        assert_eq!(
            engine.stage_names(),
            vec![
                QUERY_ANALYSIS,
                SIMPLE_RETRIEVAL,
                "collection-routing",
                "retrieval",
                FUSION,
                RERANKING,
                "context-building"
            ]
        );

        let mut config = Config::default();
        config.pipeline.fast_path = false;
        assert!(!sample_engine(config).stage_names().contains(&SIMPLE_RETRIEVAL));
    }

    #[tokio::test]
    async fn test_greeting_skips_retrieval() {
        let response = sample_engine(Config::default())
            .retrieve(RetrievalRequest::new("hello!").at(now()))
            .await;

        assert!(response.documents.is_empty());
        assert!(response.context.is_empty());
        assert!(response.routing.is_none());
        assert!(!response.fallback_used);
        assert!(response.intent.unwrap().is_greeting);
    }

    #[tokio::test]
    async fn test_empty_query_degrades() {
        let response = sample_engine(Config::default())
            .retrieve(RetrievalRequest::new("   "))
            .await;
        assert!(response.fallback_used);
        assert_eq!(response.fallback_reason.as_deref(), Some("empty query"));
    }

    #[tokio::test]
    async fn test_fast_path_query() {
        let response = sample_engine(Config::default())
            .retrieve(RetrievalRequest::new("show my merged prs").at(now()))
            .await;

        assert!(response.fast_path);
        assert_eq!(response.documents.len(), 2);
        assert!(response.context.contains("I merged PR #4"));
        let fusion = response
            .stage_results
            .iter()
            .find(|r| r.stage == FUSION)
            .unwrap();
        assert!(fusion.skipped);
    }

    #[tokio::test]
    async fn test_offline_model_falls_back_to_heuristics() {
        let response = RetrievalEngine::builder(Arc::new(sample_store()))
            .generation_model(Arc::new(OfflineModel))
            .build()
            .unwrap()
            .retrieve(RetrievalRequest::new("which songs by Massive Attack did I play").at(now()))
            .await;

        assert!(!response.fallback_used);
        assert!(response
            .documents
            .iter()
            .any(|d| d.document.metadata.id.as_deref() == Some("rp-1")));
    }

    #[test]
    fn test_invalid_fusion_config_is_rejected() {
        let mut config = Config::default();
        config.fusion.rrf_weight = 2.0;
        config.pipeline.failure_mode = FailureMode::FailFast;
        let result = RetrievalEngine::builder(Arc::new(sample_store()))
            .config(config)
            .build();
        assert!(matches!(result, Err(RecallError::Config(_))));
    }
}
