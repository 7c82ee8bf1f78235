//! Model reranking of the fused documents

use super::{RagState, RERANKING};
use crate::pipeline::{PipelineContext, Stage, StageError};
use crate::providers::SpanKind;
use crate::retrieval::CollectionReranker;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct RerankingStage {
    reranker: Option<Arc<CollectionReranker>>,
}

impl RerankingStage {
    pub fn new(reranker: Option<Arc<CollectionReranker>>) -> Self {
        Self { reranker }
    }
}

#[async_trait]
impl Stage<RagState> for RerankingStage {
    fn name(&self) -> &str {
        RERANKING
    }

    async fn can_execute(&self, state: &RagState, _ctx: &PipelineContext) -> bool {
        let enabled = self
            .reranker
            .as_ref()
            .map(|r| r.settings().enabled)
            .unwrap_or(false);
        enabled && !state.fast_path && state.documents.len() > 1
    }

    async fn execute(
        &self,
        mut state: RagState,
        ctx: &mut PipelineContext,
    ) -> Result<RagState, StageError> {
        let reranker = self
            .reranker
            .as_ref()
            .ok_or_else(|| StageError::missing_input(RERANKING, "rerank model"))?;

        let before = state.documents.len();
        let documents = std::mem::take(&mut state.documents);
        state.documents = reranker
            .rerank(&state.effective_query, documents, state.limit)
            .await;
        state.reranked = true;

        ctx.record_span(
            RERANKING,
            SpanKind::Rerank,
            json!({ "query": state.effective_query, "documents": before }),
            json!({ "documents": state.documents.len() }),
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::CollectionRegistry;
    use crate::document::{Document, WeightedDocument};
    use crate::providers::{ModelError, RerankModel};
    use crate::retrieval::{DiversityEnforcer, RerankSettings};

    /// Puts documents mentioning "parser" first
    struct KeywordModel;

    #[async_trait]
    impl RerankModel for KeywordModel {
        async fn rerank(
            &self,
            _query: &str,
            mut documents: Vec<Document>,
            top_k: usize,
        ) -> Result<Vec<Document>, ModelError> {
            documents.sort_by_key(|d| !d.page_content.contains("parser"));
            documents.truncate(top_k);
            Ok(documents)
        }
    }

    fn stage(enabled: bool) -> RerankingStage {
        RerankingStage::new(Some(Arc::new(CollectionReranker::new(
            Arc::new(KeywordModel),
            Arc::new(CollectionRegistry::builtin()),
            DiversityEnforcer::default(),
            RerankSettings {
                enabled,
                ..RerankSettings::default()
            },
        ))))
    }

    fn state() -> RagState {
        let mut state = RagState::new("parser work", 10);
        state.documents = vec![
            WeightedDocument::single(Document::new("cache fix").with_id("a"), "github", 1.0, 0.9),
            WeightedDocument::single(Document::new("parser retry").with_id("b"), "github", 1.0, 0.5),
        ];
        state
    }

    #[tokio::test]
    async fn test_reranks_documents() {
        let mut ctx = PipelineContext::new();
        let stage = stage(true);
        assert!(stage.can_execute(&state(), &ctx).await);

        let state = stage.execute(state(), &mut ctx).await.unwrap();
        assert!(state.reranked);
        assert_eq!(state.documents[0].document.page_content, "parser retry");
    }

    #[tokio::test]
    async fn test_applicability() {
        let ctx = PipelineContext::new();
        assert!(!stage(false).can_execute(&state(), &ctx).await);
        assert!(!RerankingStage::new(None).can_execute(&state(), &ctx).await);

        let mut single = state();
        single.documents.truncate(1);
        assert!(!stage(true).can_execute(&single, &ctx).await);
    }
}
