//! Context string assembly

use super::{RagState, CONTEXT_BUILDING};
use crate::document::Document;
use crate::pipeline::{PipelineContext, Stage, StageError};
use crate::providers::SpanKind;
use crate::temporal::ContextBuilder;
use async_trait::async_trait;
use serde_json::json;

pub struct ContextBuildingStage {
    builder: ContextBuilder,
}

impl ContextBuildingStage {
    pub fn new(builder: ContextBuilder) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl Stage<RagState> for ContextBuildingStage {
    fn name(&self) -> &str {
        CONTEXT_BUILDING
    }

    async fn can_execute(&self, state: &RagState, _ctx: &PipelineContext) -> bool {
        state.needs_retrieval()
    }

    async fn execute(
        &self,
        mut state: RagState,
        ctx: &mut PipelineContext,
    ) -> Result<RagState, StageError> {
        let documents: Vec<Document> = state.documents.iter().map(|w| w.document.clone()).collect();
        let time_reference = state.intent.as_ref().and_then(|i| i.time_reference.as_ref());
        let built = self.builder.build_at(&documents, time_reference, state.now);

        ctx.record_span(
            CONTEXT_BUILDING,
            SpanKind::Context,
            json!({ "documents": documents.len() }),
            json!({
                "chars": built.text.chars().count(),
                "truncated": built.metadata.truncated,
            }),
        );
        state.context = Some(built);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::QueryAnalyzer;
    use crate::document::WeightedDocument;
    use crate::temporal::ContextSettings;
    use chrono::{TimeZone, Utc};

    fn stage() -> ContextBuildingStage {
        ContextBuildingStage::new(ContextBuilder::new(ContextSettings::default()).unwrap())
    }

    #[tokio::test]
    async fn test_builds_context_from_documents() {
        let mut state = RagState::new("what did I merge", 10)
            .with_now(Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap());
        state.documents = vec![WeightedDocument::single(
            Document::new("Retry budget for the parser rewrite")
                .with_id("pr-2")
                .with_type("pull_request")
                .with_attr("merged", true)
                .with_attr("number", 42)
                .with_attr("mergedAt", "2026-10-14T09:00:00Z"),
            "github",
            1.0,
            0.8,
        )];

        let mut ctx = PipelineContext::new();
        let state = stage().execute(state, &mut ctx).await.unwrap();
        let context = state.context.unwrap();
        assert!(context.text.contains("I merged PR #42"));
        assert_eq!(context.metadata.document_count, 1);
    }

    #[tokio::test]
    async fn test_greeting_gets_no_context() {
        let mut state = RagState::new("hello there", 10);
        state.intent = Some(QueryAnalyzer::builtin().unwrap().analyze("hello there"));
        assert!(!stage().can_execute(&state, &PipelineContext::new()).await);
    }
}
