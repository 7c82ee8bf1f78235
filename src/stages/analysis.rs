//! Query analysis stage

use super::{RagState, QUERY_ANALYSIS};
use crate::analysis::{QueryAnalyzer, QueryRewriter};
use crate::pipeline::{PipelineContext, Stage, StageError};
use crate::providers::SearchFilter;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

/// Classifies the query, rewriting ambiguous follow-ups first when history exists
pub struct QueryAnalysisStage {
    analyzer: QueryAnalyzer,
    rewriter: Option<QueryRewriter>,
}

impl QueryAnalysisStage {
    pub fn new(analyzer: QueryAnalyzer) -> Self {
        Self {
            analyzer,
            rewriter: None,
        }
    }

    pub fn with_rewriter(mut self, rewriter: QueryRewriter) -> Self {
        self.rewriter = Some(rewriter);
        self
    }
}

#[async_trait]
impl Stage<RagState> for QueryAnalysisStage {
    fn name(&self) -> &str {
        QUERY_ANALYSIS
    }

    async fn execute(
        &self,
        mut state: RagState,
        ctx: &mut PipelineContext,
    ) -> Result<RagState, StageError> {
        if state.query.trim().is_empty() {
            return Err(StageError::missing_input(QUERY_ANALYSIS, "query"));
        }

        let mut intent = self.analyzer.analyze(&state.query);

        if let Some(rewriter) = &self.rewriter {
            if self.analyzer.needs_rewrite(&intent, &state.messages) {
                match rewriter.rewrite(&state.query, &state.messages).await {
                    Ok(rewritten) if rewritten != state.query => {
                        info!("Query rewritten: {:?} -> {:?}", state.query, rewritten);
                        intent = self.analyzer.analyze(&rewritten);
                        ctx.set_state("rewritten_query", json!(rewritten));
                        state.effective_query = rewritten;
                        state.rewritten = true;
                    }
                    Ok(_) => debug!("Rewrite returned the original query"),
                    Err(e) => warn!("Query rewrite failed, keeping original query: {}", e),
                }
            }
        }

        state.filter = intent
            .time_reference
            .as_ref()
            .and_then(|reference| reference.resolve(state.now))
            .map(|range| SearchFilter {
                types: None,
                time_range: Some(range),
            });

        ctx.set_state("fast_path_eligible", json!(intent.should_use_fast_path()));
        state.intent = Some(intent);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ConversationTurn;
    use crate::providers::{GenerationModel, ModelError};
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    struct RewritingModel;

    #[async_trait]
    impl GenerationModel for RewritingModel {
        async fn generate_structured(
            &self,
            _schema: &Value,
            _prompt: &str,
            _temperature: f32,
        ) -> Result<Value, ModelError> {
            Ok(json!({ "rewrittenQuery": "which github repositories did I push to" }))
        }
    }

    fn stage() -> QueryAnalysisStage {
        QueryAnalysisStage::new(QueryAnalyzer::builtin().unwrap())
    }

    #[tokio::test]
    async fn test_temporal_query_gets_time_filter() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        let state = RagState::new("What did I ship on GitHub last week?", 20).with_now(now);
        let mut ctx = PipelineContext::new();
        let state = stage().execute(state, &mut ctx).await.unwrap();

        let intent = state.intent.unwrap();
        assert!(intent.is_temporal);
        let range = state.filter.unwrap().time_range.unwrap();
        assert_eq!(range.end, now);
        assert_eq!(ctx.state("fast_path_eligible"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_out_of_range_time_phrases_run_unfiltered() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap();
        for query in [
            "what did I play 2000000000 days ago",
            "commits in the last 1000000000 days",
        ] {
            let mut ctx = PipelineContext::new();
            let state = stage()
                .execute(RagState::new(query, 20).with_now(now), &mut ctx)
                .await
                .unwrap();

            assert!(state.intent.unwrap().time_reference.is_some());
            assert!(state.filter.is_none(), "{} kept a time filter", query);
        }
    }

    #[tokio::test]
    async fn test_ambiguous_follow_up_is_rewritten() {
        let stage = stage().with_rewriter(QueryRewriter::new(
            Arc::new(RewritingModel),
            0.2,
            Duration::from_secs(1),
        ));
        let state = RagState::new("what about those?", 20)
            .with_messages(vec![ConversationTurn::user("show my github repos")]);
        let mut ctx = PipelineContext::new();
        let state = stage.execute(state, &mut ctx).await.unwrap();

        assert!(state.rewritten);
        assert_eq!(state.query, "what about those?");
        assert_eq!(state.effective_query, "which github repositories did I push to");
        assert!(state.intent.unwrap().entity_types.contains(&"repository".to_string()));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let mut ctx = PipelineContext::new();
        let err = stage().execute(RagState::new("  ", 20), &mut ctx).await.unwrap_err();
        assert_eq!(err.stage(), QUERY_ANALYSIS);
    }
}
