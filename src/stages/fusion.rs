//! Fusion of per-collection results into one balanced ranking

use super::{RagState, FUSION};
use crate::pipeline::{PipelineContext, Stage, StageError};
use crate::retrieval::{DiversityEnforcer, WeightedRankFusion};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

pub struct FusionStage {
    fusion: WeightedRankFusion,
    diversity: DiversityEnforcer,
}

impl FusionStage {
    pub fn new(fusion: WeightedRankFusion, diversity: DiversityEnforcer) -> Self {
        Self { fusion, diversity }
    }
}

#[async_trait]
impl Stage<RagState> for FusionStage {
    fn name(&self) -> &str {
        FUSION
    }

    async fn can_execute(&self, state: &RagState, _ctx: &PipelineContext) -> bool {
        !state.fast_path && !state.collection_results.is_empty()
    }

    async fn execute(
        &self,
        mut state: RagState,
        ctx: &mut PipelineContext,
    ) -> Result<RagState, StageError> {
        let fused = self.fusion.fuse(&state.collection_results, None);
        let candidates = fused.len();
        state.documents = self.diversity.enforce(fused, state.limit);

        debug!(
            "Fused {} candidates into {} documents",
            candidates,
            state.documents.len()
        );
        ctx.set_state("fused_candidates", json!(candidates));
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::retrieval::{CollectionSearchResult, DiversityConfig};

    fn result(vendor: &str, weight: f32, count: usize) -> CollectionSearchResult {
        CollectionSearchResult {
            vendor: vendor.to_string(),
            weight,
            documents: (0..count)
                .map(|i| {
                    let id = format!("{}-{}", vendor, i);
                    (Document::new(id.clone()).with_id(id), 0.9 - i as f32 * 0.05)
                })
                .collect(),
            ..CollectionSearchResult::default()
        }
    }

    #[tokio::test]
    async fn test_fused_documents_respect_limit_and_balance() {
        let stage = FusionStage::new(
            WeightedRankFusion::default(),
            DiversityEnforcer::new(DiversityConfig::default()),
        );
        let mut state = RagState::new("what happened this sprint", 6);
        state.collection_results = vec![result("linear", 1.0, 10), result("slack", 0.6, 10)];

        let mut ctx = PipelineContext::new();
        let state = stage.execute(state, &mut ctx).await.unwrap();

        assert_eq!(state.documents.len(), 6);
        assert!(state.documents.iter().any(|d| d.collection_vendor == "slack"));
        assert!(state
            .documents
            .windows(2)
            .all(|w| w[0].final_score >= w[1].final_score));
        assert_eq!(ctx.state("fused_candidates"), Some(&json!(20)));
    }

    #[tokio::test]
    async fn test_fast_path_skips_fusion() {
        let stage = FusionStage::new(WeightedRankFusion::default(), DiversityEnforcer::default());
        let mut state = RagState::new("my playlists", 5);
        state.collection_results = vec![result("spotify", 1.0, 2)];
        state.fast_path = true;
        assert!(!stage.can_execute(&state, &PipelineContext::new()).await);
    }
}
