//! Per-collection reranking

use super::DiversityEnforcer;
use crate::collections::CollectionRegistry;
use crate::document::{Document, WeightedDocument};
use crate::providers::{ModelError, RerankModel};
use ahash::AHashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Reranker tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    /// Run the reranking stage when a rerank model is configured
    pub enabled: bool,
    /// Prefix queries with the collection's domain phrase
    pub use_collection_context: bool,
    pub timeout_ms: u64,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            use_collection_context: true,
            timeout_ms: 10_000,
        }
    }
}

/// Reorders each collection's slice independently, then rebalances
pub struct CollectionReranker {
    model: Arc<dyn RerankModel>,
    registry: Arc<CollectionRegistry>,
    diversity: DiversityEnforcer,
    settings: RerankSettings,
}

impl CollectionReranker {
    pub fn new(
        model: Arc<dyn RerankModel>,
        registry: Arc<CollectionRegistry>,
        diversity: DiversityEnforcer,
        settings: RerankSettings,
    ) -> Self {
        Self {
            model,
            registry,
            diversity,
            settings,
        }
    }

    pub fn settings(&self) -> &RerankSettings {
        &self.settings
    }

    /// Query sent to the reranker for one collection
    pub fn collection_query(&self, vendor: &str, query: &str) -> String {
        if self.settings.use_collection_context {
            format!("Considering {}: {}", self.registry.rerank_context(vendor), query)
        } else {
            query.to_string()
        }
    }

    /// Rerank every collection's documents concurrently and keep at most `n`
    ///
    /// A collection whose rerank fails keeps its original order. Reranked documents
    /// take over the group's original scores by position, so the new order survives
    /// the diversity pass while staying comparable across collections.
    pub async fn rerank(
        &self,
        query: &str,
        documents: Vec<WeightedDocument>,
        n: usize,
    ) -> Vec<WeightedDocument> {
        if documents.is_empty() {
            warn!("No documents to rerank");
            return Vec::new();
        }

        let groups = group_by_vendor(documents);
        let collections = groups.len();
        let reranked = join_all(
            groups
                .into_iter()
                .map(|(vendor, group)| self.rerank_group(query, vendor, group)),
        )
        .await;

        let merged: Vec<WeightedDocument> = reranked.into_iter().flatten().collect();
        let total = merged.len();
        let mut result = self.diversity.enforce(merged, total);
        result.truncate(n);

        debug!("Reranked {} collections into {} documents", collections, result.len());
        result
    }

    async fn rerank_group(
        &self,
        query: &str,
        vendor: String,
        group: Vec<WeightedDocument>,
    ) -> Vec<WeightedDocument> {
        let collection_query = self.collection_query(&vendor, query);
        let documents = group.iter().map(|w| w.document.clone()).collect();
        let timeout = Duration::from_millis(self.settings.timeout_ms);

        let outcome = tokio::time::timeout(
            timeout,
            self.model.rerank(&collection_query, documents, group.len()),
        )
        .await
        .unwrap_or(Err(ModelError::Timeout {
            millis: self.settings.timeout_ms,
        }));

        match outcome {
            Ok(reranked) => {
                debug!("{}: reranked {} documents", vendor, reranked.len());
                reassign(group, reranked)
            }
            Err(e) => {
                warn!("Reranking failed for {}, using original order: {}", vendor, e);
                group
            }
        }
    }
}

/// Groups in first-seen order
fn group_by_vendor(documents: Vec<WeightedDocument>) -> Vec<(String, Vec<WeightedDocument>)> {
    let mut groups: Vec<(String, Vec<WeightedDocument>)> = Vec::new();
    for doc in documents {
        match groups.iter().position(|(v, _)| *v == doc.collection_vendor) {
            Some(i) => groups[i].1.push(doc),
            None => groups.push((doc.collection_vendor.clone(), vec![doc])),
        }
    }
    groups
}

/// Map reranked documents back onto their weighted originals, in reranked order
fn reassign(group: Vec<WeightedDocument>, reranked: Vec<Document>) -> Vec<WeightedDocument> {
    let mut scores: Vec<f32> = group.iter().map(|w| w.final_score).collect();
    scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut originals: AHashMap<String, WeightedDocument> =
        group.into_iter().map(|w| (w.identity(), w)).collect();

    reranked
        .into_iter()
        .filter_map(|doc| originals.remove(&doc.identity()))
        .zip(scores)
        .map(|(mut weighted, score)| {
            weighted.final_score = score;
            weighted
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Reverses every group; fails for queries mentioning "project tasks"
    struct ReversingModel {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RerankModel for ReversingModel {
        async fn rerank(
            &self,
            query: &str,
            mut documents: Vec<Document>,
            top_k: usize,
        ) -> Result<Vec<Document>, ModelError> {
            if let Ok(mut q) = self.queries.lock() {
                q.push(query.to_string());
            }
            if query.contains("project tasks") {
                return Err(ModelError::Rerank("model unavailable".to_string()));
            }
            documents.reverse();
            documents.truncate(top_k);
            Ok(documents)
        }
    }

    fn doc(vendor: &str, id: &str, score: f32) -> WeightedDocument {
        WeightedDocument::single(Document::new(id).with_id(id), vendor, 1.0, score)
    }

    fn reranker() -> (CollectionReranker, Arc<ReversingModel>) {
        let model = Arc::new(ReversingModel {
            queries: Mutex::new(Vec::new()),
        });
        let reranker = CollectionReranker::new(
            model.clone(),
            Arc::new(CollectionRegistry::builtin()),
            DiversityEnforcer::default(),
            RerankSettings::default(),
        );
        (reranker, model)
    }

    fn ids(docs: &[WeightedDocument]) -> Vec<&str> {
        docs.iter().map(|d| d.document.page_content.as_str()).collect()
    }

    #[tokio::test]
    async fn test_reranked_order_survives_with_positional_scores() {
        let (reranker, model) = reranker();
        let input = vec![doc("github", "a", 0.9), doc("github", "b", 0.6), doc("github", "c", 0.3)];
        let result = reranker.rerank("what did I ship", input, 10).await;

        assert_eq!(ids(&result), vec!["c", "b", "a"]);
        assert!((result[0].final_score - 0.9).abs() < 1e-6);
        assert_eq!(
            model.queries.lock().unwrap()[0],
            "Considering code repositories and development activity: what did I ship"
        );
    }

    #[tokio::test]
    async fn test_failed_collection_keeps_original_order() {
        let (reranker, _) = reranker();
        let input = vec![
            doc("github", "g1", 0.9),
            doc("github", "g2", 0.5),
            doc("linear", "l1", 0.8),
            doc("linear", "l2", 0.4),
        ];
        let result = reranker.rerank("status", input, 10).await;

        assert_eq!(result.len(), 4);
        let linear: Vec<&str> = result
            .iter()
            .filter(|d| d.collection_vendor == "linear")
            .map(|d| d.document.page_content.as_str())
            .collect();
        assert_eq!(linear, vec!["l1", "l2"]);
        let github: Vec<&str> = result
            .iter()
            .filter(|d| d.collection_vendor == "github")
            .map(|d| d.document.page_content.as_str())
            .collect();
        assert_eq!(github, vec!["g2", "g1"]);
    }

    #[test]
    fn test_plain_query_without_collection_context() {
        let model = Arc::new(ReversingModel {
            queries: Mutex::new(Vec::new()),
        });
        let reranker = CollectionReranker::new(
            model,
            Arc::new(CollectionRegistry::builtin()),
            DiversityEnforcer::default(),
            RerankSettings {
                use_collection_context: false,
                ..RerankSettings::default()
            },
        );
        assert_eq!(reranker.collection_query("spotify", "songs"), "songs");
    }
}
