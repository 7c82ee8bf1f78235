//! Bounded-concurrency search across collections

use super::{CollectionSearchResult, QueryAdapter};
use crate::collections::CollectionRegistry;
use crate::document::CollectionWeight;
use crate::providers::{SearchFilter, StoreError, VectorStore};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 8;

/// Retriever tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Global result limit; each collection gets `ceil(limit × weight)`
    pub limit: usize,
    /// Concurrent collection searches, clamped to [1, 8]
    pub concurrency: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,
    pub search_timeout_ms: u64,
    /// Rewrite the query per collection when a generation model is configured
    pub adapt_queries: bool,
    /// Drop the time range and search again when nothing matched
    pub retry_without_time_filter: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            limit: 20,
            concurrency: 4,
            score_threshold: None,
            search_timeout_ms: 10_000,
            adapt_queries: false,
            retry_without_time_filter: true,
        }
    }
}

/// Everything one retrieval run produced
#[derive(Debug, Clone, Default)]
pub struct MultiCollectionOutput {
    /// One entry per selected collection, in selection order
    pub results: Vec<CollectionSearchResult>,
    pub queries_executed: usize,
    pub failed_collections: Vec<String>,
    /// Collections the store reported as nonexistent
    pub missing_collections: Vec<String>,
    pub time_filter_dropped: bool,
    pub duration: Duration,
}

impl MultiCollectionOutput {
    pub fn total_documents(&self) -> usize {
        self.results.iter().map(|r| r.documents.len()).sum()
    }

    /// Every collection search failed
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(CollectionSearchResult::failed)
    }

    pub fn documents_per_collection(&self) -> BTreeMap<String, usize> {
        self.results
            .iter()
            .map(|r| (r.vendor.clone(), r.documents.len()))
            .collect()
    }
}

struct SearchOutcome {
    result: CollectionSearchResult,
    missing: bool,
}

/// Fans one query out to several collections
pub struct MultiCollectionRetriever {
    store: Arc<dyn VectorStore>,
    registry: Arc<CollectionRegistry>,
    adapter: Option<Arc<QueryAdapter>>,
    settings: RetrievalSettings,
}

impl MultiCollectionRetriever {
    pub fn new(
        store: Arc<dyn VectorStore>,
        registry: Arc<CollectionRegistry>,
        mut settings: RetrievalSettings,
    ) -> Self {
        settings.concurrency = settings.concurrency.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        Self {
            store,
            registry,
            adapter: None,
            settings,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<QueryAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.store)
    }

    /// Result cap for one collection: `ceil(limit × weight)`, at least 1
    pub fn per_collection_limit(limit: usize, weight: f32) -> usize {
        ((limit as f32 * weight.clamp(0.0, 1.0)).ceil() as usize).max(1)
    }

    /// Search every weighted collection
    ///
    /// A failing collection contributes zero documents. When nothing matched and the
    /// filter carried a time range, the whole search runs once more without it.
    pub async fn retrieve(
        &self,
        query: &str,
        weights: &[CollectionWeight],
        filter: Option<&SearchFilter>,
        limit: Option<usize>,
    ) -> MultiCollectionOutput {
        let started = Instant::now();
        if weights.is_empty() {
            warn!("No collections selected, nothing to retrieve");
            return MultiCollectionOutput::default();
        }

        let limit = limit.unwrap_or(self.settings.limit);
        let mut missing: Vec<String> = Vec::new();

        let mut results = self.search_all(query, weights, filter, limit, &mut missing).await;
        let mut queries_executed = weights.len();
        let mut time_filter_dropped = false;

        let found: usize = results.iter().map(|r| r.documents.len()).sum();
        let time_filtered = filter.map(|f| f.time_range.is_some()).unwrap_or(false);

        if found == 0 && time_filtered && self.settings.retry_without_time_filter {
            info!("No documents inside the time window, retrying without the time filter");
            let relaxed = filter.map(SearchFilter::without_time_range).filter(|f| !f.is_empty());
            results = self
                .search_all(query, weights, relaxed.as_ref(), limit, &mut missing)
                .await;
            queries_executed += weights.len();
            time_filter_dropped = true;
        }

        let failed_collections: Vec<String> = results
            .iter()
            .filter(|r| r.failed())
            .map(|r| r.vendor.clone())
            .collect();

        let output = MultiCollectionOutput {
            results,
            queries_executed,
            failed_collections,
            missing_collections: missing,
            time_filter_dropped,
            duration: started.elapsed(),
        };

        info!(
            "Retrieved {} documents from {} collections ({} failed) in {:?}",
            output.total_documents(),
            output.results.len(),
            output.failed_collections.len(),
            output.duration
        );

        output
    }

    async fn search_all(
        &self,
        query: &str,
        weights: &[CollectionWeight],
        filter: Option<&SearchFilter>,
        limit: usize,
        missing: &mut Vec<String>,
    ) -> Vec<CollectionSearchResult> {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));

        let searches = weights.iter().map(|weight| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire_owned().await.ok();
                self.search_collection(query, weight, filter, limit).await
            }
        });

        join_all(searches)
            .await
            .into_iter()
            .map(|outcome| {
                if outcome.missing && !missing.contains(&outcome.result.vendor) {
                    missing.push(outcome.result.vendor.clone());
                }
                outcome.result
            })
            .collect()
    }

    async fn search_collection(
        &self,
        query: &str,
        weight: &CollectionWeight,
        filter: Option<&SearchFilter>,
        limit: usize,
    ) -> SearchOutcome {
        let started = Instant::now();
        let k = Self::per_collection_limit(limit, weight.weight);

        let query = match &self.adapter {
            Some(adapter) if self.settings.adapt_queries => adapter.adapt(query, &weight.vendor).await,
            _ => query.to_string(),
        };

        let collection = self.registry.collection_name(&weight.vendor);
        let timeout = Duration::from_millis(self.settings.search_timeout_ms);
        let search = self.store.similarity_search_with_score(
            &collection,
            &query,
            k,
            filter,
            self.settings.score_threshold,
        );

        let outcome = match tokio::time::timeout(timeout, search).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                millis: self.settings.search_timeout_ms,
            }),
        };

        let mut result = CollectionSearchResult {
            vendor: weight.vendor.clone(),
            weight: weight.weight,
            query,
            ..CollectionSearchResult::default()
        };

        let missing = match outcome {
            Ok(documents) => {
                debug!("{}: {} documents (k={})", weight.vendor, documents.len(), k);
                result.documents = documents;
                false
            }
            Err(e) => {
                warn!("Search in {} failed: {}", collection, e);
                result.error = Some(e.to_string());
                e.is_missing_collection()
            }
        };

        result.duration_ms = started.elapsed().as_millis() as u64;
        SearchOutcome { result, missing }
    }
}
