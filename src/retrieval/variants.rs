//! Several formulations of one query against a single collection

use super::deduplicate_scored;
use crate::document::Document;
use crate::providers::{SearchFilter, StoreError, VectorStore};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// A variant adding fewer new documents than this counts as low gain
const LOW_GAIN_DOCUMENTS: usize = 3;

/// Consecutive low-gain variants that end the search
const LOW_GAIN_STREAK: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct VariantSearchOutput {
    /// `(variant index, hits)` in completion order
    pub results: Vec<(usize, Vec<(Document, f32)>)>,
    pub queries_executed: usize,
    pub unique_documents: usize,
    /// Remaining variants were abandoned
    pub stopped_early: bool,
}

impl VariantSearchOutput {
    /// All hits, best score per identity, highest first
    pub fn merged(&self) -> Vec<(Document, f32)> {
        let mut all: Vec<(Document, f32)> = self
            .results
            .iter()
            .flat_map(|(_, hits)| hits.iter().cloned())
            .collect();
        // stable: equal scores keep completion order
        all.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        deduplicate_scored(all)
    }
}

/// Bounded-worker search over query variants with early stop
#[derive(Debug, Clone)]
pub struct VariantSearch {
    concurrency: usize,
    target_unique: Option<usize>,
    score_threshold: Option<f32>,
    timeout: Duration,
}

impl VariantSearch {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.clamp(1, 8),
            target_unique: None,
            score_threshold: None,
            timeout,
        }
    }

    /// Stop as soon as this many unique documents were found
    pub fn with_target(mut self, target_unique: usize) -> Self {
        self.target_unique = Some(target_unique);
        self
    }

    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Run `variants` against `collection`, `k` hits each
    ///
    /// Stops once the target unique count is reached or three consecutive variants
    /// each contribute fewer than three new documents. Failed variants are skipped.
    pub async fn run(
        &self,
        store: &dyn VectorStore,
        collection: &str,
        variants: &[String],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> VariantSearchOutput {
        // concrete futures keep the stream free of closure lifetimes, so it stays Send
        let searches: Vec<_> = variants
            .iter()
            .enumerate()
            .map(|(index, variant)| async move {
                (index, self.search(store, collection, variant, k, filter).await)
            })
            .collect();
        let mut pending = stream::iter(searches).buffer_unordered(self.concurrency.max(1));

        let mut output = VariantSearchOutput::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut low_gain = 0;

        while let Some((index, outcome)) = pending.next().await {
            output.queries_executed += 1;

            let hits = match outcome {
                Ok(hits) => hits,
                Err(e) => {
                    debug!("Query variant {} failed: {}", index, e);
                    continue;
                }
            };

            let before = seen.len();
            seen.extend(hits.iter().map(|(doc, _)| doc.identity()));
            let gained = seen.len() - before;
            low_gain = if gained < LOW_GAIN_DOCUMENTS { low_gain + 1 } else { 0 };
            output.results.push((index, hits));

            let target_reached = self.target_unique.map(|t| seen.len() >= t).unwrap_or(false);
            if target_reached || low_gain >= LOW_GAIN_STREAK {
                output.stopped_early = output.queries_executed < variants.len();
                debug!(
                    "Variant search stopped after {} of {} variants ({} unique, target reached: {})",
                    output.queries_executed,
                    variants.len(),
                    seen.len(),
                    target_reached
                );
                break;
            }
        }

        output.unique_documents = seen.len();
        output
    }

    async fn search(
        &self,
        store: &dyn VectorStore,
        collection: &str,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<(Document, f32)>, StoreError> {
        tokio::time::timeout(
            self.timeout,
            store.similarity_search_with_score(collection, query, k, filter, self.score_threshold),
        )
        .await
        .unwrap_or(Err(StoreError::Timeout {
            millis: self.timeout.as_millis() as u64,
        }))
    }
}
