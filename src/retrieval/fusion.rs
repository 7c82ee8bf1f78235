//! Weighted Reciprocal Rank Fusion across collections

use super::CollectionSearchResult;
use crate::document::{Document, WeightedDocument};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("Invalid RRF constant {0}: must be positive")]
    InvalidRrfK(f32),

    #[error("Invalid RRF weight {0}: must be within [0, 1]")]
    InvalidRrfWeight(f32),

    #[error("Invalid collection weight multiplier {0}: must be non-negative")]
    InvalidMultiplier(f32),
}

/// Configuration for weighted rank fusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Share of the base score taken from RRF; the rest comes from raw relevance
    pub rrf_weight: f32,

    /// Strength of the collection-weight boost
    pub collection_weight_multiplier: f32,

    /// Divide every score by the batch maximum
    pub normalize: bool,

    pub max_results: usize,
}

impl FusionConfig {
    pub fn new(rrf_k: f32, rrf_weight: f32, collection_weight_multiplier: f32) -> Result<Self, FusionError> {
        let config = Self {
            rrf_k,
            rrf_weight,
            collection_weight_multiplier,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        if !(self.rrf_k > 0.0) {
            return Err(FusionError::InvalidRrfK(self.rrf_k));
        }
        if !(0.0..=1.0).contains(&self.rrf_weight) {
            return Err(FusionError::InvalidRrfWeight(self.rrf_weight));
        }
        if !(self.collection_weight_multiplier >= 0.0) {
            return Err(FusionError::InvalidMultiplier(self.collection_weight_multiplier));
        }
        Ok(())
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            rrf_weight: 0.7,
            collection_weight_multiplier: 1.0,
            normalize: true,
            max_results: 100,
        }
    }
}

struct Accumulator {
    document: Document,
    vendor: String,
    weight: f32,
    rrf: Vec<f32>,
    relevance: Vec<f32>,
    ranks: Vec<usize>,
    first_seen: usize,
}

/// Merges ranked lists from several collections into one scored list
#[derive(Debug, Clone)]
pub struct WeightedRankFusion {
    config: FusionConfig,
}

impl WeightedRankFusion {
    pub fn new(config: FusionConfig) -> Result<Self, FusionError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Fuse per-collection results
    ///
    /// For a document at 0-indexed rank `r` in some collection:
    /// `rrf = 1 / (K + r + 1)`. Per identity the mean RRF and max relevance are
    /// blended, then boosted by `1 + weight × multiplier` using the highest
    /// contributing collection weight. Ties keep first-seen order.
    pub fn fuse(&self, results: &[CollectionSearchResult], max_results: Option<usize>) -> Vec<WeightedDocument> {
        if results.is_empty() {
            warn!("No collection results to fuse");
            return Vec::new();
        }

        let mut order: Vec<String> = Vec::new();
        let mut entries: AHashMap<String, Accumulator> = AHashMap::new();

        for result in results {
            for (rank, (document, relevance)) in result.documents.iter().enumerate() {
                let rrf = 1.0 / (self.config.rrf_k + rank as f32 + 1.0);
                let id = document.identity();

                let entry = entries.entry(id.clone()).or_insert_with(|| {
                    order.push(id);
                    Accumulator {
                        document: document.clone(),
                        vendor: result.vendor.clone(),
                        weight: result.weight,
                        rrf: Vec::new(),
                        relevance: Vec::new(),
                        ranks: Vec::new(),
                        first_seen: order.len() - 1,
                    }
                });

                entry.rrf.push(rrf);
                entry.relevance.push(*relevance);
                entry.ranks.push(rank);

                if result.weight > entry.weight {
                    entry.weight = result.weight;
                    entry.vendor = result.vendor.clone();
                }
            }
        }

        let relevance_share = 1.0 - self.config.rrf_weight;
        let mut fused: Vec<(usize, WeightedDocument)> = order
            .iter()
            .filter_map(|id| entries.remove(id))
            .map(|entry| {
                let mean_rrf = entry.rrf.iter().sum::<f32>() / entry.rrf.len() as f32;
                let max_relevance = entry
                    .relevance
                    .iter()
                    .copied()
                    .fold(f32::NEG_INFINITY, f32::max);
                let base = self.config.rrf_weight * mean_rrf + relevance_share * max_relevance;
                let score = base * (1.0 + entry.weight * self.config.collection_weight_multiplier);

                (
                    entry.first_seen,
                    WeightedDocument {
                        document: entry.document,
                        collection_vendor: entry.vendor,
                        collection_weight: entry.weight,
                        final_score: score,
                        rrf_score: mean_rrf,
                        relevance_score: max_relevance,
                        hits: entry.rrf.len(),
                        ranks: entry.ranks,
                    },
                )
            })
            .collect();

        if self.config.normalize {
            let max = fused
                .iter()
                .map(|(_, d)| d.final_score)
                .fold(0.0f32, f32::max);
            if max > 0.0 {
                for (_, doc) in &mut fused {
                    doc.final_score /= max;
                }
            }
        }

        fused.sort_by(|(a_seen, a), (b_seen, b)| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a_seen.cmp(b_seen))
        });

        let limit = max_results.unwrap_or(self.config.max_results);
        fused.truncate(limit);

        debug!(
            "Fused {} collections into {} documents",
            results.len(),
            fused.len()
        );

        fused.into_iter().map(|(_, doc)| doc).collect()
    }
}

impl Default for WeightedRankFusion {
    fn default() -> Self {
        Self {
            config: FusionConfig::default(),
        }
    }
}
