//! Vector store contract

use crate::document::Document;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The logical collection is not present in the store
    #[error("Collection does not exist: {collection}")]
    CollectionNotFound { collection: String },

    #[error("Vector store request timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Vector store error: {0}")]
    Backend(String),

    /// Opaque failure from the host's store client
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_missing_collection(&self) -> bool {
        matches!(self, StoreError::CollectionNotFound { .. })
    }
}

/// Inclusive UTC time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Optional constraints applied by the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Restrict to these entity types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,

    /// Restrict to documents whose timestamp falls in this window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.types.is_none() && self.time_range.is_none()
    }

    /// Same filter with the time constraint removed
    pub fn without_time_range(&self) -> Self {
        Self {
            types: self.types.clone(),
            time_range: None,
        }
    }
}

/// A similarity-searchable store holding many logical collections
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Search one collection, returning `(document, relevance)` pairs best first
    async fn similarity_search_with_score(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<(Document, f32)>, StoreError>;

    /// Names of the collections that currently exist
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;
}
