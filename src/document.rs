//! Core data model shared by every retrieval stage
//!
//! Documents carry a small fixed core (`id`, type tag) and an open attribute map so
//! vendor-specific fields (timestamps, titles, counters) survive without a schema per source.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Number of content characters used for identity when a document has no id
const IDENTITY_PREFIX_CHARS: usize = 100;

/// Metadata attached to every document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Stable entity id assigned by the source mapper
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Entity type tag (e.g. "track", "pull_request")
    #[serde(
        rename = "__type",
        alias = "type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub doc_type: Option<String>,

    /// Vendor-specific attributes
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentMetadata {
    /// Raw attribute lookup
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// String attribute lookup; empty strings count as missing
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.extra
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Type tag, or "unknown" when the mapper did not set one
    pub fn type_or_unknown(&self) -> &str {
        self.doc_type.as_deref().unwrap_or("unknown")
    }
}

/// A retrieved unit of evidence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "pageContent", alias = "page_content")]
    pub page_content: String,

    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.id = Some(id.into());
        self
    }

    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.metadata.doc_type = Some(doc_type.into());
        self
    }

    /// Attach an arbitrary attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.extra.insert(key.into(), value.into());
        self
    }

    /// Identity used for deduplication across collections
    ///
    /// The mapper-assigned id when present, otherwise `type:content-prefix`.
    pub fn identity(&self) -> String {
        match &self.metadata.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => {
                let prefix: String = self
                    .page_content
                    .chars()
                    .take(IDENTITY_PREFIX_CHARS)
                    .collect();
                format!("{}:{}", self.metadata.type_or_unknown(), prefix)
            }
        }
    }

    /// Get a short preview of the content (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        if self.page_content.chars().count() <= max_chars {
            self.page_content.clone()
        } else {
            let head: String = self.page_content.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }
}

/// Weight assigned to one collection for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionWeight {
    pub vendor: String,
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl CollectionWeight {
    pub fn new(vendor: impl Into<String>, weight: f32) -> Self {
        Self {
            vendor: vendor.into(),
            weight,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// A document after fusion: attributed to one collection and scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedDocument {
    pub document: Document,

    /// Authoritative collection (highest contributing weight)
    pub collection_vendor: String,

    pub collection_weight: f32,

    /// Blended, boosted and (optionally) normalized score
    pub final_score: f32,

    /// Mean reciprocal-rank contribution
    #[serde(default)]
    pub rrf_score: f32,

    /// Best raw relevance score seen across collections
    #[serde(default)]
    pub relevance_score: f32,

    /// Number of collections that returned this document
    #[serde(default)]
    pub hits: usize,

    /// 0-indexed rank in each contributing collection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ranks: Vec<usize>,
}

impl WeightedDocument {
    /// Wrap a document scored by a single collection
    pub fn single(document: Document, vendor: impl Into<String>, weight: f32, score: f32) -> Self {
        Self {
            document,
            collection_vendor: vendor.into(),
            collection_weight: weight,
            final_score: score,
            rrf_score: 0.0,
            relevance_score: score,
            hits: 1,
            ranks: Vec::new(),
        }
    }

    pub fn identity(&self) -> String {
        self.document.identity()
    }
}

/// Routing strategy chosen for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingStrategy {
    #[serde(rename = "single-collection", alias = "single")]
    Single,
    #[serde(rename = "multi-collection", alias = "multi")]
    Multi,
    #[serde(rename = "all-collections", alias = "all")]
    All,
}

impl RoutingStrategy {
    /// Strategy implied by a selection size
    pub fn infer(collection_count: usize) -> Self {
        match collection_count {
            0 | 1 => RoutingStrategy::Single,
            2..=3 => RoutingStrategy::Multi,
            _ => RoutingStrategy::All,
        }
    }
}

/// Output of collection routing; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub selected_collections: Vec<CollectionWeight>,
    pub strategy: RoutingStrategy,
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_entity_types: Option<Vec<String>>,
}

impl RoutingResult {
    /// Sorted, comma-joined vendor ids
    pub fn vendor_list(&self) -> Vec<String> {
        let mut vendors: Vec<String> = self
            .selected_collections
            .iter()
            .map(|c| c.vendor.clone())
            .collect();
        vendors.sort();
        vendors
    }
}

/// Bookkeeping for one retrieval run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetadata {
    pub queries_executed: usize,
    pub total_duration_ms: u64,
    pub documents_per_collection: BTreeMap<String, usize>,
    pub from_cache: bool,
}

/// Documents plus retrieval bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutput {
    pub documents: Vec<WeightedDocument>,
    pub retrieval_metadata: RetrievalMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_id() {
        let doc = Document::new("some content").with_id("pr-42").with_type("pull_request");
        assert_eq!(doc.identity(), "pr-42");
    }

    #[test]
    fn test_identity_falls_back_to_type_and_prefix() {
        let long = "x".repeat(250);
        let doc = Document::new(long).with_type("tweet");
        let id = doc.identity();
        assert!(id.starts_with("tweet:"));
        assert_eq!(id.len(), "tweet:".len() + 100);

        let untyped = Document::new("hello");
        assert_eq!(untyped.identity(), "unknown:hello");
    }

    #[test]
    fn test_metadata_roundtrip_keeps_extra_fields() {
        let json = r#"{
            "pageContent": "Merged the parser rewrite",
            "metadata": {"id": "1", "__type": "pull_request", "mergedAt": "2026-10-10T12:00:00Z", "number": 7}
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.metadata.doc_type.as_deref(), Some("pull_request"));
        assert_eq!(doc.metadata.get_str("mergedAt"), Some("2026-10-10T12:00:00Z"));
        assert_eq!(doc.metadata.get_f64("number"), Some(7.0));
    }

    #[test]
    fn test_strategy_inference() {
        assert_eq!(RoutingStrategy::infer(1), RoutingStrategy::Single);
        assert_eq!(RoutingStrategy::infer(3), RoutingStrategy::Multi);
        assert_eq!(RoutingStrategy::infer(5), RoutingStrategy::All);
    }
}
