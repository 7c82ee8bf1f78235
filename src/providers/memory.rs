//! In-memory vector store
//!
//! Scores documents by query-term overlap instead of embeddings. Good enough to drive
//! the pipeline from the command line and in tests without a running vector database.

use super::store::{SearchFilter, StoreError, VectorStore};
use crate::document::Document;
use crate::error::{RecallError, Result};
use crate::temporal::document_timestamp;
use ahash::AHashMap;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "what", "did", "was", "were", "are", "is", "my", "me", "on", "in", "of",
    "to", "a", "an", "i", "it", "do", "show", "tell", "about", "with", "from", "at",
];

/// Collections held in memory, keyed by collection name
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    collections: RwLock<AHashMap<String, Vec<Document>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{ "<collection name>": [documents...] }` from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RecallError::Io {
            source: e,
            context: format!("Failed to read document file: {:?}", path),
        })?;
        let collections: BTreeMap<String, Vec<Document>> =
            serde_json::from_str(&content).map_err(|e| RecallError::Json {
                source: e,
                context: format!("Failed to parse document file: {:?}", path),
            })?;

        let store = Self::new();
        for (name, docs) in collections {
            store.insert_collection(name, docs);
        }
        Ok(store)
    }

    /// Create or replace a collection
    pub fn insert_collection(&self, name: impl Into<String>, documents: Vec<Document>) {
        if let Ok(mut collections) = self.collections.write() {
            collections.insert(name.into(), documents);
        }
    }

    /// Drop a collection, as happens when a source is disconnected
    pub fn remove_collection(&self, name: &str) -> bool {
        self.collections
            .write()
            .map(|mut c| c.remove(name).is_some())
            .unwrap_or(false)
    }

    pub fn document_count(&self) -> usize {
        self.collections
            .read()
            .map(|c| c.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn terms(text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.chars().count() >= 2 && !STOPWORDS.contains(t))
            .map(str::to_string)
            .collect()
    }

    fn searchable_text(doc: &Document) -> String {
        let mut text = doc.page_content.clone();
        for value in doc.metadata.extra.values() {
            if let Some(s) = value.as_str() {
                text.push(' ');
                text.push_str(s);
            }
        }
        if let Some(t) = &doc.metadata.doc_type {
            text.push(' ');
            text.push_str(&t.replace('_', " "));
        }
        text
    }

    fn matches_filter(doc: &Document, filter: Option<&SearchFilter>) -> bool {
        let Some(filter) = filter else {
            return true;
        };
        if let Some(types) = &filter.types {
            let doc_type = doc.metadata.type_or_unknown();
            if !types.iter().any(|t| t == doc_type) {
                return false;
            }
        }
        if let Some(range) = &filter.time_range {
            match document_timestamp(doc) {
                Some(ts) if range.contains(ts) => {}
                _ => return false,
            }
        }
        true
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn similarity_search_with_score(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        filter: Option<&SearchFilter>,
        score_threshold: Option<f32>,
    ) -> std::result::Result<Vec<(Document, f32)>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;
        let docs = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound {
                collection: collection.to_string(),
            })?;

        let query_terms = Self::terms(query);
        let threshold = score_threshold.unwrap_or(0.0);

        let mut scored: Vec<(Document, f32)> = docs
            .iter()
            .filter(|doc| Self::matches_filter(doc, filter))
            .filter_map(|doc| {
                let score = if query_terms.is_empty() {
                    0.5
                } else {
                    let doc_terms = Self::terms(&Self::searchable_text(doc));
                    let hits = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
                    hits as f32 / query_terms.len() as f32
                };
                (score > 0.0 && score >= threshold).then(|| (doc.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn list_collections(&self) -> std::result::Result<Vec<String>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
