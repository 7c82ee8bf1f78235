//! Registry of known collections
//!
//! Each collection is one independently indexed partition, scoped to an upstream vendor.
//! The registry is the single authority on which vendor ids are valid, which entity
//! types they own, and how they are weighted when nothing more specific is known.

use crate::error::{RecallError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Vendor id of the catch-all collection
pub const GENERAL_VENDOR: &str = "general";

/// Definition of one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDef {
    pub vendor: String,

    /// Physical collection name in the vector store (defaults to `<vendor>_collection`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub entity_types: Vec<String>,

    #[serde(default = "default_weight")]
    pub default_weight: f32,

    /// Lower-case keywords used by heuristic routing
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Domain phrase used to specialize rerank and adaptation prompts
    #[serde(default = "default_rerank_context")]
    pub rerank_context: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_weight() -> f32 {
    1.0
}

fn default_rerank_context() -> String {
    "relevant content".to_string()
}

fn default_enabled() -> bool {
    true
}

impl CollectionDef {
    fn builtin(
        vendor: &str,
        entity_types: &[&str],
        default_weight: f32,
        keywords: &[&str],
        rerank_context: &str,
    ) -> Self {
        Self {
            vendor: vendor.to_string(),
            name: None,
            entity_types: entity_types.iter().map(|s| s.to_string()).collect(),
            default_weight,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            rerank_context: rerank_context.to_string(),
            enabled: true,
        }
    }

    /// Name of the collection in the vector store
    pub fn collection_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_collection", self.vendor))
    }
}

/// Known collections, in registration order
#[derive(Debug, Clone)]
pub struct CollectionRegistry {
    collections: Vec<CollectionDef>,
}

impl CollectionRegistry {
    /// Build a registry, rejecting duplicate vendor ids
    pub fn new(collections: Vec<CollectionDef>) -> Result<Self> {
        let mut seen = HashSet::new();
        for def in &collections {
            if def.vendor.trim().is_empty() {
                return Err(RecallError::Config(
                    "Collection vendor id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(def.vendor.as_str()) {
                return Err(RecallError::Config(format!(
                    "Duplicate collection vendor: {}",
                    def.vendor
                )));
            }
        }
        Ok(Self { collections })
    }

    /// Built-in collections for the supported connectors
    pub fn builtin_defs() -> Vec<CollectionDef> {
        vec![
            CollectionDef::builtin(
                "spotify",
                &["track", "artist", "playlist", "album", "recently_played"],
                1.0,
                &[
                    "spotify", "song", "songs", "track", "music", "listening", "listened",
                    "played", "playing", "artist", "band", "album", "playlist", "canzone",
                    "musica", "ascoltato", "canción", "música", "escuché",
                ],
                "music and audio content",
            ),
            CollectionDef::builtin(
                "github",
                &["repository", "pull_request", "commit", "repository_file"],
                1.0,
                &[
                    "github", "repo", "repository", "code", "commit", "pull request", "pr",
                    "merge", "merged", "branch", "shipped", "ship", "pushed", "codice",
                    "código",
                ],
                "code repositories and development activity",
            ),
            CollectionDef::builtin(
                "linear",
                &["issue"],
                1.0,
                &[
                    "linear", "issue", "task", "ticket", "backlog", "sprint", "bug", "project",
                    "compito", "tarea",
                ],
                "project tasks and issues",
            ),
            CollectionDef::builtin(
                "x",
                &["tweet"],
                1.0,
                &["tweet", "tweets", "twitter", "posted", "retweet", "x.com"],
                "social media posts and tweets",
            ),
            CollectionDef::builtin(
                "notion",
                &["page"],
                1.0,
                &["notion", "note", "notes", "page", "wiki", "document", "docs", "nota", "apunte"],
                "notes, pages, and knowledge base content",
            ),
            CollectionDef::builtin(
                "slack",
                &["message"],
                1.0,
                &["slack", "channel", "message", "messages", "thread", "dm", "messaggio", "mensaje"],
                "team communication and channel updates",
            ),
            CollectionDef::builtin(
                "google",
                &["event"],
                1.0,
                &["calendar", "meeting", "event", "appointment", "riunione", "reunión"],
                "calendar events and meetings",
            ),
            CollectionDef::builtin(GENERAL_VENDOR, &[], 0.8, &[], "general information"),
        ]
    }

    /// Registry of the built-in collections
    pub fn builtin() -> Self {
        Self {
            collections: Self::builtin_defs(),
        }
    }

    /// Built-in collections with `overrides` replacing same-vendor entries and
    /// appending new ones
    pub fn with_overrides(overrides: Vec<CollectionDef>) -> Result<Self> {
        let mut collections = Self::builtin_defs();
        for def in overrides {
            match collections.iter_mut().find(|c| c.vendor == def.vendor) {
                Some(existing) => *existing = def,
                None => collections.push(def),
            }
        }
        Self::new(collections)
    }

    pub fn all(&self) -> &[CollectionDef] {
        &self.collections
    }

    pub fn enabled(&self) -> impl Iterator<Item = &CollectionDef> {
        self.collections.iter().filter(|c| c.enabled)
    }

    pub fn get(&self, vendor: &str) -> Option<&CollectionDef> {
        self.collections.iter().find(|c| c.vendor == vendor)
    }

    pub fn is_known(&self, vendor: &str) -> bool {
        self.get(vendor).is_some()
    }

    pub fn is_enabled(&self, vendor: &str) -> bool {
        self.get(vendor).map(|c| c.enabled).unwrap_or(false)
    }

    /// Look up a vendor, failing on ids the registry does not know
    pub fn require(&self, vendor: &str) -> Result<&CollectionDef> {
        self.get(vendor).ok_or_else(|| RecallError::UnknownVendor {
            vendor: vendor.to_string(),
        })
    }

    /// Vendor owning an entity type
    pub fn vendor_for_entity_type(&self, entity_type: &str) -> Option<&CollectionDef> {
        self.collections
            .iter()
            .find(|c| c.entity_types.iter().any(|t| t == entity_type))
    }

    /// Distinct enabled collections owning any of the given entity types, in registry order
    pub fn collections_for_entity_types(&self, entity_types: &[String]) -> Vec<&CollectionDef> {
        self.enabled()
            .filter(|c| entity_types.iter().any(|t| c.entity_types.contains(t)))
            .collect()
    }

    /// Entity types known to any collection
    pub fn is_valid_entity_type(&self, entity_type: &str) -> bool {
        self.vendor_for_entity_type(entity_type).is_some()
    }

    /// Physical collection name for a vendor
    pub fn collection_name(&self, vendor: &str) -> String {
        self.get(vendor)
            .map(CollectionDef::collection_name)
            .unwrap_or_else(|| format!("{}_collection", vendor))
    }

    /// Domain phrase for a vendor, "relevant content" for unknown ones
    pub fn rerank_context(&self, vendor: &str) -> String {
        self.get(vendor)
            .map(|c| c.rerank_context.clone())
            .unwrap_or_else(default_rerank_context)
    }
}

impl Default for CollectionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = CollectionRegistry::builtin();
        assert!(registry.is_known("github"));
        assert!(!registry.is_known("myspace"));
        assert_eq!(registry.collection_name("github"), "github_collection");
        assert_eq!(
            registry.vendor_for_entity_type("pull_request").map(|c| c.vendor.as_str()),
            Some("github")
        );
        assert_eq!(registry.get(GENERAL_VENDOR).map(|c| c.default_weight), Some(0.8));
    }

    #[test]
    fn test_duplicate_vendor_rejected() {
        let mut defs = CollectionRegistry::builtin_defs();
        defs.push(defs[0].clone());
        assert!(CollectionRegistry::new(defs).is_err());
    }

    #[test]
    fn test_require_unknown_vendor() {
        let registry = CollectionRegistry::builtin();
        let err = registry.require("friendster").unwrap_err();
        assert!(matches!(err, RecallError::UnknownVendor { .. }));
    }

    #[test]
    fn test_collections_for_entity_types_skips_disabled() {
        let mut defs = CollectionRegistry::builtin_defs();
        for def in defs.iter_mut() {
            if def.vendor == "linear" {
                def.enabled = false;
            }
        }
        let registry = CollectionRegistry::new(defs).unwrap();
        let types = vec!["issue".to_string(), "track".to_string()];
        let vendors: Vec<&str> = registry
            .collections_for_entity_types(&types)
            .iter()
            .map(|c| c.vendor.as_str())
            .collect();
        assert_eq!(vendors, vec!["spotify"]);
    }

    #[test]
    fn test_overrides_replace_and_append() {
        let mut spotify = CollectionRegistry::builtin().get("spotify").unwrap().clone();
        spotify.enabled = false;
        let jira: CollectionDef =
            serde_json::from_value(serde_json::json!({ "vendor": "jira", "entity_types": ["ticket"] }))
                .unwrap();

        let registry = CollectionRegistry::with_overrides(vec![spotify, jira]).unwrap();
        assert!(!registry.is_enabled("spotify"));
        assert_eq!(registry.collection_name("jira"), "jira_collection");
        assert_eq!(registry.all().len(), CollectionRegistry::builtin_defs().len() + 1);
    }
}
