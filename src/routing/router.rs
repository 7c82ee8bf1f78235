//! Weighted collection selection

use super::ExistenceCache;
use crate::analysis::QueryIntent;
use crate::collections::{CollectionDef, CollectionRegistry};
use crate::document::{CollectionWeight, RoutingResult, RoutingStrategy};
use crate::error::{RecallError, Result};
use crate::providers::{GenerationModel, ModelError, VectorStore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Queries matching these go to every enabled collection without a model call
const BROAD_PATTERNS: &[&str] = &[
    r"^(what|who|how)\s+(are|is)\s+(you|this)",
    r"^(tell|show)\s+me\s+(about\s+)?(yourself|you|everything)",
    r"^(hello|hi|hey|help)\b",
    r"^what\s+can\s+you\s+do",
    r"^(give|show)\s+me\s+(an?\s+)?overview",
    r"^summarize\s+(everything|all|my\s+data)",
    r"everything\s+about",
    r"all\s+my\s+data",
    // activity summaries need every source
    r"summary\s+of\s+(my\s+)?(activity|work|week|month|day)",
    r"my\s+(weekly|daily|monthly)\s+(activity|report|summary)",
    r"(what|show).+(i\s+did|my\s+activity|been\s+up\s+to)",
    r"weekly\s+report",
    r"activity\s+(from|this|last)\s+(week|month|day)",
    r"include\s+.*(summary|activity)",
    r"summarize\s+my\s+(week|month|activity)",
];

/// Weight given to a collection selected only because it owns a detected entity type
const INTENT_WEIGHT: f32 = 0.8;

/// Router tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Ask the generation model when one is configured
    pub use_model: bool,
    pub temperature: f32,
    /// Model selections weighted below this are dropped
    pub min_confidence: f32,
    /// Heuristic routing keeps at most this many collections
    pub max_collections: usize,
    /// Skip the model when the heuristic is at least this confident; above 0.9 the model is always asked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heuristic_shortcut_confidence: Option<f32>,
    pub model_timeout_ms: u64,
    pub existence_ttl_secs: u64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            use_model: true,
            temperature: 0.3,
            min_confidence: 0.4,
            max_collections: 4,
            heuristic_shortcut_confidence: Some(0.5),
            model_timeout_ms: 5000,
            existence_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelRouting {
    #[serde(default)]
    strategy: Option<RoutingStrategy>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    selected_collections: Vec<ModelSelection>,
}

#[derive(Debug, Deserialize)]
struct ModelSelection {
    vendor: String,
    weight: f32,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Picks collections and weights for a query
pub struct CollectionRouter {
    registry: Arc<CollectionRegistry>,
    store: Arc<dyn VectorStore>,
    model: Option<Arc<dyn GenerationModel>>,
    existence: Arc<ExistenceCache>,
    broad_patterns: Vec<Regex>,
    settings: RouterSettings,
}

impl CollectionRouter {
    pub fn new(
        registry: Arc<CollectionRegistry>,
        store: Arc<dyn VectorStore>,
        settings: RouterSettings,
    ) -> Result<Self> {
        let broad_patterns = BROAD_PATTERNS
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p))
                    .map_err(|e| RecallError::Config(format!("Invalid routing pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let existence = Arc::new(ExistenceCache::new(Duration::from_secs(
            settings.existence_ttl_secs,
        )));

        Ok(Self {
            registry,
            store,
            model: None,
            existence,
            broad_patterns,
            settings,
        })
    }

    pub fn with_model(mut self, model: Arc<dyn GenerationModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Share an existence cache with other components
    pub fn with_existence_cache(mut self, existence: Arc<ExistenceCache>) -> Self {
        self.existence = existence;
        self
    }

    pub fn existence_cache(&self) -> Arc<ExistenceCache> {
        Arc::clone(&self.existence)
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    /// Route a query, then keep only collections that exist in the store
    pub async fn route(&self, query: &str, intent: Option<&QueryIntent>) -> RoutingResult {
        let selected = self.select(query, intent).await;
        self.filter_existing(selected).await
    }

    async fn select(&self, query: &str, intent: Option<&QueryIntent>) -> RoutingResult {
        if self.is_broad(query) {
            info!("Broad query detected, selecting all enabled collections");
            return self.all_enabled(
                self.registry.enabled(),
                "Broad or ambiguous query - searching all enabled collections",
                0.8,
            );
        }

        let heuristic = self.heuristic_route(query, intent);

        let model = match &self.model {
            Some(model) if self.settings.use_model => model,
            _ => {
                debug!(
                    "Heuristic routing: {} collections, confidence {:.2}",
                    heuristic.selected_collections.len(),
                    heuristic.confidence
                );
                return heuristic;
            }
        };

        if let Some(threshold) = self.settings.heuristic_shortcut_confidence {
            if heuristic.confidence >= threshold {
                debug!("Heuristic confidence {:.2} >= {:.2}, skipping model", heuristic.confidence, threshold);
                return heuristic;
            }
        }

        match self.model_route(model.as_ref(), query, intent).await {
            Ok(result) => {
                info!(
                    "Model routing: strategy={:?}, collections={}",
                    result.strategy,
                    describe(&result.selected_collections)
                );
                result
            }
            Err(e) => {
                warn!("Model collection routing failed, using heuristic result: {}", e);
                heuristic
            }
        }
    }

    /// Short queries and overview or activity-summary phrasing
    pub fn is_broad(&self, query: &str) -> bool {
        let normalized = query.trim().to_lowercase();
        if normalized.split_whitespace().count() <= 2 {
            return true;
        }
        self.broad_patterns.iter().any(|p| p.is_match(&normalized))
    }

    async fn model_route(
        &self,
        model: &dyn GenerationModel,
        query: &str,
        intent: Option<&QueryIntent>,
    ) -> std::result::Result<RoutingResult, ModelError> {
        let prompt = self.prompt(query, intent);
        let timeout = Duration::from_millis(self.settings.model_timeout_ms);

        let response = tokio::time::timeout(
            timeout,
            model.generate_structured(&routing_schema(), &prompt, self.settings.temperature),
        )
        .await
        .map_err(|_| ModelError::Timeout {
            millis: self.settings.model_timeout_ms,
        })??;

        self.validate_model_response(response, intent)
    }

    fn prompt(&self, query: &str, intent: Option<&QueryIntent>) -> String {
        let collections: Vec<String> = self
            .registry
            .enabled()
            .map(|c| {
                format!(
                    "- {}: {} (entity types: {})",
                    c.vendor,
                    c.rerank_context,
                    if c.entity_types.is_empty() {
                        "any".to_string()
                    } else {
                        c.entity_types.join(", ")
                    }
                )
            })
            .collect();

        let mut hints: Vec<String> = Vec::new();
        if let Some(intent) = intent {
            hints.extend(intent.entity_types.iter().cloned());
            if let Some(reference) = &intent.time_reference {
                hints.push(format!("temporal:{}", reference));
            }
        }

        format!(
            "Select the data collections that can answer the user's query and weight each one \
             between 0 and 1 by relevance.\n\nAvailable collections:\n{}\n\nDetected hints: {}\n\n\
             Query: {}",
            collections.join("\n"),
            if hints.is_empty() {
                "none".to_string()
            } else {
                hints.join(", ")
            },
            query
        )
    }

    /// Validate a raw model response against the registry
    ///
    /// Unknown and disabled vendors are dropped with a warning, as are weights below
    /// `min_confidence`. When nothing survives every enabled collection is selected.
    pub fn validate_model_response(
        &self,
        response: Value,
        intent: Option<&QueryIntent>,
    ) -> std::result::Result<RoutingResult, ModelError> {
        let parsed: ModelRouting = serde_json::from_value(response)
            .map_err(|e| ModelError::InvalidResponse(format!("routing response: {}", e)))?;

        let mut selected: Vec<CollectionWeight> = Vec::new();
        for item in parsed.selected_collections {
            let def = match self.registry.require(&item.vendor) {
                Ok(def) => def,
                Err(e) => {
                    warn!("Dropping model selection: {}", e);
                    continue;
                }
            };
            if !def.enabled {
                warn!("Collection {} is not enabled, dropping", def.vendor);
                continue;
            }
            if item.weight < self.settings.min_confidence {
                debug!("Dropping {} with weight {:.2}", def.vendor, item.weight);
                continue;
            }

            let mut weight = CollectionWeight::new(def.vendor.clone(), item.weight.clamp(0.0, 1.0));
            weight.reasoning = item.reasoning;
            selected.push(weight);
        }
        sort_by_weight(&mut selected);

        if selected.is_empty() {
            warn!("No valid collections in model response, using all enabled collections");
            let reason = parsed
                .reasoning
                .unwrap_or_else(|| "No collections met threshold".to_string());
            return Ok(self.all_enabled(self.registry.enabled(), &reason, 0.5));
        }

        let strategy = parsed
            .strategy
            .unwrap_or_else(|| RoutingStrategy::infer(selected.len()));

        Ok(RoutingResult {
            strategy,
            confidence: parsed.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            reasoning: parsed
                .reasoning
                .unwrap_or_else(|| "Model-based collection routing".to_string()),
            suggested_entity_types: intent.map(|i| self.valid_entity_types(&i.entity_types)),
            selected_collections: selected,
        })
    }

    /// Keyword and entity-type scoring, no model call
    pub fn heuristic_route(&self, query: &str, intent: Option<&QueryIntent>) -> RoutingResult {
        let lower = query.to_lowercase();
        let mut selected: Vec<CollectionWeight> = Vec::new();
        let mut total_matches = 0usize;

        for def in self.registry.enabled() {
            if def.keywords.is_empty() {
                continue;
            }
            let matches = def
                .keywords
                .iter()
                .filter(|k| lower.contains(k.as_str()))
                .count();
            if matches > 0 {
                total_matches += matches;
                let raw = matches as f32 / def.keywords.len() as f32 + 0.5;
                selected.push(
                    CollectionWeight::new(def.vendor.clone(), raw)
                        .with_reasoning(format!("Keyword match ({} keywords)", matches)),
                );
            }
        }

        let suggested = intent.map(|i| self.valid_entity_types(&i.entity_types));
        if let Some(entity_types) = suggested.as_ref().filter(|t| !t.is_empty()) {
            for def in self.registry.collections_for_entity_types(entity_types) {
                match selected.iter_mut().find(|c| c.vendor == def.vendor) {
                    None => selected.push(
                        CollectionWeight::new(def.vendor.clone(), INTENT_WEIGHT)
                            .with_reasoning("Intent-based selection"),
                    ),
                    Some(existing) if existing.weight < INTENT_WEIGHT => {
                        existing.weight = INTENT_WEIGHT;
                        existing.reasoning = Some(format!(
                            "{} + intent",
                            existing.reasoning.as_deref().unwrap_or("Keyword match")
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        if selected.is_empty() {
            return self.all_enabled(self.registry.enabled(), "No keyword or intent matches", 0.5);
        }

        let cap = match selected.len() {
            1 => 1.0,
            2 => 0.8,
            _ => 0.7,
        };
        for weight in &mut selected {
            weight.weight = weight.weight.min(cap);
        }
        sort_by_weight(&mut selected);

        let strategy = RoutingStrategy::infer(selected.len());
        selected.truncate(self.settings.max_collections.max(1));

        RoutingResult {
            selected_collections: selected,
            strategy,
            confidence: (0.5 + 0.1 * total_matches as f32).min(0.9),
            reasoning: format!("Keyword routing for \"{}\"", truncate(query, 80)),
            suggested_entity_types: suggested,
        }
    }

    /// Drop collections missing from the store
    async fn filter_existing(&self, result: RoutingResult) -> RoutingResult {
        let existing = match self.existence.existing(self.store.as_ref()).await {
            Ok(names) => names,
            Err(e) => {
                warn!("Could not list collections, keeping unfiltered selection: {}", e);
                return result;
            }
        };

        let before = result.selected_collections.len();
        let kept: Vec<CollectionWeight> = result
            .selected_collections
            .iter()
            .filter(|c| existing.contains(&self.registry.collection_name(&c.vendor)))
            .cloned()
            .collect();

        if kept.len() == before {
            return result;
        }

        if kept.is_empty() {
            warn!("No selected collection exists, using all existing enabled collections");
            let available = self
                .registry
                .enabled()
                .filter(|c| existing.contains(&c.collection_name()));
            return self.all_enabled(available, "Selected collections do not exist", 0.5);
        }

        debug!("Existence filter kept {} of {} collections", kept.len(), before);
        RoutingResult {
            strategy: RoutingStrategy::infer(kept.len()),
            selected_collections: kept,
            ..result
        }
    }

    /// Vendors of enabled collections present in the store, sorted
    pub async fn existing_vendors(&self) -> Vec<String> {
        let existing: Option<HashSet<String>> = self.existence.existing(self.store.as_ref()).await.ok();
        let mut vendors: Vec<String> = self
            .registry
            .enabled()
            .filter(|c| {
                existing
                    .as_ref()
                    .map(|names| names.contains(&c.collection_name()))
                    .unwrap_or(true)
            })
            .map(|c| c.vendor.clone())
            .collect();
        vendors.sort();
        vendors
    }

    /// Force the next existence check to list the store
    pub fn invalidate_existence(&self) {
        self.existence.invalidate();
    }

    fn all_enabled<'a>(
        &self,
        collections: impl Iterator<Item = &'a CollectionDef>,
        reason: &str,
        confidence: f32,
    ) -> RoutingResult {
        let selected: Vec<CollectionWeight> = collections
            .map(|c| {
                CollectionWeight::new(c.vendor.clone(), c.default_weight)
                    .with_reasoning("Fallback to all enabled collections")
            })
            .collect();

        RoutingResult {
            selected_collections: selected,
            strategy: RoutingStrategy::All,
            confidence,
            reasoning: format!("All enabled collections selected: {}", reason),
            suggested_entity_types: None,
        }
    }

    fn valid_entity_types(&self, entity_types: &[String]) -> Vec<String> {
        entity_types
            .iter()
            .filter(|t| self.registry.is_valid_entity_type(t))
            .cloned()
            .collect()
    }
}

fn routing_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "strategy": { "type": "string", "enum": ["single-collection", "multi-collection", "all-collections"] },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "reasoning": { "type": "string" },
            "selectedCollections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "vendor": { "type": "string" },
                        "weight": { "type": "number", "minimum": 0, "maximum": 1 },
                        "reasoning": { "type": "string" }
                    },
                    "required": ["vendor", "weight"]
                }
            }
        },
        "required": ["selectedCollections"]
    })
}

fn sort_by_weight(weights: &mut [CollectionWeight]) {
    weights.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn describe(weights: &[CollectionWeight]) -> String {
    weights
        .iter()
        .map(|c| format!("{}:{:.2}", c.vendor, c.weight))
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::QueryAnalyzer;
    use crate::providers::MemoryVectorStore;
    use async_trait::async_trait;

    struct FixedModel(std::result::Result<Value, String>);

    #[async_trait]
    impl GenerationModel for FixedModel {
        async fn generate_structured(
            &self,
            _schema: &Value,
            _prompt: &str,
            _temperature: f32,
        ) -> std::result::Result<Value, ModelError> {
            self.0.clone().map_err(ModelError::Generation)
        }
    }

    fn store_with_all() -> Arc<MemoryVectorStore> {
        let store = MemoryVectorStore::new();
        for def in CollectionRegistry::builtin().all() {
            store.insert_collection(def.collection_name(), vec![]);
        }
        Arc::new(store)
    }

    fn router(store: Arc<MemoryVectorStore>) -> CollectionRouter {
        router_with(store, RouterSettings::default())
    }

    fn router_with(store: Arc<MemoryVectorStore>, settings: RouterSettings) -> CollectionRouter {
        CollectionRouter::new(Arc::new(CollectionRegistry::builtin()), store, settings).unwrap()
    }

    /// Consults the model on every non-broad query
    fn model_router(model: FixedModel) -> CollectionRouter {
        let settings = RouterSettings {
            heuristic_shortcut_confidence: None,
            ..RouterSettings::default()
        };
        router_with(store_with_all(), settings).with_model(Arc::new(model))
    }

    #[tokio::test]
    async fn test_broad_query_selects_all_enabled() {
        let r = router(store_with_all());
        let result = r.route("what's new", None).await;
        assert_eq!(result.strategy, RoutingStrategy::All);
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert_eq!(
            result.selected_collections.len(),
            CollectionRegistry::builtin().enabled().count()
        );

        assert!(r.is_broad("give me a summary of my activity this week"));
        assert!(!r.is_broad("which pull requests did I merge"));
    }

    #[tokio::test]
    async fn test_heuristic_prefers_matching_vendor() {
        let r = router(store_with_all());
        let analyzer = QueryAnalyzer::builtin().unwrap();
        let intent = analyzer.analyze("which pull requests did I merge on github");
        let result = r.route(&intent.query, Some(&intent)).await;

        assert_eq!(result.selected_collections[0].vendor, "github");
        assert!(result.selected_collections[0].weight <= 1.0);
        assert!(result.confidence >= 0.5 && result.confidence <= 0.9);
        assert_eq!(
            result.suggested_entity_types.as_deref(),
            Some(&["pull_request".to_string()][..])
        );
    }

    #[test]
    fn test_heuristic_normalizes_multi_collection_weights() {
        let r = router(store_with_all());
        let result = r.heuristic_route("songs on spotify and my github repos and linear tickets", None);
        assert!(result.selected_collections.len() >= 3);
        for c in &result.selected_collections {
            assert!(c.weight <= 0.7 + 1e-6, "{} {}", c.vendor, c.weight);
        }
        assert!(result.selected_collections.len() <= 4);
    }

    #[test]
    fn test_heuristic_without_matches_falls_back_to_all() {
        let r = router(store_with_all());
        let result = r.heuristic_route("zzz qqq xxx yyy", None);
        assert_eq!(result.strategy, RoutingStrategy::All);
        assert!((result.confidence - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_model_response_validation() {
        let response = json!({
            "strategy": "multi-collection",
            "confidence": 1.4,
            "reasoning": "code and tasks",
            "selectedCollections": [
                {"vendor": "linear", "weight": 0.6},
                {"vendor": "myspace", "weight": 0.9},
                {"vendor": "github", "weight": 1.3},
                {"vendor": "x", "weight": 0.1}
            ]
        });
        let r = model_router(FixedModel(Ok(response)));
        let result = r.route("what have I been coding and planning lately", None).await;

        let vendors: Vec<&str> = result
            .selected_collections
            .iter()
            .map(|c| c.vendor.as_str())
            .collect();
        assert_eq!(vendors, vec!["github", "linear"]);
        assert!((result.selected_collections[0].weight - 1.0).abs() < 1e-6);
        assert!((result.confidence - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_model_response_without_survivors_selects_all() {
        let response = json!({
            "selectedCollections": [{"vendor": "github", "weight": 0.2}]
        });
        let r = model_router(FixedModel(Ok(response)));
        let result = r.route("find that thing I mentioned before", None).await;
        assert_eq!(result.strategy, RoutingStrategy::All);
        assert!((result.confidence - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_model_failure_uses_heuristic() {
        let r = model_router(FixedModel(Err("rate limited".to_string())));
        let result = r.route("songs I played on spotify", None).await;
        assert_eq!(result.selected_collections[0].vendor, "spotify");
    }

    #[tokio::test]
    async fn test_confident_heuristic_skips_model() {
        let linear_only = || {
            FixedModel(Ok(json!({
                "strategy": "single-collection",
                "confidence": 0.9,
                "selectedCollections": [{"vendor": "linear", "weight": 0.9}]
            })))
        };
        let query = "songs I played on spotify";

        // keyword hits put the heuristic at or above the default 0.5 cutoff
        let r = router(store_with_all()).with_model(Arc::new(linear_only()));
        let result = r.route(query, None).await;
        assert_eq!(result.selected_collections[0].vendor, "spotify");
        assert!(result.reasoning.starts_with("Keyword routing"));

        let always_ask = router_with(
            store_with_all(),
            RouterSettings {
                heuristic_shortcut_confidence: Some(0.95),
                ..RouterSettings::default()
            },
        )
        .with_model(Arc::new(linear_only()));
        let result = always_ask.route(query, None).await;
        let vendors: Vec<&str> = result
            .selected_collections
            .iter()
            .map(|c| c.vendor.as_str())
            .collect();
        assert_eq!(vendors, vec!["linear"]);
    }

    #[test]
    fn test_keyword_weight_ignores_default_weight() {
        let mut spotify = CollectionRegistry::builtin().get("spotify").unwrap().clone();
        spotify.default_weight = 0.3;
        let keyword_count = spotify.keywords.len() as f32;
        let registry = CollectionRegistry::with_overrides(vec![spotify]).unwrap();
        let r = CollectionRouter::new(Arc::new(registry), store_with_all(), RouterSettings::default())
            .unwrap();

        // "spotify", "song" and "songs"
        let result = r.heuristic_route("songs on spotify", None);
        assert_eq!(result.selected_collections.len(), 1);
        let expected = 3.0 / keyword_count + 0.5;
        assert!((result.selected_collections[0].weight - expected).abs() < 1e-6);
        assert!((result.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_existence_filter() {
        let store = MemoryVectorStore::new();
        store.insert_collection("spotify_collection", vec![]);
        let r = router(Arc::new(store));

        // github does not exist; falls back to the existing enabled collections
        let result = r.route("which repositories did I push on github", None).await;
        let vendors: Vec<&str> = result
            .selected_collections
            .iter()
            .map(|c| c.vendor.as_str())
            .collect();
        assert_eq!(vendors, vec!["spotify"]);
        assert_eq!(r.existing_vendors().await, vec!["spotify".to_string()]);
    }
}
