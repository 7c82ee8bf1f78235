//! Per-collection query adaptation

use crate::collections::CollectionRegistry;
use crate::providers::{GenerationModel, ModelError};
use ahash::AHashMap;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default lifetime of an adapted query
pub const ADAPTATION_TTL: Duration = Duration::from_secs(5 * 60);

/// Adapted queries keyed by `(query, vendor)`
#[derive(Debug)]
pub struct AdaptationCache {
    ttl: Duration,
    entries: Mutex<AHashMap<(String, String), (Instant, String)>>,
}

impl AdaptationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(AHashMap::new()),
        }
    }

    pub fn get(&self, query: &str, vendor: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        let key = (query.to_string(), vendor.to_string());
        match entries.get(&key) {
            Some((at, adapted)) if at.elapsed() < self.ttl => Some(adapted.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, query: &str, vendor: &str, adapted: String) {
        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|_, (at, _)| at.elapsed() < ttl);
            entries.insert((query.to_string(), vendor.to_string()), (Instant::now(), adapted));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AdaptationCache {
    fn default() -> Self {
        Self::new(ADAPTATION_TTL)
    }
}

/// Rewrites a query toward one collection's domain
pub struct QueryAdapter {
    model: Arc<dyn GenerationModel>,
    registry: Arc<CollectionRegistry>,
    cache: Arc<AdaptationCache>,
    temperature: f32,
    timeout: Duration,
}

impl QueryAdapter {
    pub fn new(
        model: Arc<dyn GenerationModel>,
        registry: Arc<CollectionRegistry>,
        cache: Arc<AdaptationCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            registry,
            cache,
            temperature: 0.2,
            timeout,
        }
    }

    pub fn cache(&self) -> &AdaptationCache {
        &self.cache
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "adaptedQuery": { "type": "string" }
            },
            "required": ["adaptedQuery"]
        })
    }

    fn prompt(&self, query: &str, vendor: &str) -> String {
        format!(
            "Adapt the search query to the domain of the {} collection ({}).\n\
             Keep names, dates and the user's language. Return a short search query.\n\n\
             Query: {}",
            vendor,
            self.registry.rerank_context(vendor),
            query
        )
    }

    /// Adapted query for `vendor`; any failure yields the original query
    pub async fn adapt(&self, query: &str, vendor: &str) -> String {
        if let Some(adapted) = self.cache.get(query, vendor) {
            debug!("Adaptation cache hit for {}", vendor);
            return adapted;
        }

        match self.request(query, vendor).await {
            Ok(adapted) => {
                debug!("Adapted query for {}: {:?}", vendor, adapted);
                self.cache.set(query, vendor, adapted.clone());
                adapted
            }
            Err(e) => {
                warn!("Query adaptation for {} failed, using original query: {}", vendor, e);
                query.to_string()
            }
        }
    }

    async fn request(&self, query: &str, vendor: &str) -> Result<String, ModelError> {
        let schema = Self::schema();
        let prompt = self.prompt(query, vendor);
        let response = tokio::time::timeout(
            self.timeout,
            self.model.generate_structured(&schema, &prompt, self.temperature),
        )
        .await
        .map_err(|_| ModelError::Timeout {
            millis: self.timeout.as_millis() as u64,
        })??;

        response
            .get("adaptedQuery")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ModelError::InvalidResponse("missing adaptedQuery".to_string()))
    }
}
