//! Query-keyed retrieval cache with TTL expiry and LRU eviction

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const MIN_CAPACITY: usize = 1;
const MAX_CAPACITY: usize = 128;

/// Cache tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 15 * 60,
            capacity: 64,
        }
    }
}

/// Trim, lower-case and collapse whitespace
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `collections:` followed by the sorted, comma-joined vendor ids
pub fn collection_context<S: AsRef<str>>(vendors: &[S]) -> String {
    let mut sorted: Vec<&str> = vendors.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();
    format!("collections:{}", sorted.join(","))
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub inserted_at: Instant,
    pub last_access: Instant,
}

/// Retrieval results keyed by normalized query and collection context
#[derive(Debug)]
pub struct SemanticCache<V> {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<AHashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> SemanticCache<V> {
    /// Capacity is clamped to [1, 128]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.clamp(MIN_CAPACITY, MAX_CAPACITY),
            entries: Mutex::new(AHashMap::new()),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(Duration::from_secs(settings.ttl_secs), settings.capacity)
    }

    pub fn key(query: &str, collection_context: &str) -> String {
        format!("{}|{}", normalize_query(query), collection_context)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries stay usable after a panic in another holder of the lock
    fn entries(&self) -> MutexGuard<'_, AHashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Semantic cache lock was poisoned, recovering entries");
            self.entries.clear_poison();
            PoisonError::into_inner(poisoned)
        })
    }

    /// Cached value, refreshing its recency; expired entries are removed
    pub fn get(&self, query: &str, collection_context: &str) -> Option<V> {
        let key = Self::key(query, collection_context);
        let mut entries = self.entries();

        let expired = match entries.get_mut(&key) {
            None => return None,
            Some(entry) if entry.inserted_at.elapsed() >= self.ttl => true,
            Some(entry) => {
                entry.last_access = Instant::now();
                debug!("Semantic cache hit: {}", key);
                return Some(entry.value.clone());
            }
        };

        if expired {
            entries.remove(&key);
            debug!("Semantic cache entry expired: {}", key);
        }
        None
    }

    /// Store a value, evicting the least recently used entry when full
    pub fn set(&self, query: &str, collection_context: &str, value: V) {
        let key = Self::key(query, collection_context);
        let mut entries = self.entries();

        let ttl = self.ttl;
        entries.retain(|_, e| e.inserted_at.elapsed() < ttl);

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!("Semantic cache evicting {}", oldest);
                entries.remove(&oldest);
            }
        }

        let now = Instant::now();
        entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                inserted_at: now,
                last_access: now,
            },
        );
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries();
        let count = entries.len();
        entries.clear();
        debug!("Semantic cache invalidated ({} entries)", count);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_and_context() {
        assert_eq!(normalize_query("  Show   MY\tTracks "), "show my tracks");
        assert_eq!(collection_context(&["x", "github", "spotify"]), "collections:github,spotify,x");
        assert_eq!(
            SemanticCache::<u32>::key("Hi  There", "collections:a"),
            "hi there|collections:a"
        );
    }

    #[test]
    fn test_round_trip_across_formatting() {
        let cache = SemanticCache::new(Duration::from_secs(60), 8);
        let ctx = collection_context(&["github", "spotify"]);
        cache.set("My Repos", &ctx, 7u32);

        assert_eq!(cache.get("  my   repos ", &ctx), Some(7));
        assert_eq!(cache.get("my repos", "collections:github"), None);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = SemanticCache::new(Duration::ZERO, 8);
        cache.set("q", "collections:x", 1u32);
        assert_eq!(cache.get("q", "collections:x"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = SemanticCache::new(Duration::from_secs(60), 2);
        cache.set("a", "c", 1u32);
        std::thread::sleep(Duration::from_millis(2));
        cache.set("b", "c", 2u32);
        std::thread::sleep(Duration::from_millis(2));

        // touch "a" so "b" becomes least recently used
        assert_eq!(cache.get("a", "c"), Some(1));
        std::thread::sleep(Duration::from_millis(2));
        cache.set("c", "c", 3u32);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b", "c"), None);
        assert_eq!(cache.get("a", "c"), Some(1));
        assert_eq!(cache.get("c", "c"), Some(3));
    }

    #[test]
    fn test_poisoned_lock_keeps_cache_working() {
        let cache = std::sync::Arc::new(SemanticCache::new(Duration::from_secs(60), 4));
        cache.set("before", "c", 1u32);

        let holder = cache.clone();
        let outcome = std::thread::spawn(move || {
            let _guard = holder.entries.lock().unwrap();
            panic!("writer crashed while holding the cache lock");
        })
        .join();
        assert!(outcome.is_err());
        assert!(cache.entries.is_poisoned());

        assert_eq!(cache.get("before", "c"), Some(1));
        cache.set("after", "c", 2u32);
        assert_eq!(cache.get("after", "c"), Some(2));
        assert_eq!(cache.len(), 2);
        assert!(!cache.entries.is_poisoned());

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_clamp_and_invalidate() {
        assert_eq!(SemanticCache::<u32>::new(Duration::from_secs(1), 0).capacity(), 1);
        assert_eq!(SemanticCache::<u32>::new(Duration::from_secs(1), 1000).capacity(), 128);

        let cache = SemanticCache::new(Duration::from_secs(60), 4);
        cache.set("a", "c", 1u32);
        cache.set("b", "c", 2u32);
        cache.invalidate_all();
        assert!(cache.is_empty());
    }
}
