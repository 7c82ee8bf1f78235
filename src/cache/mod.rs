//! Caches shared across retrieval runs

mod semantic;

pub use semantic::{collection_context, normalize_query, CacheEntry, CacheSettings, SemanticCache};
