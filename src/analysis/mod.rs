//! Query analysis
//!
//! Deterministic, model-free classification of a raw query: which entity types it is
//! about, whether it refers to a point in time, whether it is small talk, how broad
//! and complex it is, and which response style it asks for. The resulting
//! [`QueryIntent`] decides whether the cheap single-collection fast path applies.

mod analyzer;
mod patterns;
mod rewrite;
mod time_reference;

pub use analyzer::QueryAnalyzer;
pub use patterns::{EntityKeywordConfig, QueryPatterns, QueryPatternsConfig, TemporalPatternConfig};
pub use rewrite::QueryRewriter;
pub use time_reference::TimeReference;

use serde::{Deserialize, Serialize};

/// Complexity bucket derived from word and entity counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Response style the query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    Concise,
    Technical,
    Creative,
    Detailed,
}

/// One prior conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Classification of one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    /// Query text the intent was computed from (rewritten when a rewrite happened)
    pub query: String,
    pub entity_types: Vec<String>,
    pub is_temporal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_reference: Option<TimeReference>,
    pub is_greeting: bool,
    pub is_broad: bool,
    pub complexity: Complexity,
    pub style: ResponseStyle,
    /// Query with command verbs and trailing punctuation stripped
    pub primary_focus: String,
    /// Whether the query mentions a context marker ("it", "those", "again", ...)
    pub has_context_marker: bool,
    pub word_count: usize,
}

impl QueryIntent {
    /// Fast path: not broad, simple, not temporal, and at most one entity type
    pub fn should_use_fast_path(&self) -> bool {
        !self.is_greeting
            && !self.is_broad
            && self.complexity == Complexity::Simple
            && !self.is_temporal
            && self.entity_types.len() <= 1
    }

    /// Greetings and small talk are answered without evidence
    pub fn needs_retrieval(&self) -> bool {
        !self.is_greeting
    }

    /// Ambiguous queries benefit from a rewrite when there is history to draw on
    pub fn is_ambiguous(&self) -> bool {
        self.is_broad
            || (self.complexity == Complexity::Simple && self.entity_types.is_empty())
            || self.has_context_marker
    }
}
