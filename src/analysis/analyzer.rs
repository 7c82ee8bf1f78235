//! Deterministic query classifier

use super::patterns::QueryPatterns;
use super::{Complexity, ConversationTurn, QueryIntent, ResponseStyle, TimeReference};
use crate::error::Result;
use std::sync::Arc;
use tracing::debug;

const COMMAND_VERBS: &[&str] = &["show", "tell", "give", "get", "find", "search", "list"];

/// Classifies queries with pre-compiled patterns; no model calls
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    patterns: Arc<QueryPatterns>,
}

impl QueryAnalyzer {
    pub fn new(patterns: QueryPatterns) -> Self {
        Self {
            patterns: Arc::new(patterns),
        }
    }

    /// Analyzer over the built-in pattern tables
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(QueryPatterns::builtin()?))
    }

    /// Classify a query
    pub fn analyze(&self, query: &str) -> QueryIntent {
        let trimmed = query.trim();
        let word_count = trimmed.split_whitespace().count();
        let primary_focus = primary_focus(trimmed);

        // Greetings short-circuit everything else
        if self.is_greeting(trimmed) {
            debug!("Greeting detected: {:?}", trimmed);
            return QueryIntent {
                query: trimmed.to_string(),
                entity_types: Vec::new(),
                is_temporal: false,
                time_reference: None,
                is_greeting: true,
                is_broad: false,
                complexity: Complexity::Simple,
                style: ResponseStyle::Concise,
                primary_focus,
                has_context_marker: false,
                word_count,
            };
        }

        let entity_types = self.detect_entities(trimmed);
        let time_reference = self.detect_temporal(trimmed);
        let is_broad = self.is_broad(trimmed, word_count, entity_types.len());
        let complexity = complexity(word_count, entity_types.len());
        let style = self.style(trimmed, complexity);
        let has_context_marker = self
            .patterns
            .context_marker
            .as_ref()
            .map(|r| r.is_match(trimmed))
            .unwrap_or(false);

        let intent = QueryIntent {
            query: trimmed.to_string(),
            entity_types,
            is_temporal: time_reference.is_some(),
            time_reference,
            is_greeting: false,
            is_broad,
            complexity,
            style,
            primary_focus,
            has_context_marker,
            word_count,
        };

        debug!(
            "Query analyzed: entities={:?}, temporal={:?}, broad={}, complexity={:?}, fast_path={}",
            intent.entity_types,
            intent.time_reference,
            intent.is_broad,
            intent.complexity,
            intent.should_use_fast_path()
        );

        intent
    }

    /// A rewrite is worth a model call only when the query is ambiguous and there is history
    pub fn needs_rewrite(&self, intent: &QueryIntent, history: &[ConversationTurn]) -> bool {
        !history.is_empty() && !intent.is_greeting && intent.is_ambiguous()
    }

    fn is_greeting(&self, query: &str) -> bool {
        self.patterns.greeting.iter().any(|r| r.is_match(query))
    }

    /// Entity types in first-detected order, without duplicates
    fn detect_entities(&self, query: &str) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for keyword in &self.patterns.entities {
            if keyword.regex.is_match(query) {
                for entity_type in &keyword.entity_types {
                    if !found.contains(entity_type) {
                        found.push(entity_type.clone());
                    }
                }
            }
        }
        found
    }

    /// First matching temporal pattern wins
    fn detect_temporal(&self, query: &str) -> Option<TimeReference> {
        self.patterns.temporal.iter().find_map(|pattern| {
            pattern.regex.captures(query).map(|caps| {
                let mut normalized = String::new();
                caps.expand(&pattern.normalized, &mut normalized);
                TimeReference::new(normalized)
            })
        })
    }

    fn is_broad(&self, query: &str, word_count: usize, entity_count: usize) -> bool {
        (word_count <= 3 && entity_count == 0) || self.patterns.broad.iter().any(|r| r.is_match(query))
    }

    fn style(&self, query: &str, complexity: Complexity) -> ResponseStyle {
        if self.patterns.technical.iter().any(|r| r.is_match(query)) {
            ResponseStyle::Technical
        } else if complexity == Complexity::Simple {
            ResponseStyle::Concise
        } else if self.patterns.creative.iter().any(|r| r.is_match(query)) {
            ResponseStyle::Creative
        } else {
            ResponseStyle::Detailed
        }
    }
}

fn complexity(word_count: usize, entity_count: usize) -> Complexity {
    if word_count < 6 && entity_count <= 1 {
        Complexity::Simple
    } else if word_count > 15 || entity_count >= 3 {
        Complexity::Complex
    } else {
        Complexity::Moderate
    }
}

/// Strip a leading command ("show me the ...") and trailing question marks
fn primary_focus(query: &str) -> String {
    let mut words: Vec<&str> = query.split_whitespace().collect();

    if let Some(first) = words.first() {
        if COMMAND_VERBS.contains(&first.to_lowercase().as_str()) {
            words.remove(0);
            if words.first().map(|w| w.eq_ignore_ascii_case("me")).unwrap_or(false) {
                words.remove(0);
            }
            if words.first().map(|w| w.eq_ignore_ascii_case("the")).unwrap_or(false) {
                words.remove(0);
            }
        }
    }

    words.join(" ").trim_end_matches('?').trim().to_string()
}
