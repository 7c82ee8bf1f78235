//! Bounded context rendering for the generator

use super::content::{header, ContentRenderer};
use super::correlator::{TemporalCluster, TemporalCorrelator};
use super::document_timestamp;
use crate::analysis::TimeReference;
use crate::document::Document;
use crate::error::Result;
use ahash::AHashMap;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const MIN_CONTEXT_CHARS: usize = 2_000;
pub const MAX_CONTEXT_CHARS: usize = 120_000;

/// Context builder tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Budget in characters (not bytes), clamped to [2000, 120000]
    pub max_chars: usize,
    pub temporal_correlation: bool,
    pub default_window_hours: f64,
    pub merge_gap_minutes: i64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_chars: 18_000,
            temporal_correlation: true,
            default_window_hours: 3.0,
            merge_gap_minutes: 30,
        }
    }
}

/// What went into a rendered context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub document_count: usize,
    /// Rendered length in characters
    pub context_length: usize,
    pub used_temporal_correlation: bool,
    pub scene_count: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltContext {
    pub text: String,
    pub metadata: ContextMetadata,
}

pub struct ContextBuilder {
    renderer: ContentRenderer,
    correlator: TemporalCorrelator,
    settings: ContextSettings,
}

impl ContextBuilder {
    pub fn new(mut settings: ContextSettings) -> Result<Self> {
        settings.max_chars = settings.max_chars.clamp(MIN_CONTEXT_CHARS, MAX_CONTEXT_CHARS);
        Ok(Self {
            renderer: ContentRenderer::new()?,
            correlator: TemporalCorrelator::new(
                settings.default_window_hours,
                settings.merge_gap_minutes,
            ),
            settings,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.settings.max_chars
    }

    pub fn renderer(&self) -> &ContentRenderer {
        &self.renderer
    }

    pub fn build(&self, documents: &[Document], time_reference: Option<&TimeReference>) -> BuiltContext {
        self.build_at(documents, time_reference, Utc::now())
    }

    /// Render documents as scenes when they correlate in time, flat otherwise
    pub fn build_at(
        &self,
        documents: &[Document],
        time_reference: Option<&TimeReference>,
        now: DateTime<Utc>,
    ) -> BuiltContext {
        let mut metadata = ContextMetadata {
            document_count: documents.len(),
            ..ContextMetadata::default()
        };

        if documents.is_empty() {
            return BuiltContext {
                text: String::new(),
                metadata,
            };
        }

        let mut text = String::new();
        if self.settings.temporal_correlation && TemporalCorrelator::should_correlate(documents) {
            let window = self.correlator.window_for(time_reference);
            let clusters = self.correlator.correlate(documents, window);
            if !clusters.is_empty() {
                text = self.render_scenes(&clusters, now);
                metadata.used_temporal_correlation = true;
                metadata.scene_count = clusters.len();

                // undated documents follow the scenes as a flat section
                let undated: Vec<Document> = documents
                    .iter()
                    .filter(|d| document_timestamp(d).is_none())
                    .cloned()
                    .collect();
                if !undated.is_empty() {
                    text.push_str("\n\n");
                    text.push_str(&self.render_flat(&undated));
                }
            }
        }
        if !metadata.used_temporal_correlation {
            text = self.render_flat(documents);
        }

        let (text, truncated) = truncate_to_budget(text, self.settings.max_chars);
        let length = text.chars().count();
        if truncated {
            warn!(
                "Context truncated to {} of {} chars budget",
                length, self.settings.max_chars
            );
        }
        metadata.truncated = truncated;
        metadata.context_length = length;

        debug!(
            "Context built: {} documents, {} chars, {} scenes",
            metadata.document_count, metadata.context_length, metadata.scene_count
        );

        BuiltContext { text, metadata }
    }

    /// `### {time label}` blocks with one `#### {header}` entry per document
    pub fn render_scenes(&self, clusters: &[TemporalCluster], now: DateTime<Utc>) -> String {
        clusters
            .iter()
            .filter(|c| !c.entities.is_empty())
            .map(|cluster| {
                let entries: Vec<String> = cluster
                    .entities
                    .iter()
                    .map(|e| {
                        format!(
                            "#### {}\n{}",
                            header(&e.document.metadata),
                            self.renderer.render(&e.document)
                        )
                    })
                    .collect();
                format!("### {}\n\n{}", time_label(cluster, now), entries.join("\n\n"))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// `### {header}` per entity id; content of repeated ids is merged
    pub fn render_flat(&self, documents: &[Document]) -> String {
        let mut order: Vec<String> = Vec::new();
        let mut entries: AHashMap<String, (String, String)> = AHashMap::new();

        for (index, doc) in documents.iter().enumerate() {
            let key = doc
                .metadata
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("#{}", index));
            let content = self.renderer.render(doc);

            match entries.get_mut(&key) {
                Some((_, existing)) => {
                    if !existing.contains(&content) {
                        existing.push('\n');
                        existing.push_str(&content);
                    }
                }
                None => {
                    order.push(key.clone());
                    entries.insert(key, (header(&doc.metadata), content));
                }
            }
        }

        order
            .iter()
            .filter_map(|key| entries.get(key))
            .map(|(title, content)| format!("### {}\n{}", title, content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// `M/D/YYYY (time of day)`, plus a relative label for scenes longer than half an hour
fn time_label(cluster: &TemporalCluster, now: DateTime<Utc>) -> String {
    let center = cluster.center;
    let date = center.format("%-m/%-d/%Y").to_string();
    let base = format!("{} ({})", date, time_of_day(center.hour()));

    if cluster.span_hours() <= 0.5 {
        return base;
    }

    let elapsed = now - center;
    let relative = if elapsed.num_minutes() < 60 {
        format!("{} minutes ago", elapsed.num_minutes().max(0))
    } else if elapsed.num_hours() < 24 {
        format!("{} hours ago", elapsed.num_hours())
    } else if elapsed.num_days() < 7 {
        format!("{} days ago", elapsed.num_days())
    } else {
        date
    };
    format!("{} ({})", base, relative)
}

fn time_of_day(hour: u32) -> &'static str {
    match hour {
        0..=5 => "night",
        6..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}

/// Cut at the last newline within the first `max_chars` characters; never mid-line
pub fn truncate_to_budget(text: String, max_chars: usize) -> (String, bool) {
    let Some((limit, _)) = text.char_indices().nth(max_chars) else {
        return (text, false);
    };
    let cut = text[..limit].rfind('\n').unwrap_or(0);
    (text[..cut].trim_end().to_string(), true)
}
