//! Time-window clustering of timestamped documents

use super::document_timestamp;
use crate::analysis::TimeReference;
use crate::document::Document;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::debug;

/// A document paired with its extracted timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct TimedDocument {
    pub document: Document,
    pub timestamp: DateTime<Utc>,
}

/// Documents that happened close together
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalCluster {
    /// Earliest timestamp in the cluster
    pub start: DateTime<Utc>,
    /// Latest timestamp in the cluster
    pub end: DateTime<Utc>,
    /// Timestamp of the document that seeded the cluster
    pub center: DateTime<Utc>,
    /// Members in chronological order
    pub entities: Vec<TimedDocument>,
}

impl TemporalCluster {
    pub fn span_hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }
}

/// Groups documents into scenes
#[derive(Debug, Clone)]
pub struct TemporalCorrelator {
    default_window_hours: f64,
    merge_gap: Duration,
}

impl TemporalCorrelator {
    pub fn new(default_window_hours: f64, merge_gap_minutes: i64) -> Self {
        Self {
            default_window_hours,
            merge_gap: Duration::minutes(merge_gap_minutes),
        }
    }

    /// Correlate only when some document is timestamped and several entity types are present
    pub fn should_correlate(documents: &[Document]) -> bool {
        let types: HashSet<&str> = documents
            .iter()
            .map(|d| d.metadata.type_or_unknown())
            .collect();
        types.len() > 1 && documents.iter().any(|d| document_timestamp(d).is_some())
    }

    /// Window implied by the query's time reference, or the default
    pub fn window_for(&self, reference: Option<&TimeReference>) -> f64 {
        reference
            .and_then(TimeReference::cluster_window_hours)
            .unwrap_or(self.default_window_hours)
    }

    /// Cluster timestamped documents; the rest are ignored
    ///
    /// Clusters come out newest first. Each unassigned document seeds a window of
    /// `±window_hours` and absorbs every unassigned document inside it. Neighbouring
    /// clusters that overlap or sit within the merge gap are joined.
    pub fn correlate(&self, documents: &[Document], window_hours: f64) -> Vec<TemporalCluster> {
        let mut timed: Vec<TimedDocument> = documents
            .iter()
            .filter_map(|d| {
                document_timestamp(d).map(|timestamp| TimedDocument {
                    document: d.clone(),
                    timestamp,
                })
            })
            .collect();

        if timed.is_empty() {
            debug!("No timestamped documents to correlate");
            return Vec::new();
        }

        timed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let window = Duration::milliseconds((window_hours * 3_600_000.0) as i64);
        let clusters = merge_adjacent(seed_clusters(timed, window), self.merge_gap);

        debug!(
            "Temporal correlation: {} documents -> {} clusters (window {}h)",
            documents.len(),
            clusters.len(),
            window_hours
        );

        clusters
            .into_iter()
            .map(|mut cluster| {
                cluster.entities.sort_by_key(|e| e.timestamp);
                cluster
            })
            .collect()
    }
}

impl Default for TemporalCorrelator {
    fn default() -> Self {
        Self::new(3.0, 30)
    }
}

fn seed_clusters(timed: Vec<TimedDocument>, window: Duration) -> Vec<TemporalCluster> {
    let mut assigned = vec![false; timed.len()];
    let mut clusters = Vec::new();

    for i in 0..timed.len() {
        if assigned[i] {
            continue;
        }
        let center = timed[i].timestamp;
        let (lo, hi) = (center - window, center + window);

        let mut members = Vec::new();
        for j in i..timed.len() {
            if !assigned[j] && timed[j].timestamp >= lo && timed[j].timestamp <= hi {
                assigned[j] = true;
                members.push(timed[j].clone());
            }
        }

        let start = members.iter().map(|m| m.timestamp).min().unwrap_or(center);
        let end = members.iter().map(|m| m.timestamp).max().unwrap_or(center);
        clusters.push(TemporalCluster {
            start,
            end,
            center,
            entities: members,
        });
    }

    clusters
}

fn merge_adjacent(clusters: Vec<TemporalCluster>, gap: Duration) -> Vec<TemporalCluster> {
    let mut merged: Vec<TemporalCluster> = Vec::new();

    for next in clusters {
        match merged.last_mut() {
            // newest first: `next` is older than `current`
            Some(current) if next.end >= current.start || current.start - next.end <= gap => {
                current.start = current.start.min(next.start);
                current.end = current.end.max(next.end);
                current.entities.extend(next.entities);
            }
            _ => merged.push(next),
        }
    }

    merged
}
