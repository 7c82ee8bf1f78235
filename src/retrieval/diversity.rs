//! Source diversity across collections

use crate::document::WeightedDocument;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How collections are interleaved before representation rules apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiversityStrategy {
    RoundRobin,
    #[default]
    Weighted,
    ScoreBased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiversityConfig {
    pub min_per_collection: usize,
    /// Largest share of the output one collection may hold
    pub max_dominance: f32,
    pub enforce_min_representation: bool,
    pub strategy: DiversityStrategy,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            min_per_collection: 3,
            max_dominance: 0.5,
            enforce_min_representation: true,
            strategy: DiversityStrategy::Weighted,
        }
    }
}

struct Group {
    vendor: String,
    avg_weight: f32,
    docs: Vec<WeightedDocument>,
}

/// Keeps any one collection from crowding out the rest
#[derive(Debug, Clone, Default)]
pub struct DiversityEnforcer {
    config: DiversityConfig,
}

impl DiversityEnforcer {
    pub fn new(config: DiversityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiversityConfig {
        &self.config
    }

    fn dominance_cap(&self, n: usize) -> usize {
        ((n as f32 * self.config.max_dominance).ceil() as usize).max(1)
    }

    /// Select at most `n` documents with balanced collection representation
    pub fn enforce(&self, documents: Vec<WeightedDocument>, n: usize) -> Vec<WeightedDocument> {
        if documents.is_empty() || n == 0 {
            return Vec::new();
        }

        let groups = group_by_collection(documents);
        if groups.len() == 1 {
            return groups
                .into_iter()
                .flat_map(|g| g.docs)
                .take(n)
                .collect();
        }

        let mut selected = match self.config.strategy {
            DiversityStrategy::RoundRobin => round_robin(&groups, n),
            DiversityStrategy::Weighted => weighted(&groups, n),
            DiversityStrategy::ScoreBased => score_based(&groups, n, self.dominance_cap(n)),
        };

        if self.config.enforce_min_representation {
            let min = self.config.min_per_collection.min(n / groups.len());
            selected = min_representation(&groups, min, n);
        }

        let mut result = cap_dominance(selected, self.dominance_cap(n));
        result.truncate(n);
        sort_by_score(&mut result);

        debug!(
            "Diversity: {} collections -> {} documents (strategy {:?})",
            groups.len(),
            result.len(),
            self.config.strategy
        );
        result
    }
}

fn sort_by_score(docs: &mut [WeightedDocument]) {
    docs.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Groups in first-seen order, each sorted by score
fn group_by_collection(documents: Vec<WeightedDocument>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for doc in documents {
        match groups.iter_mut().find(|g| g.vendor == doc.collection_vendor) {
            Some(group) => group.docs.push(doc),
            None => groups.push(Group {
                vendor: doc.collection_vendor.clone(),
                avg_weight: 0.0,
                docs: vec![doc],
            }),
        }
    }
    for group in &mut groups {
        sort_by_score(&mut group.docs);
        group.avg_weight =
            group.docs.iter().map(|d| d.collection_weight).sum::<f32>() / group.docs.len() as f32;
    }
    groups
}

fn round_robin(groups: &[Group], n: usize) -> Vec<WeightedDocument> {
    let mut result = Vec::new();
    let mut depth = 0;
    while result.len() < n {
        let mut added = false;
        for group in groups {
            if let Some(doc) = group.docs.get(depth) {
                result.push(doc.clone());
                added = true;
                if result.len() >= n {
                    break;
                }
            }
        }
        if !added {
            break;
        }
        depth += 1;
    }
    result
}

fn weighted(groups: &[Group], n: usize) -> Vec<WeightedDocument> {
    let total: f32 = groups.iter().map(|g| g.avg_weight).sum();
    let targets: Vec<usize> = groups
        .iter()
        .map(|g| {
            let share = if total > 0.0 {
                g.avg_weight / total
            } else {
                1.0 / groups.len() as f32
            };
            ((share * n as f32).ceil() as usize).min(g.docs.len())
        })
        .collect();

    let mut by_weight: Vec<usize> = (0..groups.len()).collect();
    by_weight.sort_by(|&a, &b| {
        groups[b]
            .avg_weight
            .partial_cmp(&groups[a].avg_weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut taken = vec![0usize; groups.len()];
    let mut result = Vec::new();

    'interleave: loop {
        let mut added = false;
        for &g in &by_weight {
            if taken[g] < targets[g] {
                result.push(groups[g].docs[taken[g]].clone());
                taken[g] += 1;
                added = true;
                if result.len() >= n {
                    break 'interleave;
                }
            }
        }
        if !added {
            break;
        }
    }

    if result.len() < n {
        let mut remaining: Vec<WeightedDocument> = groups
            .iter()
            .zip(&taken)
            .flat_map(|(g, &t)| g.docs[t..].iter().cloned())
            .collect();
        sort_by_score(&mut remaining);
        let room = n - result.len();
        result.extend(remaining.into_iter().take(room));
    }
    result
}

fn score_based(groups: &[Group], n: usize, cap: usize) -> Vec<WeightedDocument> {
    let mut all: Vec<WeightedDocument> = groups.iter().flat_map(|g| g.docs.iter().cloned()).collect();
    sort_by_score(&mut all);

    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut result = Vec::new();
    for doc in all {
        let slot = vendor_slot(&mut counts, &doc.collection_vendor);
        if counts[slot].1 < cap {
            counts[slot].1 += 1;
            result.push(doc);
            if result.len() >= n {
                break;
            }
        }
    }
    result
}

fn vendor_slot(counts: &mut Vec<(String, usize)>, vendor: &str) -> usize {
    match counts.iter().position(|(v, _)| v == vendor) {
        Some(i) => i,
        None => {
            counts.push((vendor.to_string(), 0));
            counts.len() - 1
        }
    }
}

/// `min` best documents from every collection, the rest of `n` by best score
fn min_representation(groups: &[Group], min: usize, n: usize) -> Vec<WeightedDocument> {
    let mut result = Vec::new();
    for group in groups {
        let room = n.saturating_sub(result.len());
        result.extend(group.docs.iter().take(min.min(room)).cloned());
        if result.len() >= n {
            return result;
        }
    }

    let mut remaining: Vec<WeightedDocument> = groups
        .iter()
        .flat_map(|g| g.docs.iter().skip(min).cloned())
        .collect();
    sort_by_score(&mut remaining);
    let room = n - result.len();
    result.extend(remaining.into_iter().take(room));
    result
}

/// Keep at most `cap` documents per collection; the excess is discarded
fn cap_dominance(documents: Vec<WeightedDocument>, cap: usize) -> Vec<WeightedDocument> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    documents
        .into_iter()
        .filter(|doc| {
            let slot = vendor_slot(&mut counts, &doc.collection_vendor);
            if counts[slot].1 >= cap {
                return false;
            }
            counts[slot].1 += 1;
            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn docs(vendor: &str, weight: f32, count: usize, top: f32) -> Vec<WeightedDocument> {
        (0..count)
            .map(|i| {
                WeightedDocument::single(
                    Document::new(format!("{vendor}-{i}")).with_id(format!("{vendor}-{i}")),
                    vendor,
                    weight,
                    top - i as f32 * 0.01,
                )
            })
            .collect()
    }

    fn count(result: &[WeightedDocument], vendor: &str) -> usize {
        result.iter().filter(|d| d.collection_vendor == vendor).count()
    }

    #[test]
    fn test_minority_collection_survives_dominant_one() {
        let mut input = docs("github", 1.0, 10, 0.99);
        input.extend(docs("linear", 0.5, 2, 0.5));

        let result = DiversityEnforcer::default().enforce(input, 10);
        assert_eq!(count(&result, "linear"), 2);
        assert!(count(&result, "github") <= 5);
        for pair in result.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
    }

    #[test]
    fn test_single_collection_takes_top_n() {
        let result = DiversityEnforcer::default().enforce(docs("x", 1.0, 8, 0.9), 5);
        assert_eq!(result.len(), 5);
        assert_eq!(result[0].document.page_content, "x-0");
    }

    #[test]
    fn test_round_robin_alternates() {
        let config = DiversityConfig {
            strategy: DiversityStrategy::RoundRobin,
            enforce_min_representation: false,
            max_dominance: 1.0,
            ..DiversityConfig::default()
        };
        let mut input = docs("a", 1.0, 3, 0.9);
        input.extend(docs("b", 1.0, 3, 0.1));
        let result = DiversityEnforcer::new(config).enforce(input, 4);
        assert_eq!(count(&result, "a"), 2);
        assert_eq!(count(&result, "b"), 2);
    }

    #[test]
    fn test_weighted_targets_follow_weights() {
        let config = DiversityConfig {
            enforce_min_representation: false,
            max_dominance: 1.0,
            ..DiversityConfig::default()
        };
        let mut input = docs("heavy", 0.75, 10, 0.5);
        input.extend(docs("light", 0.25, 10, 0.9));
        let result = DiversityEnforcer::new(config).enforce(input, 8);

        // targets ceil(0.75 * 8) = 6 and ceil(0.25 * 8) = 2
        assert_eq!(count(&result, "heavy"), 6);
        assert_eq!(count(&result, "light"), 2);
    }

    #[test]
    fn test_score_based_respects_dominance() {
        let config = DiversityConfig {
            strategy: DiversityStrategy::ScoreBased,
            enforce_min_representation: false,
            ..DiversityConfig::default()
        };
        let mut input = docs("a", 1.0, 10, 0.99);
        input.extend(docs("b", 1.0, 10, 0.2));
        let result = DiversityEnforcer::new(config).enforce(input, 6);
        assert_eq!(count(&result, "a"), 3);
        assert_eq!(count(&result, "b"), 3);
    }
}
