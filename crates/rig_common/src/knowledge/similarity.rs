//! Text similarity for approximate knowledge lookups.
//!
//! The store ranks error messages and tool descriptions against free text
//! through a pluggable `TextSimilarity` provider. The default provider is
//! token overlap (Jaccard index over lowercased whitespace tokens): no
//! model download, deterministic for identical inputs, good enough to
//! match "permission denied: cannot write" against a stored
//! "permission denied" record.
//!
//! Similarity results are advisory. Callers must treat them as candidates
//! to try, never as authoritative answers.

use crate::types::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Scores similarity between two texts in [0.0, 1.0].
///
/// Implementations must be deterministic for identical inputs.
pub trait TextSimilarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Default provider: Jaccard index over lowercased whitespace tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenOverlap;

impl TextSimilarity for TokenOverlap {
    fn score(&self, a: &str, b: &str) -> f64 {
        let tokens_a: HashSet<String> = tokenize(a);
        let tokens_b: HashSet<String> = tokenize(b);

        if tokens_a.is_empty() || tokens_b.is_empty() {
            return 0.0;
        }

        let intersection = tokens_a.intersection(&tokens_b).count();
        let union = tokens_a.union(&tokens_b).count();
        intersection as f64 / union as f64
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// One indexed text, pointing back at a stored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub kind: EntityKind,
    /// Store key of the entity (tool name or error id)
    pub key: String,
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

/// A ranked similarity result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub kind: EntityKind,
    pub key: String,
    pub text: String,
    pub score: f64,
}

/// In-memory ranked index over entity texts.
///
/// Rebuilt from the backend at open, updated incrementally on upserts.
/// Read-mostly during a run; queries never mutate it.
pub struct SimilarityIndex {
    entries: Vec<IndexEntry>,
}

impl SimilarityIndex {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    /// Insert or replace the entry for (kind, key).
    pub fn upsert(&mut self, entry: IndexEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.kind == entry.kind && e.key == entry.key)
        {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank entries of `kind` against `text`.
    ///
    /// Returns at most `top_k` hits with `score >= min_score`, descending
    /// by score, ties broken by most-recent-first. Empty when nothing
    /// qualifies; never an error.
    pub fn search(
        &self,
        provider: &dyn TextSimilarity,
        text: &str,
        kind: EntityKind,
        top_k: usize,
        min_score: f64,
    ) -> Vec<SimilarityHit> {
        let mut scored: Vec<(&IndexEntry, f64)> = self
            .entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| (e, provider.score(text, &e.text)))
            .filter(|(_, score)| *score >= min_score)
            .collect();

        scored.sort_by(|(ea, sa), (eb, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| eb.recorded_at.cmp(&ea.recorded_at))
        });

        scored
            .into_iter()
            .take(top_k)
            .map(|(e, score)| SimilarityHit {
                kind: e.kind,
                key: e.key.clone(),
                text: e.text.clone(),
                score,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(key: &str, text: &str, age_secs: i64) -> IndexEntry {
        IndexEntry {
            kind: EntityKind::ErrorRecord,
            key: key.to_string(),
            text: text.to_string(),
            recorded_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_token_overlap_identical() {
        let provider = TokenOverlap;
        assert_eq!(provider.score("permission denied", "permission denied"), 1.0);
    }

    #[test]
    fn test_token_overlap_partial() {
        let provider = TokenOverlap;
        let score = provider.score("permission denied", "permission denied: cannot write");
        assert!(score > 0.4 && score < 1.0, "score was {}", score);
    }

    #[test]
    fn test_token_overlap_disjoint_and_empty() {
        let provider = TokenOverlap;
        assert_eq!(provider.score("alpha beta", "gamma delta"), 0.0);
        assert_eq!(provider.score("", "anything"), 0.0);
    }

    #[test]
    fn test_token_overlap_deterministic() {
        let provider = TokenOverlap;
        let a = provider.score("E: Unable to locate package foo", "unable to locate package");
        let b = provider.score("E: Unable to locate package foo", "unable to locate package");
        assert_eq!(a, b);
    }

    #[test]
    fn test_search_respects_top_k_and_min_score() {
        let mut index = SimilarityIndex::new(Vec::new());
        index.upsert(entry("e1", "permission denied", 30));
        index.upsert(entry("e2", "permission denied while writing", 20));
        index.upsert(entry("e3", "network unreachable", 10));

        let hits = index.search(&TokenOverlap, "permission denied: cannot write", EntityKind::ErrorRecord, 2, 0.3);
        assert!(hits.len() <= 2);
        assert!(hits.iter().all(|h| h.score >= 0.3));
        assert!(hits.iter().all(|h| h.key != "e3"));
        // Descending by score
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_search_tie_break_most_recent_first() {
        let mut index = SimilarityIndex::new(Vec::new());
        index.upsert(entry("old", "disk full", 100));
        index.upsert(entry("new", "disk full", 1));

        let hits = index.search(&TokenOverlap, "disk full", EntityKind::ErrorRecord, 5, 0.5);
        assert_eq!(hits[0].key, "new");
        assert_eq!(hits[1].key, "old");
    }

    #[test]
    fn test_search_empty_when_nothing_qualifies() {
        let index = SimilarityIndex::new(Vec::new());
        let hits = index.search(&TokenOverlap, "anything", EntityKind::ErrorRecord, 5, 0.5);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_upsert_replaces_existing_key() {
        let mut index = SimilarityIndex::new(Vec::new());
        index.upsert(entry("e1", "first text", 10));
        index.upsert(entry("e1", "second text", 5));
        assert_eq!(index.len(), 1);
        let hits = index.search(&TokenOverlap, "second text", EntityKind::ErrorRecord, 5, 0.9);
        assert_eq!(hits.len(), 1);
    }
}
