//! Lexical relevance ranking.
//!
//! Scores stored chunks against a query by term overlap and frequency.
//! The integer part of a score is the number of distinct query terms the
//! chunk contains; repetition adds `r / (1 + r)` with `r = Σ ln(tf)`,
//! which stays below 1. A chunk matching more distinct terms therefore
//! always outranks one that only repeats fewer terms. Chunks that match
//! no term are dropped.
//!
//! Query terms are lowercase alphanumeric tokens with common English stop
//! words removed, which keeps filler words like "what" or "the" from
//! matching every chunk.
//!
//! # Ordering
//!
//! Score (desc), chunk index (asc), document creation time (desc), then
//! document id and chunk id (asc) so the order is total and repeatable.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::{CandidateChunk, RankedChunk};

pub const DEFAULT_TOP_K: usize = 5;

const STOP_WORDS: &[&str] = &[
    "a", "about", "am", "an", "and", "any", "are", "as", "at", "be", "been", "but", "by", "can",
    "do", "does", "for", "from", "had", "has", "have", "how", "i", "if", "in", "into", "is", "it",
    "its", "me", "my", "no", "not", "of", "on", "or", "our", "so", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "to", "was", "we", "were", "what", "when",
    "where", "which", "who", "why", "will", "with", "would", "you", "your",
];

/// Ranks candidate chunks and keeps the best `limit`.
#[derive(Debug, Clone, Copy)]
pub struct RelevanceRanker {
    limit: usize,
}

impl Default for RelevanceRanker {
    fn default() -> Self {
        Self {
            limit: DEFAULT_TOP_K,
        }
    }
}

impl RelevanceRanker {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Score, order, and truncate `candidates` for `query`.
    ///
    /// Returns an empty vector when the query has no usable terms or no
    /// candidate matches; callers treat that as "nothing found", not as an
    /// error.
    pub fn rank(&self, query: &str, candidates: Vec<CandidateChunk>) -> Vec<RankedChunk> {
        let terms = query_terms(query);
        if terms.is_empty() || self.limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(CandidateChunk, f64)> = candidates
            .into_iter()
            .filter_map(|c| {
                let score = score_text(&terms, &c.content);
                (score > 0.0).then_some((c, score))
            })
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk_index.cmp(&b.chunk_index))
                .then(b.document_created_at.cmp(&a.document_created_at))
                .then(a.document_id.cmp(&b.document_id))
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(self.limit);

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (chunk, score))| RankedChunk {
                chunk,
                score,
                rank: i + 1,
            })
            .collect()
    }
}

/// Distinct, lowercase, stop-word-free terms of `query`, in first-seen order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Relevance of `text` for already-normalized `terms`.
///
/// Distinct matches plus a repetition bonus in `[0, 1)`.
pub fn score_text(terms: &[String], text: &str) -> f64 {
    let mut tf: HashMap<String, u32> = HashMap::new();
    for token in tokenize(text) {
        *tf.entry(token).or_insert(0) += 1;
    }
    let counts: Vec<u32> = terms.iter().filter_map(|t| tf.get(t).copied()).collect();
    if counts.is_empty() {
        return 0.0;
    }
    let repetition: f64 = counts.iter().map(|&n| (n as f64).ln()).sum();
    counts.len() as f64 + repetition / (1.0 + repetition)
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn candidate(doc: &str, index: i64, age_days: i64, content: &str) -> CandidateChunk {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        CandidateChunk {
            chunk_id: format!("{}-{}", doc, index),
            document_id: doc.to_string(),
            document_name: format!("{}.txt", doc),
            document_created_at: base - Duration::days(age_days),
            chunk_index: index,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_query_terms_drop_stop_words_and_duplicates() {
        assert_eq!(
            query_terms("What is the waiting period for the Waiting list?"),
            vec!["waiting", "period", "list"]
        );
        assert!(query_terms("what is the").is_empty());
    }

    #[test]
    fn test_more_distinct_terms_beat_repetition() {
        let terms = query_terms("dental coverage");
        let both = score_text(&terms, "Dental coverage applies.");
        let repeated = score_text(&terms, "dental dental dental dental dental");
        assert!(both > repeated);

        let flooded = score_text(&terms, &"dental ".repeat(10_000));
        assert!(flooded < 2.0);
        assert!(both > flooded);
    }

    #[test]
    fn test_repetition_breaks_ties_between_equal_matches() {
        let terms = query_terms("waiting period exclusions");
        let once = score_text(&terms, "The waiting period is listed.");
        let twice = score_text(&terms, "Waiting period: the waiting period is listed.");
        assert!((once - 2.0).abs() < 1e-9);
        assert!(twice > once);
        assert!(twice < 3.0);

        let all_three = score_text(&terms, "Exclusions and the waiting period.");
        assert!(all_three > twice);
    }

    #[test]
    fn test_score_is_zero_without_matches() {
        let terms = query_terms("maternity");
        assert_eq!(score_text(&terms, "Vehicle collision cover."), 0.0);
    }

    #[test]
    fn test_no_match_returns_empty() {
        let ranker = RelevanceRanker::default();
        let results = ranker.rank(
            "maternity benefits",
            vec![candidate("d1", 0, 0, "Vehicle collision cover.")],
        );
        assert!(results.is_empty());
    }

    #[test]
    fn test_orders_by_score_then_index_then_recency() {
        let ranker = RelevanceRanker::new(10);
        let results = ranker.rank(
            "flood damage",
            vec![
                candidate("old", 1, 10, "flood only"),
                candidate("new", 1, 1, "flood only"),
                candidate("old", 0, 10, "flood only"),
                candidate("best", 4, 30, "flood damage is covered"),
                candidate("none", 0, 0, "fire"),
            ],
        );

        let order: Vec<(&str, i64)> = results
            .iter()
            .map(|r| (r.chunk.document_id.as_str(), r.chunk.chunk_index))
            .collect();
        assert_eq!(order, vec![("best", 4), ("old", 0), ("new", 1), ("old", 1)]);
        let ranks: Vec<usize> = results.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_never_returns_more_than_limit() {
        let ranker = RelevanceRanker::new(2);
        let candidates = (0..10)
            .map(|i| candidate("d1", i, 0, "policy coverage details"))
            .collect();
        let results = ranker.rank("policy", candidates);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.chunk_index, 0);
        assert_eq!(results[1].chunk.chunk_index, 1);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let ranker = RelevanceRanker::default();
        let results = ranker.rank("EXCLUSIONS", vec![candidate("d1", 0, 0, "List of exclusions")]);
        assert_eq!(results.len(), 1);
        assert!(results[0].score > 0.0);
    }
}
