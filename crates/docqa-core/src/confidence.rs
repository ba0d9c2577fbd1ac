//! Heuristic answer confidence.
//!
//! Not a probability: a bounded score in `[0.1, 1.0]` built from answer
//! length, how many chunks backed the prompt, domain vocabulary in the
//! answer, and whether the answer admits the documents lacked the
//! information. Phrase matching is case-insensitive.

pub const MIN_CONFIDENCE: f64 = 0.1;
pub const MAX_CONFIDENCE: f64 = 1.0;

const BASE: f64 = 0.5;

const COVERAGE_TERMS: &[&str] = &["coverage", "policy"];
const EXCLUSION_TERMS: &[&str] = &["exclusion", "waiting period"];
const DISCLAIMERS: &[&str] = &[
    "i don't have enough information",
    "i do not have enough information",
    "not available in the documents",
    "information is not available",
];

/// Score `answer` given the number of chunks that were in the prompt.
pub fn score(answer: &str, chunks_used: usize) -> f64 {
    let lower = answer.to_lowercase();
    let len = answer.chars().count();
    let mut score = BASE;

    if len > 100 {
        score += 0.1;
    }
    if len > 300 {
        score += 0.1;
    }

    if chunks_used > 0 {
        score += 0.2;
    }
    if chunks_used > 2 {
        score += 0.1;
    }

    if contains_any(&lower, COVERAGE_TERMS) {
        score += 0.05;
    }
    if contains_any(&lower, EXCLUSION_TERMS) {
        score += 0.05;
    }

    if contains_any(&lower, DISCLAIMERS) {
        score -= 0.2;
    }

    score.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
