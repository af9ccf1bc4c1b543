//! Text similarity scoring.
//!
//! The similarity/ranking algorithm itself is explicitly out of scope
//! (see `SPEC_FULL.md` §4.3.1): any scorer satisfying "near-duplicate text
//! scores above the threshold" and "produces a total order for ranking"
//! may be substituted here without changing [`super::MemoryStore`]'s
//! contract. This module provides one valid implementation — a
//! Dice-coefficient token overlap — behind a small trait so the rest of
//! the store never depends on the concrete algorithm.

use std::collections::HashSet;

/// Scores the similarity of two pieces of text in `[0.0, 1.0]`.
pub trait SimilarityScorer: Send + Sync {
    /// Returns a similarity score; higher means more similar.
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Dice-coefficient token overlap over normalized, lowercased whitespace
/// tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenOverlapScorer;

impl TokenOverlapScorer {
    fn tokenize(text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

impl SimilarityScorer for TokenOverlapScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        let ta = Self::tokenize(a);
        let tb = Self::tokenize(b);
        if ta.is_empty() && tb.is_empty() {
            return 1.0;
        }
        if ta.is_empty() || tb.is_empty() {
            return 0.0;
        }
        let intersection = ta.intersection(&tb).count();
        let denom = ta.len() + tb.len();
        if denom == 0 {
            0.0
        } else {
            (2.0 * intersection as f64) / denom as f64
        }
    }
}
