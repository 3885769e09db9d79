//! Fuzzy matching of a query against the translated units of a document.

use crate::domain::model::{Document, MatchRecord};
use crate::domain::traits::Scorer;
use std::sync::Arc;

/// Tuning knobs for [`Matcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherOptions {
    /// Upper bound on returned candidates
    pub max_candidates: usize,
    /// Minimum similarity percentage for a candidate to be kept
    pub min_similarity: u8,
    /// Longest source text (in chars) that takes part in matching
    pub max_length: usize,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            max_candidates: 10,
            min_similarity: 75,
            max_length: 70,
        }
    }
}

/// Normalized Levenshtein similarity, rounded to a whole percentage.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinScorer;

impl Scorer for LevenshteinScorer {
    fn similarity(&self, a: &str, b: &str) -> u8 {
        let score = strsim::normalized_levenshtein(a, b);
        (score * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    source: String,
    target: String,
    context: Option<String>,
}

/// Immutable matcher built from one snapshot of a document.
pub struct Matcher {
    candidates: Vec<Candidate>,
    options: MatcherOptions,
    scorer: Arc<dyn Scorer>,
}

impl Matcher {
    /// Index the translated units of `document` whose source fits `max_length`.
    pub fn new(document: &Document, options: MatcherOptions, scorer: Arc<dyn Scorer>) -> Self {
        let candidates = document
            .units
            .iter()
            .filter(|unit| unit.is_translated())
            .filter(|unit| unit.source.chars().count() <= options.max_length)
            .map(|unit| Candidate {
                source: unit.source.clone(),
                target: unit.target.clone(),
                context: unit.context.clone(),
            })
            .collect();

        Self {
            candidates,
            options,
            scorer,
        }
    }

    /// Number of units eligible for matching.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Best candidates for `query`, highest quality first.
    ///
    /// Equal qualities keep document order.
    pub fn matches(&self, query: &str) -> Vec<MatchRecord> {
        if query.is_empty() || query.chars().count() > self.options.max_length {
            return Vec::new();
        }

        let mut scored: Vec<(u8, &Candidate)> = self
            .candidates
            .iter()
            .filter_map(|candidate| {
                let quality = self.scorer.similarity(query, &candidate.source);
                (quality >= self.options.min_similarity).then_some((quality, candidate))
            })
            .collect();

        // sort_by is stable, so ties stay in document order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(self.options.max_candidates);

        scored
            .into_iter()
            .map(|(quality, candidate)| {
                MatchRecord::new(
                    candidate.source.clone(),
                    candidate.target.clone(),
                    Some(quality),
                    candidate.context.clone(),
                )
            })
            .collect()
    }
}
