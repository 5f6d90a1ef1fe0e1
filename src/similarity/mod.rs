//! The similarity index.
//!
//! Builds token/bigram sets from Hebrew-normalized text and scores a
//! query against a list of candidates using a weighted overlap metric.
//! Used by the alignment engine to fall back to lexical matching when
//! the upstream provider has no link graph for a paragraph.

use std::collections::BTreeSet;

use crate::domain::FragmentRef;
use crate::text::normalize_for_similarity;

/// Token weight in the overlap score.
const TOKEN_WEIGHT: f64 = 0.7;
/// Bigram weight in the overlap score.
const BIGRAM_WEIGHT: f64 = 0.3;
/// Below this top score, selection returns nothing.
const MIN_BEST_SCORE: f64 = 0.05;
/// Floor for the keep-threshold, before scaling by the best score.
const MIN_THRESHOLD: f64 = 0.08;
/// Fraction of the best score used as the keep-threshold.
const THRESHOLD_OF_BEST: f64 = 0.6;
/// Maximum candidates kept after thresholding.
const MAX_KEPT: usize = 12;
/// Minimum token length retained by the tokenizer.
const MIN_TOKEN_LEN: usize = 2;

/// Tokens and bigrams derived from one normalized text, used both for
/// the query and for each candidate.
#[derive(Debug, Clone)]
pub struct TextProfile {
    /// Unique token set.
    pub tokens: BTreeSet<String>,
    /// Unique adjacent-token-pair set, joined by a single space.
    pub bigrams: BTreeSet<String>,
}

impl TextProfile {
    /// Builds a profile from raw (un-normalized) text.
    #[must_use]
    pub fn from_text(raw: &str) -> Self {
        let normalized = normalize_for_similarity(raw);
        let words: Vec<&str> = normalized
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_TOKEN_LEN)
        .collect();

        let tokens = words.iter().map(ToString::to_string).collect();
        let bigrams = words
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect();

        Self { tokens, bigrams }
    }

    /// Whether this profile's tokens and bigrams are a superset of
    /// `other`'s (used by the monotonicity test).
    #[must_use]
    pub fn is_superset_of(&self, other: &Self) -> bool {
        self.tokens.is_superset(&other.tokens) && self.bigrams.is_superset(&other.bigrams)
    }
}

fn set_overlap_ratio(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        a.intersection(b).count() as f64 / a.len() as f64
    }
}

/// Scores a query profile against a candidate profile :
/// `0.7 * |Q.tokens ∩ C.tokens| / |Q.tokens| + 0.3 * |Q.bigrams ∩
/// C.bigrams| / |Q.bigrams|`.
#[must_use]
pub fn score(query: &TextProfile, candidate: &TextProfile) -> f64 {
    TOKEN_WEIGHT * set_overlap_ratio(&query.tokens, &candidate.tokens)
    + BIGRAM_WEIGHT * set_overlap_ratio(&query.bigrams, &candidate.bigrams)
}

/// One candidate passage available for similarity matching, in
/// upstream reading order.
pub struct Candidate {
    /// The candidate's reference string.
    pub reference: FragmentRef,
    /// The candidate's text profile.
    pub profile: TextProfile,
}

/// An immutable, request-scoped index over one secondary corpus's
/// candidates, built once and safe to share across read-only queries.
pub struct SimilarityIndex {
    candidates: Vec<Candidate>,
}

impl SimilarityIndex {
    /// Builds an index from ordered candidate passages.
    #[must_use]
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }

    /// Selects the best matching refs for one query, per the
    /// three-step selection procedure in.
    #[must_use]
    pub fn select(&self, query_text: &str) -> Vec<FragmentRef> {
        self.select_scored(query_text).0
    }

    /// Same selection as [`Self::select()`], additionally returning the
    /// top score (`0.0` if no candidate was selected) so callers that
    /// store the alignment's confidence alongside its refs don't have
    /// to re-run the scoring pass (`ParagraphAlignment.score`).
    #[must_use]
    pub fn select_scored(&self, query_text: &str) -> (Vec<FragmentRef>, f64) {
        let query = TextProfile::from_text(query_text);

        let mut scored: Vec<(usize, f64)> = self
        .candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, score(&query, &c.profile)))
        .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

        let Some(&(_, best)) = scored.first() else {
            return (Vec::new(), 0.0);
        };
        if best < MIN_BEST_SCORE {
            return (Vec::new(), 0.0);
        }

        let threshold = MIN_THRESHOLD.max(THRESHOLD_OF_BEST * best);
        let mut kept: Vec<(usize, f64)> = scored.into_iter().filter(|&(_, s)| s >= threshold).collect();
        kept.truncate(MAX_KEPT);
        kept.sort_by_key(|&(i, _)| i);

        let mut seen = BTreeSet::new();
        let mut refs = Vec::new();
        for (i, _) in kept {
            let reference = &self.candidates[i].reference;
            if seen.insert(reference.as_str().to_string()) {
                refs.push(reference.clone());
            }
        }
        (refs, best)
    }
}
