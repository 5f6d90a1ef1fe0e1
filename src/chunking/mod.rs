//! The fragment chunker.
//!
//! Splits a [`Fragment`] into word-bounded [`Chunk`]s, preserving the
//! source fragment's `ref`/`path` provenance on every emitted chunk.
//! Two profiles are used across the pipeline: the explanation profile
//! (fixed bounds) and the adaptive alignment profile (bounds scale with
//! how many upstream fragments the chapter has).

use crate::domain::{Chunk, CorpusId, Fragment};
use crate::util::content_hash;

/// Delimiters a clause boundary may end on.
const CLAUSE_DELIMITERS: [char; 3] = ['.', ':', '\n'];

/// Hard cap on chunks produced for one chapter by the alignment
/// profile; overflow is dropped from the tail and logged.
pub const ALIGNMENT_CHUNK_CAP: usize = 60;

/// A chunk's allowed word-count window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkProfile {
    /// Minimum word count a flushed group must reach before a chunk is
    /// closed off (except possibly the fragment's last chunk).
    pub min_words: usize,
    /// Maximum word count a chunk should not exceed (a single
    /// over-long clause may still exceed this, see `oversized_at`).
    pub max_words: usize,
}

impl ChunkProfile {
    /// The explanation profile: `maxWords=180`, `minWords=120`.
    pub const EXPLANATION: Self = Self {
        min_words: 120,
        max_words: 180,
    };

    /// The adaptive alignment profile, scaled by how many upstream
    /// fragments the chapter under alignment has.
    #[must_use]
    pub const fn alignment_for_fragment_count(fragment_count: usize) -> Self {
        if fragment_count <= 5 {
            Self {
                max_words: 50,
                min_words: 25,
            }
        } else if fragment_count <= 20 {
            Self {
                max_words: 100,
                min_words: 50,
            }
        } else {
            Self {
                max_words: 150,
                min_words: 80,
            }
        }
    }

    /// A single clause this long is emitted as its own chunk rather
    /// than folded into the accumulating group.
    const fn oversized_threshold(self) -> usize {
        self.max_words + 50
    }
}

/// Whitespace-tokenized word count, counting only tokens containing at
/// least one alphanumeric or Hebrew codepoint.
#[must_use]
pub fn count_words(text: &str) -> usize {
    text.split_whitespace()
    .filter(|token| {
            token
            .chars()
            .any(|c| c.is_alphanumeric() || ('\u{0590}'..='\u{05FF}').contains(&c))
    })
    .count()
}

/// Splits text into clauses on [`CLAUSE_DELIMITERS`], keeping the
/// delimiter attached to the preceding clause. A text with no
/// delimiters yields a single clause equal to the whole input.
fn split_clauses(text: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if CLAUSE_DELIMITERS.contains(&c) {
            clauses.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        clauses.push(current);
    }
    clauses
}

/// Word-count fallback split, used when the text has no clause
/// delimiters at all.
fn split_by_words(text: &str, max_words: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return vec![text.to_string()];
    }
    words
    .chunks(max_words.max(1))
    .map(|group| group.join(" "))
    .collect()
}

/// Splits one fragment's text into chunk-text groups honoring the
/// profile's accumulate/flush rule.
fn group_by_profile(text: &str, profile: ChunkProfile) -> Vec<String> {
    if count_words(text) <= profile.max_words {
        return vec![text.trim().to_string()];
    }

    let clauses = split_clauses(text);
    if clauses.len() <= 1 {
        return split_by_words(text, profile.max_words);
    }

    let mut groups = Vec::new();
    let mut current = String::new();
    let mut current_words = 0usize;

    for clause in clauses {
        let clause_words = count_words(&clause);

        if clause_words > profile.oversized_threshold() {
            if !current.trim().is_empty() {
                groups.push(current.trim().to_string());
            }
            groups.push(clause.trim().to_string());
            current.clear();
            current_words = 0;
            continue;
        }

        if current_words > 0
        && current_words + clause_words > profile.max_words
        && current_words >= profile.min_words
        {
            groups.push(current.trim().to_string());
            current.clear();
            current_words = 0;
        }

        current.push_str(&clause);
        current_words += clause_words;
    }

    if !current.trim().is_empty() {
        groups.push(current.trim().to_string());
    }

    groups
}

/// Lowercases a reference string and collapses non-alphanumerics to a
/// single underscore, truncated to the last 64 characters.
fn normalize_ref_for_id(reference: &str) -> String {
    let mut out = String::with_capacity(reference.len());
    let mut last_was_underscore = false;
    for c in reference.chars() {
        if c.is_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_underscore = false;
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.len() > 64 {
        trimmed[trimmed.len() - 64..].to_string()
    } else {
        trimmed.to_string()
    }
}

fn path_or_root(path: &[usize]) -> String {
    if path.is_empty() {
        "root".to_string()
    } else {
        path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("-")
    }
}

/// Builds the deterministic chunk id:
/// `<corpus>_<normalizedRef>_<pathOrRoot>_chunk_<1-based-ordinal>`.
#[must_use]
pub fn chunk_id(corpus: CorpusId, reference: Option<&str>, path: &[usize], ordinal: usize) -> String {
    let normalized_ref = reference.map_or_else(|| "noref".to_string(), normalize_ref_for_id);
    format!("{}_{}_{}_chunk_{}",
        corpus.slug(),
        normalized_ref,
        path_or_root(path),
        ordinal)
}

/// Chunks one fragment under the given profile. Ordinals restart at 1
/// for each fragment, since the fragment's `ref`/`path` already scope
/// the id uniquely.
#[must_use]
pub fn chunk_fragment(fragment: &Fragment, corpus: CorpusId, profile: ChunkProfile) -> Vec<Chunk> {
    group_by_profile(&fragment.text, profile)
    .into_iter()
    .filter(|text| !text.is_empty())
    .enumerate()
    .map(|(i, text)| {
            let ordinal = i + 1;
            let id = chunk_id(corpus,
                Some(fragment.reference.as_str()),
                &fragment.path,
                ordinal);
            Chunk::new(id,
                text.clone(),
                content_hash(&text),
                Some(fragment.reference.clone()),
                Some(fragment.path.clone()))
    })
    .collect()
}

/// Chunks every fragment in `fragments` under `profile`, concatenating
/// the results in fragment order. If `cap` is `Some`, chunks beyond the
/// cap are dropped from the tail; the second return value is `true` if
/// any were dropped.
#[must_use]
pub fn chunk_fragments(fragments: &[Fragment],
    corpus: CorpusId,
    profile: ChunkProfile,
    cap: Option<usize>) -> (Vec<Chunk>, bool) {
    let mut all = Vec::new();
    for fragment in fragments {
        all.extend(chunk_fragment(fragment, corpus, profile));
    }

    match cap {
        Some(limit) if all.len() > limit => {
            all.truncate(limit);
            (all, true)
        }
        _ => (all, false),
    }
}
