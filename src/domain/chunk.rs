//! `Chunk` representation.
//!
//! A chunk is a word-bounded slice of a [`crate::domain::Fragment`] used
//! as the unit of LLM processing. Unlike the fragment it came from, a
//! chunk carries a deterministic id and a content hash so the
//! explanation memoizer can key on it.

use serde::{Deserialize, Serialize};

use crate::domain::fragment::FragmentRef;

/// A word-bounded slice of a fragment, carrying the source fragment's
/// provenance (`ref`/`path`) unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id: `<corpus>_<normalizedRef>_<pathOrRoot>_chunk_<ordinal>`.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Strong content hash over `text`.
    pub content_hash: String,
    /// The source fragment's reference, if any.
    pub reference: Option<FragmentRef>,
    /// The source fragment's descent path, if any.
    pub path: Option<Vec<usize>>,
}

impl Chunk {
    /// Builds a new chunk.
    #[must_use]
    pub const fn new(id: String,
        text: String,
        content_hash: String,
        reference: Option<FragmentRef>,
        path: Option<Vec<usize>>) -> Self {
        Self {
            id,
            text,
            content_hash,
            reference,
            path,
        }
    }

    /// Whitespace-tokenized word count, filtered to tokens containing at
    /// least one alphanumeric or Hebrew codepoint ("word
    /// counting").
    #[must_use]
    pub fn word_count(&self) -> usize {
        crate::chunking::count_words(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_ignores_pure_punctuation_tokens() {
        let chunk = Chunk::new("c1".into(),
            "hello, -- world !!".into(),
            "hash".into(),
            None,
            None);
        assert_eq!(chunk.word_count(), 2);
    }
}
