//! `FragmentRef` and `Fragment`.

use serde::{Deserialize, Serialize};

/// An opaque reference string assigned by the upstream provider that
/// uniquely names one leaf in the nested text hierarchy.
///
/// Treated as a black box: equality and prefix matching only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FragmentRef(pub String);

impl FragmentRef {
    /// Borrows the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case/whitespace-insensitive prefix test used by the reference
    /// resolver's link-filtering step.
    #[must_use]
    pub fn normalized_starts_with(&self, prefix: &str) -> bool {
        crate::domain::location::normalize_for_match(&self.0)
        .starts_with(&crate::domain::location::normalize_for_match(prefix))
    }
}

impl std::fmt::Display for FragmentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FragmentRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for FragmentRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One leaf of the upstream text's nested array for a given ref.
///
/// Invariant: `text` is stripped of markup, cantillation marks, and
/// 1-5 character parenthesized inserts, and is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// The provider reference string this fragment belongs to.
    pub reference: FragmentRef,
    /// Descent path into the nested array, 0-based.
    ///
    /// `path[0]` is the top-level index; callers use `path[0] + 1` to
    /// recover a 1-based paragraph number when the upstream top-level
    /// array indexes paragraphs directly.
    pub path: Vec<usize>,
    /// Cleaned fragment text.
    pub text: String,
}

impl Fragment {
    /// Builds a new fragment, trusting the caller to have already
    /// cleaned `text` (see [`crate::text::clean()`]).
    #[must_use]
    pub const fn new(reference: FragmentRef, path: Vec<usize>, text: String) -> Self {
        Self {
            reference,
            path,
            text,
        }
    }

    /// `path[0] + 1`, the paragraph number implied by a 0-based
    /// top-level array index, if a path is present.
    #[must_use]
    pub fn path_paragraph(&self) -> Option<u32> {
        self.path.first().map(|p| u32::try_from(*p).unwrap_or(u32::MAX) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_paragraph_uses_first_index_plus_one() {
        let fragment = Fragment::new(FragmentRef::from("Tur, Orach Chayim 24:1"), vec![0, 2], "text".into());
        assert_eq!(fragment.path_paragraph(), Some(1));
    }

    #[test]
    fn path_paragraph_is_none_without_path() {
        let fragment = Fragment::new(FragmentRef::from("Tur, Orach Chayim 24"), vec![], "text".into());
        assert_eq!(fragment.path_paragraph(), None);
    }

    #[test]
    fn normalized_prefix_matches_orthographic_variants() {
        let reference = FragmentRef::from("Tur, Orach Chayim 24:1");
        assert!(reference.normalized_starts_with("tur, orach chayim"));
        assert!(reference.normalized_starts_with("Tur, Orach Chaim"));
    }
}
