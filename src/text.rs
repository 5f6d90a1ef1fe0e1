//! Shared Hebrew text utilities: cleanup and normalization.
//!
//! The reference resolver and the similarity index each need a
//! definition of "cleaned text"; this module is the single place that
//! definition lives so the two components never drift apart.

use regex::Regex;
use std::sync::LazyLock;

/// Matches HTML/XML tags, e.g. `<i>`, `</b>`, `<sup class="foo">`.
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("valid regex"));

/// Matches a parenthesized insert of 1-5 characters, e.g. `(א)`, `(1)`.
static SHORT_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]{1,5}\)").expect("valid regex"));

/// Matches any character that is not a Hebrew letter, Latin letter,
/// digit, or space, for similarity normalization.
static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Hebrew}a-zA-Z0-9 ]").expect("valid regex"));

/// Matches quote-like marks: ASCII quotes, Hebrew geresh/gershayim,
/// curly quotes.
static QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"׳״‘’“”]"#).expect("valid regex"));

/// Whitespace run, for collapsing.
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Cantillation mark block, U+0591..U+05C7.
fn is_cantillation(c: char) -> bool {
    ('\u{0591}'..='\u{05C7}').contains(&c)
}

/// Cleans one upstream leaf string: strips HTML/XML tags, cantillation
/// marks, and short (1-5 char) parenthesized inserts, then trims.
#[must_use]
pub fn clean(raw: &str) -> String {
    let no_tags = TAG_RE.replace_all(raw, "");
    let no_cantillation: String = no_tags.chars().filter(|c| !is_cantillation(*c)).collect();
    let no_short_parens = SHORT_PAREN_RE.replace_all(&no_cantillation, "");
    WHITESPACE_RE
        .replace_all(no_short_parens.trim(), " ")
        .into_owned()
}

/// Hebrew-normalizes text for similarity comparison: strips markup and
/// cantillation via [`clean`], replaces quote-like marks with spaces,
/// replaces any non-(Hebrew letter|Latin letter|digit|space) with
/// space, collapses whitespace runs.
#[must_use]
pub fn normalize_for_similarity(raw: &str) -> String {
    let cleaned = clean(raw);
    let no_quotes = QUOTE_RE.replace_all(&cleaned, " ");
    let no_symbols = NON_WORD_RE.replace_all(&no_quotes, " ");
    WHITESPACE_RE
        .replace_all(no_symbols.trim(), " ")
        .into_owned()
}

/// Fraction of codepoints in the Hebrew block (U+0590..U+05FF) over
/// total character count, for validation.
#[must_use]
pub fn hebrew_ratio(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let total = text.chars().count();
    let hebrew = text
        .chars()
        .filter(|c| ('\u{0590}'..='\u{05FF}').contains(c))
        .count();
    #[allow(clippy::cast_precision_loss)]
    {
        hebrew as f64 / total as f64
    }
}

/// Extracts the leading run of `count` whitespace-delimited words that
/// contain at least one Hebrew codepoint, joined back with single
/// spaces. Used as a boundary marker for the alignment engine's
/// paragraph-slicing heuristic (a short, locatable phrase rather than
/// the whole boundary passage). Returns `None` if `text` has fewer than
/// `count` such words.
#[must_use]
pub fn leading_hebrew_words(text: &str, count: usize) -> Option<String> {
    let words: Vec<&str> = text
        .split_whitespace()
        .filter(|w| w.chars().any(|c| ('\u{0590}'..='\u{05FF}').contains(&c)))
        .take(count)
        .collect();
    if words.len() < count {
        None
    } else {
        Some(words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_tags_cantillation_and_short_parens() {
        let raw = "<b>שָׁלוֹם</b> (א) עולם";
        let cleaned = clean(raw);
        assert!(!cleaned.contains('<'));
        assert!(!cleaned.contains('('));
        assert!(!cleaned.chars().any(|c| ('\u{0591}'..='\u{05C7}').contains(&c)));
    }

    #[test]
    fn clean_keeps_long_parenthesized_text() {
        let raw = "טקסט (זהו פירוש ארוך יותר) המשך";
        let cleaned = clean(raw);
        assert!(cleaned.contains('('));
    }

    #[test]
    fn normalize_collapses_quotes_and_symbols() {
        let normalized = normalize_for_similarity("שלום, עולם! \"מבחן\"");
        assert!(!normalized.contains(','));
        assert!(!normalized.contains('"'));
        assert!(!normalized.contains('!'));
    }

    #[test]
    fn hebrew_ratio_of_all_hebrew_is_one() {
        assert!((hebrew_ratio("שלום עולם") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hebrew_ratio_of_empty_is_zero() {
        assert_eq!(hebrew_ratio(""), 0.0);
    }

    #[test]
    fn hebrew_ratio_mixed() {
        let ratio = hebrew_ratio("שלום ab");
        assert!(ratio > 0.0 && ratio < 1.0);
    }

    #[test]
    fn leading_hebrew_words_takes_only_hebrew_tokens() {
        let phrase = leading_hebrew_words("123 אחת שתיים שלוש ארבע חמש", 4);
        assert_eq!(phrase.as_deref(), Some("אחת שתיים שלוש ארבע"));
    }

    #[test]
    fn leading_hebrew_words_none_when_too_few() {
        assert_eq!(leading_hebrew_words("אחת שתיים", 4), None);
    }
}
