//! The reference resolver.
//!
//! Maps a canonical `(corpus, section, chapter, paragraph?)` location
//! into provider-specific reference strings, and flattens the
//! provider's nested text arrays into ordered, individually-referable
//! [`Fragment`]s.

pub mod fixture;
pub mod http;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::location::normalize_for_match;
use crate::domain::{CorpusId, Fragment, FragmentRef, Section};
use crate::domain::numerals::resolve_numeral;
use crate::error::{ProviderError, Result};
use crate::text::clean;

pub use fixture::FixtureTextProvider;
pub use http::HttpTextProvider;

/// The upstream provider's raw response to a text fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTextResponse {
    /// Canonicalized reference the provider actually resolved, which
    /// may differ textually from the request.
    #[serde(rename = "ref")]
    pub provider_ref: String,
    /// Nested array of Hebrew leaf strings.
    pub he: Value,
}

/// The upstream provider's raw response to a links fetch.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawLinksResponse {
    /// A bare array of link objects.
    Array(Vec<Value>),
    /// An object wrapping the array under `links`.
    Wrapped {
        /// The link objects.
        links: Vec<Value>,
    },
}

impl RawLinksResponse {
    fn entries(&self) -> &[Value] {
        match self {
            Self::Array(entries) | Self::Wrapped { links: entries } => entries,
        }
    }
}

/// Candidate field names that may carry reference strings in a link
/// object.
const LINK_REF_FIELDS: [&str; 5] = ["refs", "expandedRefs", "anchorRef", "sourceRef", "ref"];

/// The upstream text/link provider, abstracted behind a trait so tests
/// can substitute a fixture and the orchestrator can depend on it
/// explicitly rather than through an ambient singleton.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// `GET <base>/v3/texts/<ref>?lang=he&context=0`.
    async fn fetch_text(&self, ref_string: &str) -> Result<RawTextResponse, ProviderError>;

    /// `GET <base>/links/<ref>`.
    async fn fetch_links(&self, ref_string: &str) -> Result<RawLinksResponse, ProviderError>;
}

/// Builds a provider reference string mechanically from the corpus's
/// prefix and qualifier rules.
///
/// `chapter`/`paragraph` may be plain integers or vernacular-numeral
/// strings; both are normalized via [`resolve_numeral`] before the ref
/// is assembled.
///
/// # Errors
///
/// Returns [`ProviderError::SchemaDrift`] if `chapter`/`paragraph`
/// cannot be resolved to an integer.
pub fn build_ref(corpus: CorpusId,
    section: Section,
    chapter: &str,
    paragraph: Option<&str>) -> Result<String, ProviderError> {
    let chapter_num = resolve_numeral(chapter).ok_or_else(|| ProviderError::SchemaDrift {
            reference: chapter.to_string(),
            reason: "chapter is not a valid integer or vernacular numeral".to_string(),
    })?;

    let meta = corpus.meta();
    let mut reference = meta.provider_prefix.to_string();
    if meta.section_qualified {
        reference.push_str(", ");
        reference.push_str(section.canonical_name());
    }
    reference.push(' ');
    reference.push_str(&chapter_num.to_string());

    if meta.addresses_paragraphs {
        if let Some(paragraph_token) = paragraph {
            let paragraph_num =
            resolve_numeral(paragraph_token).ok_or_else(|| ProviderError::SchemaDrift {
                    reference: paragraph_token.to_string(),
                    reason: "paragraph is not a valid integer or vernacular numeral".to_string(),
            })?;
            reference.push(':');
            reference.push_str(&paragraph_num.to_string());
        }
    }

    Ok(reference)
}

/// Pre-order-flattens a nested JSON text array into ordered fragments,
/// cleaning every leaf. Empty leaves (after cleaning) are
/// dropped.
fn flatten(reference: &FragmentRef, value: &Value, path: &mut Vec<usize>, out: &mut Vec<Fragment>) {
    match value {
        Value::String(s) => {
            let cleaned = clean(s);
            if !cleaned.is_empty() {
                out.push(Fragment::new(reference.clone(), path.clone(), cleaned));
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(i);
                flatten(reference, item, path, out);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Fetches and flattens one reference's fragments.
///
/// Returns the provider's canonicalized ref (which the caller should
/// store, since it may differ from the requested ref string) alongside
/// the ordered, cleaned fragments.
///
/// # Errors
///
/// Returns [`ProviderError::SchemaDrift`] if the response is missing
/// `he`/`ref`, and whatever transport error the provider surfaces.
pub async fn fetch_fragments(provider: &dyn TextProvider,
    ref_string: &str) -> Result<(FragmentRef, Vec<Fragment>), ProviderError> {
    let response = provider.fetch_text(ref_string).await?;
    if response.provider_ref.trim().is_empty() {
        return Err(ProviderError::SchemaDrift {
                reference: ref_string.to_string(),
                reason: "missing ref in response".to_string(),
        });
    }

    let canonical_ref = FragmentRef::from(response.provider_ref);
    let mut fragments = Vec::new();
    let mut path = Vec::new();
    flatten(&canonical_ref, &response.he, &mut path, &mut fragments);

    Ok((canonical_ref, fragments))
}

fn pull_ref_strings(entry: &Value, field: &str, out: &mut Vec<String>) {
    let Some(value) = entry.get(field) else {
        return;
    };
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                if let Value::String(s) = item {
                    out.push(s.clone());
                }
            }
        }
        _ => {}
    }
    // expandedRefs0 / expandedRefs1 are not plain "expandedRefs";
    // handled by the caller iterating indexed field names too.
}

/// Fetches the provider's link graph for a primary-work paragraph and
/// returns reference strings filtered to the two secondary corpora,
/// restricted to `section`.
///
/// # Errors
///
/// Propagates the provider's transport/not-found errors.
pub async fn fetch_linked_refs(provider: &dyn TextProvider,
    primary_ref: &str,
    predecessor_prefix: &str,
    compendium_prefix: &str) -> Result<(Vec<FragmentRef>, Vec<FragmentRef>), ProviderError> {
    let response = provider.fetch_links(primary_ref).await?;

    let mut raw_refs = Vec::new();
    for entry in response.entries() {
        for field in LINK_REF_FIELDS {
            pull_ref_strings(entry, field, &mut raw_refs);
        }
        pull_ref_strings(entry, "expandedRefs0", &mut raw_refs);
        pull_ref_strings(entry, "expandedRefs1", &mut raw_refs);
    }

    let predecessor_prefix = normalize_for_match(predecessor_prefix);
    let compendium_prefix = normalize_for_match(compendium_prefix);

    let mut predecessor_refs = Vec::new();
    let mut compendium_refs = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    for raw in raw_refs {
        if !seen.insert(raw.clone()) {
            continue;
        }
        let normalized = normalize_for_match(&raw);
        if normalized.starts_with(&predecessor_prefix) {
            predecessor_refs.push(FragmentRef::from(raw));
        } else if normalized.starts_with(&compendium_prefix) {
            compendium_refs.push(FragmentRef::from(raw));
        }
    }

    Ok((predecessor_refs, compendium_refs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_ref_qualifies_by_section_and_paragraph() {
        let reference = build_ref(CorpusId::Primary, Section::OrachChayim, "24", Some("1")).unwrap();
        assert_eq!(reference, "Shulchan Arukh, Orach Chayim 24:1");
    }

    #[test]
    fn build_ref_omits_paragraph_for_non_paragraph_corpus() {
        let reference = build_ref(CorpusId::PredecessorCode, Section::OrachChayim, "24", Some("1")).unwrap();
        assert_eq!(reference, "Tur, Orach Chayim 24");
    }

    #[test]
    fn build_ref_accepts_vernacular_numerals() {
        let reference = build_ref(CorpusId::Primary, Section::OrachChayim, "כד", None).unwrap();
        assert_eq!(reference, "Shulchan Arukh, Orach Chayim 24");
    }

    #[test]
    fn build_ref_rejects_unresolvable_numeral() {
        let result = build_ref(CorpusId::Primary, Section::OrachChayim, "not-a-number", None);
        assert!(result.is_err());
    }

    #[test]
    fn flatten_assigns_preorder_paths_and_cleans_text() {
        let reference = FragmentRef::from("Tur, Orach Chayim 24");
        let value: Value = serde_json::json!(["<b>טקסט א</b>", ["טקסט ב", "(א) טקסט ג"]]);
        let mut fragments = Vec::new();
        let mut path = Vec::new();
        flatten(&reference, &value, &mut path, &mut fragments);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].path, vec![0]);
        assert_eq!(fragments[1].path, vec![1, 0]);
        assert_eq!(fragments[2].path, vec![1, 1]);
        assert!(!fragments[0].text.contains('<'));
    }

    #[test]
    fn flatten_drops_empty_leaves_after_cleaning() {
        let reference = FragmentRef::from("Tur, Orach Chayim 24");
        let value: Value = serde_json::json!(["(א)", "real text"]);
        let mut fragments = Vec::new();
        let mut path = Vec::new();
        flatten(&reference, &value, &mut path, &mut fragments);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "real text");
    }
}
