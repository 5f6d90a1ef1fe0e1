//! `Location` and `Section`.

use serde::{Deserialize, Serialize};

/// One of the four fixed top-level divisions of the legal corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Laws of daily life and prayer.
    OrachChayim,
    /// Laws of ritual and dietary practice.
    YorehDeah,
    /// Laws of marriage and personal status.
    EvenHaezer,
    /// Laws of civil and commercial conduct.
    ChoshenMishpat,
}

impl Section {
    /// All four sections.
    pub const ALL: [Self; 4] = [
        Self::OrachChayim,
        Self::YorehDeah,
        Self::EvenHaezer,
        Self::ChoshenMishpat,
    ];

    /// The canonical English transliteration used when talking to the
    /// upstream provider and building display strings.
    #[must_use]
    pub const fn canonical_name(self) -> &'static str {
        match self {
            Self::OrachChayim => "Orach Chayim",
            Self::YorehDeah => "Yoreh Deah",
            Self::EvenHaezer => "Even HaEzer",
            Self::ChoshenMishpat => "Choshen Mishpat",
        }
    }

    /// Lowercase, underscore-joined slug used in store keys and
    /// fingerprints.
    #[must_use]
    pub fn slug(self) -> String {
        normalize_slug(self.canonical_name())
    }

    /// Parses a section name, tolerant of the orthographic variants the
    /// upstream provider uses interchangeably (normalization
    /// rule: "the corpus uses both 'Chaim' and 'Chayim'").
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = normalize_for_match(input);
        Self::ALL
        .into_iter()
        .find(|s| normalize_for_match(s.canonical_name()) == normalized)
    }
}

/// Lowercases, collapses whitespace, and unifies the `Chaim`/`Chayim`
/// orthographic variants so prefix/name comparisons are stable
/// regardless of which spelling the caller or the upstream provider
/// used.
#[must_use]
pub fn normalize_for_match(input: &str) -> String {
    let lowered = input.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.replace("chayim", "chaim")
}

fn normalize_slug(input: &str) -> String {
    input
    .chars()
    .map(|c| if c.is_alphanumeric() { c } else { '_' })
    .collect::<String>()
    .to_lowercase()
}

/// A triple (section, chapter, paragraph?) naming one division of the
/// primary work's structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Top-level section.
    pub section: Section,
    /// Chapter (siman) number, 1-based.
    pub chapter: u32,
    /// Paragraph (seif) number, 1-based, if this location is
    /// paragraph-scoped.
    pub paragraph: Option<u32>,
}

impl Location {
    /// Builds a new location.
    #[must_use]
    pub const fn new(section: Section, chapter: u32, paragraph: Option<u32>) -> Self {
        Self {
            section,
            chapter,
            paragraph,
        }
    }
}
