//! Corpus identity and metadata.

use serde::{Deserialize, Serialize};

use crate::domain::location::Section;

/// The four corpora the system knows how to resolve, align, and
/// explain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorpusId {
    /// The summary-of-law work whose paragraph structure drives
    /// alignment ("primary").
    Primary,
    /// A commentary of the primary that cites prior authorities; its
    /// link graph is the authoritative alignment source when
    /// available ("source-compendium").
    SourceCompendium,
    /// A 14th-century legal code serving as structural precursor
    /// ("predecessor-code").
    PredecessorCode,
    /// A 19th-century commentary whose paragraphs align 1-to-1 with
    /// the primary; used only as `companionText` ("later-commentary").
    LaterCommentary,
}

/// Static metadata describing one corpus's reference conventions.
#[derive(Debug, Clone, Copy)]
pub struct CorpusMeta {
    /// Human-facing display label.
    pub label: &'static str,
    /// Provider-prefix string used when building reference strings.
    pub provider_prefix: &'static str,
    /// Whether references must be qualified by section name.
    pub section_qualified: bool,
    /// Whether the corpus addresses individual paragraphs (not just
    /// chapters).
    pub addresses_paragraphs: bool,
    /// If `Some`, this corpus only covers that one section of the
    /// primary work.
    pub single_section_only: Option<Section>,
}

impl CorpusId {
    /// All known corpora, primary first.
    pub const ALL: [Self; 4] = [
        Self::Primary,
        Self::SourceCompendium,
        Self::PredecessorCode,
        Self::LaterCommentary,
    ];

    /// The two secondary corpora the alignment engine produces
    /// `ParagraphAlignment` entries for.
    pub const SECONDARY: [Self; 2] = [Self::PredecessorCode, Self::SourceCompendium];

    /// Static metadata for this corpus.
    #[must_use]
    pub const fn meta(self) -> CorpusMeta {
        match self {
            Self::Primary => CorpusMeta {
                label: "Shulchan Arukh",
                provider_prefix: "Shulchan Arukh",
                section_qualified: true,
                addresses_paragraphs: true,
                single_section_only: None,
            },
            Self::SourceCompendium => CorpusMeta {
                label: "Beit Yosef",
                provider_prefix: "Beit Yosef",
                section_qualified: true,
                addresses_paragraphs: false,
                single_section_only: None,
            },
            Self::PredecessorCode => CorpusMeta {
                label: "Tur",
                provider_prefix: "Tur",
                section_qualified: true,
                addresses_paragraphs: false,
                single_section_only: None,
            },
            Self::LaterCommentary => CorpusMeta {
                label: "Mishnah Berurah",
                provider_prefix: "Mishnah Berurah",
                section_qualified: true,
                addresses_paragraphs: true,
                single_section_only: Some(Section::OrachChayim),
            },
        }
    }

    /// Lowercase, store-key-safe slug, stable across releases since it
    /// is embedded in persisted document ids.
    #[must_use]
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::SourceCompendium => "compendium",
            Self::PredecessorCode => "predecessor",
            Self::LaterCommentary => "later_commentary",
        }
    }

    /// Parses a slug back into a `CorpusId`.
    #[must_use]
    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.slug() == slug)
    }
}

impl std::fmt::Display for CorpusId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.meta().label)
    }
}
