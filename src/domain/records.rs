//! Persisted record kinds: `AlignmentRecord`,
//! `ExplanationRecord`, `CanonicalGuideRecord`, and their nested value
//! objects.
//!
//! Status fields are closed enums, not open strings — a record with
//! an unrecognized `version` is rejected on read rather than guessed
//! at.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::corpus::CorpusId;
use crate::domain::fragment::FragmentRef;
use crate::domain::location::Section;

/// Current schema version for `AlignmentRecord`. Records with an older
/// version are considered invalid on read.
pub const ALIGNMENT_SCHEMA_VERSION: u32 = 1;

/// Current schema version for `CanonicalGuideRecord`.
pub const CANONICAL_SCHEMA_VERSION: u32 = 1;

/// Lifecycle status of an `AlignmentRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStatus {
    /// A build is in progress; `lock_expires_at` is meaningful.
    Building,
    /// `paragraph_map` is complete and safe to read.
    Ready,
    /// The last build attempt failed; `error` carries the reason.
    Failed,
}

/// How a `ParagraphAlignment`'s refs were determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlignmentMode {
    /// Refs came from the provider's link graph.
    LinkedPassages,
    /// Refs came from lexical similarity selection.
    FallbackSimilarity,
    /// No refs could be determined.
    None,
}

/// Per-secondary-corpus alignment for one paragraph of the primary
/// work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphAlignment {
    /// Ordered, unique list of matched reference strings.
    pub refs: Vec<FragmentRef>,
    /// How the refs were determined.
    pub mode: AlignmentMode,
    /// Match confidence in `[0, 1]`.
    pub score: f64,
}

impl ParagraphAlignment {
    /// An empty alignment with `mode=none`, used when neither the link
    /// graph nor similarity selection yields anything.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            refs: Vec::new(),
            mode: AlignmentMode::None,
            score: 0.0,
        }
    }
}

/// One `AlignmentRecord`, keyed by `(section, chapter)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentRecord {
    /// Schema version this record was written with.
    pub version: u32,
    /// Section this record covers.
    pub section: Section,
    /// Chapter (siman) this record covers.
    pub chapter: u32,
    /// Lifecycle status.
    pub status: AlignmentStatus,
    /// Monotonic expiry for the build lock; only meaningful when
    /// `status == Building`.
    pub lock_expires_at: Option<i64>,
    /// Content hash of the upstream response for each corpus fetched
    /// for this chapter, keyed by corpus slug.
    pub source_hash: BTreeMap<String, String>,
    /// Per-paragraph alignment, keyed by paragraph number as a string
    /// (matches the store's JSON map representation) mapping to a
    /// per-secondary-corpus alignment, keyed by corpus slug.
    pub paragraph_map: BTreeMap<String, BTreeMap<String, ParagraphAlignment>>,
    /// Last time the source hashes were revalidated against upstream.
    pub source_checked_at: i64,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last-update timestamp.
    pub updated_at: i64,
    /// Failure reason, present only when `status == Failed`.
    pub error: Option<String>,
}

impl AlignmentRecord {
    /// The mean of the secondary corpora's scores for one paragraph,
    /// rounded to 3 decimals ("confidence").
    #[must_use]
    pub fn confidence(alignments: &BTreeMap<String, ParagraphAlignment>) -> f64 {
        if alignments.is_empty() {
            return 0.0;
        }
        let total: f64 = alignments.values().map(|a| a.score).sum();
        let mean = total / alignments.len() as f64;
        (mean * 1000.0).round() / 1000.0
    }

    /// The stored document id for this record, `<section-slug>_<chapter>`.
    #[must_use]
    pub fn doc_id(section: Section, chapter: u32) -> String {
        format!("{}_{}", section.slug(), chapter)
    }

    /// `ParagraphAlignment` for one secondary corpus in one paragraph,
    /// if present.
    #[must_use]
    pub fn alignment_for(&self, paragraph: u32, corpus: CorpusId) -> Option<&ParagraphAlignment> {
        self.paragraph_map
        .get(&paragraph.to_string())
        .and_then(|per_corpus| per_corpus.get(corpus.slug()))
    }
}

/// One `ExplanationRecord`, keyed by `(section, chapter, paragraph,
/// corpus, ordinal)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationRecord {
    /// Raw (unvalidated) model output.
    pub raw_text: String,
    /// Final explanation text (post-repair if a repair round ran).
    pub explanation_text: String,
    /// Content hash of the chunk this explanation was generated for.
    pub content_hash: String,
    /// Model that actually produced `explanation_text`.
    pub model_name: String,
    /// Prompt version tag in effect when this record was written.
    pub prompt_version: String,
    /// Whether the Hebrew-ratio/format validation passed.
    pub validated: bool,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last-update timestamp.
    pub updated_at: i64,
}

impl ExplanationRecord {
    /// A record is a cache hit only if both the content hash and the
    /// prompt version match the requester's.
    #[must_use]
    pub fn matches(&self, content_hash: &str, prompt_version: &str) -> bool {
        self.content_hash == content_hash && self.prompt_version == prompt_version
    }
}

/// Lifecycle status of a `CanonicalGuideRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    /// A request is assembling this guide; `updated_at` is meaningful
    /// for staleness detection.
    Processing,
    /// `summary_text` is complete and safe to read.
    Ready,
    /// Generation failed; see the orchestrator's in-memory error for
    /// the message (not persisted verbatim on the record).
    Failed,
}

/// One `CanonicalGuideRecord`, keyed by request fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalGuideRecord {
    /// Schema version.
    pub version: u32,
    /// Lifecycle status.
    pub status: CanonicalStatus,
    /// Requested section.
    pub section: Section,
    /// Requested chapter.
    pub chapter: u32,
    /// Requested paragraph, if paragraph-scoped.
    pub paragraph: Option<u32>,
    /// Sorted list of corpus slugs that participated in the request.
    pub corpora: Vec<String>,
    /// Final combined summary text.
    pub summary_text: String,
    /// Model that produced the summary.
    pub summary_model: String,
    /// Whether every per-chunk explanation and the summary itself
    /// validated.
    pub validated: bool,
    /// Total number of chunks processed across all corpora.
    pub chunk_count: usize,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last-update timestamp.
    pub updated_at: i64,
}

/// One entry in a `CanonicalGuideRecord`'s `chunks` sub-collection:
/// one per-fragment explanation output attached to the guide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Corpus this chunk came from.
    pub corpus: CorpusId,
    /// 0-based ordinal within that corpus's chunk sequence.
    pub ordinal: usize,
    /// The chunk's deterministic id.
    pub chunk_id: String,
    /// The chunk's source text.
    pub chunk_text: String,
    /// The explanation produced for this chunk.
    pub explanation_text: String,
    /// Model that produced the explanation.
    pub model_name: String,
    /// Whether the explanation validated.
    pub validated: bool,
}
