//! The persistent store abstraction.
//!
//! Explicit `Result`-returning methods on a `Send + Sync` trait object
//! over scoped document collections with transactions and server
//! timestamps. The real external document database this emulates is
//! out of scope here; [`crate::store::SqliteStore`] stands in for it
//! locally.

use async_trait::async_trait;

use crate::domain::{AlignmentRecord, CanonicalGuideRecord, ChunkRecord, CorpusId, Section};
use crate::error::Result;

/// Outcome of a conditional attempt to acquire the alignment build lock.
#[derive(Debug)]
pub enum AlignmentLockOutcome {
    /// No record existed, or it existed with an expired lock, or a
    /// non-`building` status; the caller now holds the lock and must
    /// build.
    Acquired,
    /// Lock acquisition failed because a `ready` record with the
    /// current schema version already exists; return it as-is.
    AlreadyReady(Box<AlignmentRecord>),
    /// Lock acquisition failed because another caller holds an
    /// unexpired lock; the caller should poll.
    Contended,
}

/// A single explanation lookup key.
#[derive(Debug, Clone)]
pub struct ExplanationKey {
    /// Section.
    pub section: Section,
    /// Chapter (siman).
    pub chapter: u32,
    /// Paragraph (seif).
    pub paragraph: u32,
    /// Corpus the explanation is for.
    pub corpus: CorpusId,
    /// 0-based ordinal within the corpus's chunk sequence for this
    /// paragraph.
    pub ordinal: usize,
}

impl ExplanationKey {
    /// The structured store path: `/corpus-archive/<section>/<chapter>/
    /// <paragraph>/<corpus>/<ordinal>`.
    #[must_use]
    pub fn doc_id(&self) -> String {
        format!("{}/{}/{}/{}/{}",
            self.section.slug(),
            self.chapter,
            self.paragraph,
            self.corpus.slug(),
            self.ordinal)
    }
}

/// Metadata recorded when a canonical-guide request transitions to
/// `processing` for the first time.
#[derive(Debug, Clone)]
pub struct CanonicalRequestMeta {
    /// Requested section.
    pub section: Section,
    /// Requested chapter.
    pub chapter: u32,
    /// Requested paragraph, if paragraph-scoped.
    pub paragraph: Option<u32>,
    /// Sorted corpus slugs participating in the request.
    pub corpora: Vec<String>,
}

/// Outcome of a conditional attempt to acquire the canonical-guide
/// single-flight lock.
#[derive(Debug)]
pub enum CanonicalLockOutcome {
    /// No record existed, or an existing `processing` record's lock is
    /// stale; the caller now holds it and must build.
    Acquired,
    /// A `ready` record already exists; return it as-is.
    AlreadyReady(Box<CanonicalGuideRecord>),
    /// Another caller holds an unexpired `processing` lock; the caller
    /// should poll.
    Contended {
        /// The record's last `updated_at`, for diagnostics.
        updated_at: i64,
    },
}

/// The persistent document store every costly pipeline stage memoizes
/// against. Implementations must be safe to share across
/// concurrently-running request tasks.
#[async_trait]
pub trait Store: Send + Sync {
    /// Reads an `AlignmentRecord` by `(section, chapter)`, if present
    /// and at the current schema version.
    async fn get_alignment(&self, section: Section, chapter: u32) -> Result<Option<AlignmentRecord>>;

    /// Attempts to acquire the alignment build lock.
    async fn acquire_alignment_lock(&self,
        section: Section,
        chapter: u32,
        ttl_secs: i64) -> Result<AlignmentLockOutcome>;

    /// Attempts to acquire the build lock for a revalidation-triggered
    /// rebuild of a `ready` record ("staleness / revalidation").
    /// Unlike [`Store::acquire_alignment_lock()`], this succeeds against a
    /// `ready` record (transitioning it to `building`) rather than
    /// short-circuiting with `AlreadyReady`, since the caller has
    /// already decided the source hash changed.
    async fn acquire_alignment_revalidation_lock(&self,
        section: Section,
        chapter: u32,
        ttl_secs: i64) -> Result<AlignmentLockOutcome>;

    /// Writes a completed `AlignmentRecord` with `status=ready`,
    /// clearing the lock.
    async fn write_alignment_ready(&self, record: AlignmentRecord) -> Result<()>;

    /// Marks the alignment record `status=failed` with `error`,
    /// clearing the lock.
    async fn write_alignment_failed(&self, section: Section, chapter: u32, error: &str) -> Result<()>;

    /// Updates `sourceCheckedAt` on an already-`ready` record without
    /// otherwise touching it (the revalidation "no change" path).
    async fn touch_alignment_checked(&self, section: Section, chapter: u32) -> Result<()>;

    /// Looks up a structured-key explanation record
    /// (`/corpus-archive/...`).
    async fn get_explanation(&self, key: &ExplanationKey) -> Result<Option<crate::domain::records::ExplanationRecord>>;

    /// Looks up a legacy opaque-hash-keyed explanation record, the
    /// fallback when the structured-key lookup misses.
    async fn get_explanation_legacy(&self,
        legacy_key: &str) -> Result<Option<crate::domain::records::ExplanationRecord>>;

    /// Writes an explanation to its structured key.
    async fn write_explanation(&self,
        key: &ExplanationKey,
        record: crate::domain::records::ExplanationRecord) -> Result<()>;

    /// Writes an explanation to a legacy opaque key (forward
    /// deflection).
    async fn write_explanation_legacy(&self,
        legacy_key: &str,
        record: crate::domain::records::ExplanationRecord) -> Result<()>;

    /// Reads a `CanonicalGuideRecord` by request fingerprint.
    async fn get_canonical(&self, fingerprint: &str) -> Result<Option<CanonicalGuideRecord>>;

    /// Attempts to acquire the canonical single-flight lock.
    async fn acquire_canonical_lock(&self,
        fingerprint: &str,
        request: CanonicalRequestMeta,
        stale_secs: i64) -> Result<CanonicalLockOutcome>;

    /// Atomically overwrites any prior chunk sub-records and writes the
    /// canonical record `ready`.
    async fn write_canonical_ready(&self,
        fingerprint: &str,
        record: CanonicalGuideRecord,
        chunks: Vec<ChunkRecord>) -> Result<()>;

    /// Marks the canonical record `failed`.
    async fn write_canonical_failed(&self, fingerprint: &str, reason: &str) -> Result<()>;

    /// Reads the chunk sub-collection for a canonical guide.
    async fn get_canonical_chunks(&self, fingerprint: &str) -> Result<Vec<ChunkRecord>>;
}
