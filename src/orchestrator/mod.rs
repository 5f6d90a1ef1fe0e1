//! The guide orchestrator.
//!
//! The top-level entry point: computes a request fingerprint, acquires
//! the canonical single-flight cache, fans out reference resolution
//! through the alignment engine and resolver, chunks every corpus,
//! drives the explanation memoizer in parallel across corpora (and
//! sequentially within one, to preserve the N-1 context), summarizes
//! the result, and persists the full artifact atomically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::alignment::AlignmentEngine;
use crate::config::Config;
use crate::domain::records::CANONICAL_SCHEMA_VERSION;
use crate::domain::{AlignmentMode, AlignmentRecord, Chunk, CorpusId, Fragment, Section};
use crate::domain::records::{CanonicalGuideRecord, CanonicalStatus, ChunkRecord};
use crate::chunking::{chunk_fragments, ChunkProfile};
use crate::error::{Error, OrchestratorError, Result};
use crate::explain::{explain, ExplanationRequest};
use crate::llm::Llm;
use crate::progress::ProgressSink;
use crate::prompts::SummarySection;
use crate::resolver::{build_ref, fetch_fragments, TextProvider};
use crate::store::{CanonicalLockOutcome, CanonicalRequestMeta, ExplanationKey, Store};
use crate::summary::summarize;
use crate::text::leading_hebrew_words;
use crate::util::{now_ts, sha256_hex};

/// How many leading Hebrew-letter words of a boundary passage anchor
/// the paragraph-slicing search ("the first four Hebrew-letter words
/// of the boundary passage", per the collision scenario the spec
/// flags as an open question).
const BOUNDARY_WORD_COUNT: usize = 4;

/// Stale-lock threshold for the canonical single-flight cache.
const CANONICAL_STALE_SECS: i64 = 10 * 60;
/// Poll cadence while another request holds the canonical lock.
const CANONICAL_POLL_INTERVAL: Duration = Duration::from_millis(1500);
/// Poll attempts per lock-acquisition cycle before retrying the lock
/// itself: 20 attempts × 1.5 s = 30 s, then retry the lock.
const CANONICAL_POLL_ATTEMPTS: usize = 20;
/// How many acquire/poll cycles to run before giving up entirely. A
/// finite cap keeps a wedged lock from polling forever.
const CANONICAL_LOCK_RETRY_CYCLES: usize = 3;

/// Corpora considered when building the per-request summary, in the
/// order their sections appear. `LaterCommentary` is
/// deliberately excluded: it is `companionText`-only and never
/// generated or summarized on its own.
const SUMMARY_CORPORA: [CorpusId; 3] = [CorpusId::Primary, CorpusId::PredecessorCode, CorpusId::SourceCompendium];

const MSG_NO_CONTENT: &str = "לא נמצא תוכן מתאים באף אחד מהמקורות המבוקשים.";
const MSG_NO_SOURCE: &str = "לא נבחר אף מקור ליצירת המדריך.";
const MSG_MISSING_IDENTIFIERS: &str = "חסרים פרטי מיקום תקינים (פרק תקין נדרש).";
const MSG_GENERIC: &str = "אירעה שגיאה בלתי צפויה ביצירת המדריך. נסו שוב מאוחר יותר.";

/// One guide request.
#[derive(Debug, Clone)]
pub struct GuideRequest {
    /// Requested section.
    pub section: Section,
    /// Requested chapter (siman).
    pub chapter: u32,
    /// Requested paragraph (seif), if paragraph-scoped.
    pub paragraph: Option<u32>,
    /// Participating corpora, deduplicated and sorted by slug.
    corpora: Vec<CorpusId>,
}

impl GuideRequest {
    /// Builds a request, deduplicating and canonically ordering
    /// `corpora` so two logically identical requests fingerprint
    /// identically regardless of input order.
    #[must_use]
    pub fn new(section: Section, chapter: u32, paragraph: Option<u32>, mut corpora: Vec<CorpusId>) -> Self {
        corpora.sort_by_key(|c| c.slug());
        corpora.dedup();
        Self {
            section,
            chapter,
            paragraph,
            corpora,
        }
    }

    /// The participating corpora.
    #[must_use]
    pub fn corpora(&self) -> &[CorpusId] {
        &self.corpora
    }
}

fn sorted_corpus_slugs(corpora: &[CorpusId]) -> Vec<String> {
    let mut slugs: Vec<String> = corpora.iter().map(|c| c.slug().to_string()).collect();
    slugs.sort();
    slugs.dedup();
    slugs
}

/// Computes the request fingerprint: `SHA-256` over
/// `"v1|<section>|<chapter>|<paragraph>|<sorted-corpora-csv>"`.
#[must_use]
pub fn fingerprint(request: &GuideRequest) -> String {
    let paragraph_token = request.paragraph.map_or_else(|| "none".to_string(), |p| p.to_string());
    let corpora_csv = sorted_corpus_slugs(&request.corpora).join(",");
    sha256_hex(&format!("v1|{}|{}|{}|{}",
            request.section.slug(),
            request.chapter,
            paragraph_token,
            corpora_csv))
}

/// The external cooperative-cancellation signal: a client sets a
/// status field on a caller-scoped record; the orchestrator polls this
/// trait rather than reaching into that record's storage directly.
#[async_trait]
pub trait CancellationFlag: Send + Sync {
    /// Returns whether the request should stop at the next poll point.
    async fn is_cancelled(&self) -> bool;
}

/// A flag that never signals cancellation, for callers that don't need
/// it and for tests.
#[derive(Debug, Default)]
pub struct NeverCancelled;

#[async_trait]
impl CancellationFlag for NeverCancelled {
    async fn is_cancelled(&self) -> bool {
        false
    }
}

/// One participating corpus's finished chunk records, grouped as the
/// unit a per-corpus task hands back to the orchestrator.
struct CorpusOutcome {
    corpus: CorpusId,
    records: Vec<ChunkRecord>,
    cancelled: bool,
}

enum CanonicalHold {
    Acquired,
    Ready(Box<CanonicalGuideRecord>),
}

enum BuildOutcome {
    Done(GuideData),
    Cancelled,
    NoContent,
}

/// The data a successfully-produced or cache-hit guide carries back to
/// the caller (`CanonicalGuideRecord` plus its `chunks`
/// sub-collection).
#[derive(Debug, Clone)]
pub struct GuideData {
    /// The request fingerprint this guide is keyed by.
    pub fingerprint: String,
    /// Requested section.
    pub section: Section,
    /// Requested chapter.
    pub chapter: u32,
    /// Requested paragraph, if paragraph-scoped.
    pub paragraph: Option<u32>,
    /// Final combined summary text.
    pub summary_text: String,
    /// Model that produced the summary.
    pub summary_model: String,
    /// Whether every per-chunk explanation and the summary itself
    /// validated.
    pub validated: bool,
    /// Total number of chunks processed across all corpora.
    pub chunk_count: usize,
    /// One entry per per-fragment explanation output attached to the
    /// guide.
    pub chunks: Vec<ChunkRecord>,
}

impl GuideData {
    fn from_record(fingerprint: String, record: CanonicalGuideRecord, chunks: Vec<ChunkRecord>) -> Self {
        Self {
            fingerprint,
            section: record.section,
            chapter: record.chapter,
            paragraph: record.paragraph,
            summary_text: record.summary_text,
            summary_model: record.summary_model,
            validated: record.validated,
            chunk_count: record.chunk_count,
            chunks,
        }
    }
}

/// The orchestrator's single discriminated outcome: `error` carries a
/// human-localized Hebrew message for known conditions; internal
/// detail is logged, never forwarded raw.
#[derive(Debug, Clone)]
pub struct GuideOutcome {
    /// Whether a guide was produced (from cache or freshly built).
    pub success: bool,
    /// Whether the request was cancelled before completion.
    pub cancelled: bool,
    /// The produced guide, present iff `success`.
    pub guide: Option<GuideData>,
    /// A localized Hebrew error message, present iff `!success && !cancelled`.
    pub error: Option<String>,
}

impl GuideOutcome {
    const fn success(data: GuideData) -> Self {
        Self {
            success: true,
            cancelled: false,
            guide: Some(data),
            error: None,
        }
    }

    const fn cancelled() -> Self {
        Self {
            success: false,
            cancelled: true,
            guide: None,
            error: None,
        }
    }

    fn failure(message: &str) -> Self {
        Self {
            success: false,
            cancelled: false,
            guide: None,
            error: Some(message.to_string()),
        }
    }
}

/// Drives the full guide-production pipeline end to end.
pub struct GuideOrchestrator {
    store: Arc<dyn Store>,
    provider: Arc<dyn TextProvider>,
    llm: Arc<dyn Llm>,
    alignment: Arc<AlignmentEngine>,
    progress: Arc<dyn ProgressSink>,
    config: Config,
}

impl GuideOrchestrator {
    /// Builds an orchestrator over its dependencies, threaded
    /// explicitly rather than read from ambient singletons.
    #[must_use]
    pub fn new(store: Arc<dyn Store>,
        provider: Arc<dyn TextProvider>,
        llm: Arc<dyn Llm>,
        alignment: Arc<AlignmentEngine>,
        progress: Arc<dyn ProgressSink>,
        config: Config) -> Self {
        Self {
            store,
            provider,
            llm,
            alignment,
            progress,
            config,
        }
    }

    /// Runs the full pipeline for one request.
    ///
    /// # Errors
    ///
    /// Returns an error only for conditions the caller cannot act on
    /// locally (e.g. a wedged canonical lock); every other failure is
    /// folded into the returned [`GuideOutcome`]'s `error` field
    /// instead.
    pub async fn generate(&self, request: GuideRequest, cancellation: Arc<dyn CancellationFlag>) -> Result<GuideOutcome> {
        if request.corpora.is_empty() {
            return Ok(GuideOutcome::failure(MSG_NO_SOURCE));
        }
        if request.chapter == 0 {
            return Ok(GuideOutcome::failure(MSG_MISSING_IDENTIFIERS));
        }

        let fingerprint = fingerprint(&request);
        let meta = CanonicalRequestMeta {
            section: request.section,
            chapter: request.chapter,
            paragraph: request.paragraph,
            corpora: sorted_corpus_slugs(&request.corpora),
        };

        match self.acquire_or_wait(&fingerprint, meta).await? {
            CanonicalHold::Ready(record) => {
                let chunks = self.store.get_canonical_chunks(&fingerprint).await?;
                return Ok(GuideOutcome::success(GuideData::from_record(fingerprint, *record, chunks)));
            }
            CanonicalHold::Acquired => {}
        }

        match self.build(&fingerprint, &request, cancellation).await {
            Ok(BuildOutcome::Done(data)) => Ok(GuideOutcome::success(data)),
            Ok(BuildOutcome::Cancelled) => {
                let _ = self.store.write_canonical_failed(&fingerprint, "cancelled").await;
                Ok(GuideOutcome::cancelled())
            }
            Ok(BuildOutcome::NoContent) => {
                let _ = self.store.write_canonical_failed(&fingerprint, "no_content").await;
                Ok(GuideOutcome::failure(MSG_NO_CONTENT))
            }
            Err(err) => {
                tracing::error!(fingerprint = %fingerprint, error = %err, "[orchestrator] guide build failed");
                let _ = self.store.write_canonical_failed(&fingerprint, &err.to_string()).await;
                Ok(GuideOutcome::failure(MSG_GENERIC))
            }
        }
    }

    async fn acquire_or_wait(&self, fingerprint: &str, meta: CanonicalRequestMeta) -> Result<CanonicalHold> {
        for _ in 0..CANONICAL_LOCK_RETRY_CYCLES {
            match self.store.acquire_canonical_lock(fingerprint, meta.clone(), CANONICAL_STALE_SECS).await? {
                CanonicalLockOutcome::Acquired => return Ok(CanonicalHold::Acquired),
                CanonicalLockOutcome::AlreadyReady(record) => return Ok(CanonicalHold::Ready(record)),
                CanonicalLockOutcome::Contended {.. } => {
                    for _ in 0..CANONICAL_POLL_ATTEMPTS {
                        tokio::time::sleep(CANONICAL_POLL_INTERVAL).await;
                        if let Some(record) = self.store.get_canonical(fingerprint).await? {
                            if record.status == CanonicalStatus::Ready {
                                return Ok(CanonicalHold::Ready(Box::new(record)));
                            }
                        }
                    }
                }
            }
        }

        Err(Error::Orchestrator(OrchestratorError::CanonicalWaitTimeout {
                    fingerprint: fingerprint.to_string(),
        }))
    }

    async fn build(&self, fingerprint: &str, request: &GuideRequest, cancellation: Arc<dyn CancellationFlag>) -> Result<BuildOutcome> {
        let fetched = self.fetch_all(request).await?;

        let mut per_corpus_chunks: HashMap<CorpusId, Vec<Chunk>> = HashMap::new();
        let mut total_chunks = 0usize;
        for corpus in &request.corpora {
            if *corpus == CorpusId::LaterCommentary {
                continue;
            }
            let Some(fragments) = fetched.fragments.get(corpus) else {
                continue;
            };
            let (chunks, truncated) =
            chunk_fragments(fragments, *corpus, ChunkProfile::EXPLANATION, Some(self.config.max_chunks_per_source));
            if truncated {
                tracing::warn!(corpus = corpus.slug(), fingerprint, "[orchestrator] chunk cap truncated tail for corpus");
            }
            if chunks.is_empty() {
                continue;
            }
            total_chunks += chunks.len();
            per_corpus_chunks.insert(*corpus, chunks);
        }

        if per_corpus_chunks.is_empty() {
            return Ok(BuildOutcome::NoContent);
        }

        self.progress.init(fingerprint, total_chunks).await?;

        let tier_model = self.config.tier_for_chunk_count(total_chunks).to_string();

        let mut joinset = JoinSet::new();
        for (corpus, chunks) in per_corpus_chunks {
            let companion_text = if corpus == CorpusId::Primary { fetched.companion_text.clone() } else { None };
            joinset.spawn(process_corpus(Arc::clone(&self.store),
                    Arc::clone(&self.llm),
                    self.config.clone(),
                    Arc::clone(&self.progress),
                    Arc::clone(&cancellation),
                    fingerprint.to_string(),
                    request.section,
                    request.chapter,
                    request.paragraph.unwrap_or(0),
                    corpus,
                    corpus.meta().label.to_string(),
                    chunks,
                    companion_text,
                    tier_model.clone()));
        }

        let mut chunks_by_corpus: HashMap<CorpusId, Vec<ChunkRecord>> = HashMap::new();
        let mut any_cancelled = false;

        while let Some(joined) = joinset.join_next().await {
            let outcome = joined.map_err(|e| {
                    Error::Orchestrator(OrchestratorError::TaskFailure {
                            reason: e.to_string(),
                    })
            })??;
            if outcome.cancelled {
                any_cancelled = true;
            }
            chunks_by_corpus.entry(outcome.corpus).or_default().extend(outcome.records);
        }

        if any_cancelled {
            return Ok(BuildOutcome::Cancelled);
        }

        let mut all_records = Vec::new();
        let mut section_texts: Vec<(&'static str, String)> = Vec::new();
        for corpus in SUMMARY_CORPORA {
            let Some(records) = chunks_by_corpus.remove(&corpus) else {
                continue;
            };
            if records.is_empty() {
                continue;
            }
            let combined = records.iter().map(|r| r.explanation_text.as_str()).collect::<Vec<_>>().join("\n\n");
            section_texts.push((corpus.meta().label, combined));
            all_records.extend(records);
        }

        if all_records.is_empty() {
            return Ok(BuildOutcome::NoContent);
        }

        let sections: Vec<SummarySection<'_>> = section_texts
        .iter()
        .map(|(label, text)| SummarySection {
                label: *label,
                combined_text: text.as_str(),
        })
        .collect();

        let summary_outcome = summarize(Arc::clone(&self.llm), &self.config, &sections, &tier_model).await?;
        let validated = summary_outcome.validated && all_records.iter().all(|r| r.validated);
        let now = now_ts();

        let record = CanonicalGuideRecord {
            version: CANONICAL_SCHEMA_VERSION,
            status: CanonicalStatus::Ready,
            section: request.section,
            chapter: request.chapter,
            paragraph: request.paragraph,
            corpora: sorted_corpus_slugs(&request.corpora),
            summary_text: summary_outcome.summary.clone(),
            summary_model: summary_outcome.model_used.clone(),
            validated,
            chunk_count: all_records.len(),
            created_at: now,
            updated_at: now,
        };

        self.store.write_canonical_ready(fingerprint, record, all_records.clone()).await?;

        Ok(BuildOutcome::Done(GuideData {
                    fingerprint: fingerprint.to_string(),
                    section: request.section,
                    chapter: request.chapter,
                    paragraph: request.paragraph,
                    summary_text: summary_outcome.summary,
                    summary_model: summary_outcome.model_used,
                    validated,
                    chunk_count: all_records.len(),
                    chunks: all_records,
        }))
    }

    /// Fetches every participating corpus's fragments per the
    /// per-corpus fetch-strategy table, tolerating individual upstream
    /// failures by treating that corpus as empty rather than failing
    /// the whole request.
    async fn fetch_all(&self, request: &GuideRequest) -> Result<FetchResult> {
        let mut fragments = HashMap::new();

        let needs_alignment = request
        .corpora
        .iter()
        .any(|c| matches!(c, CorpusId::PredecessorCode | CorpusId::SourceCompendium));
        let alignment = if needs_alignment && request.paragraph.is_some() {
            Some(self.alignment.get_or_build(request.section, request.chapter).await?)
        } else {
            None
        };

        for corpus in &request.corpora {
            match corpus {
                CorpusId::Primary => {
                    let fetched = self.fetch_exact_paragraph(CorpusId::Primary, request).await?;
                    if !fetched.is_empty() {
                        fragments.insert(CorpusId::Primary, fetched);
                    }
                }
                CorpusId::PredecessorCode | CorpusId::SourceCompendium => {
                    let fetched = self.fetch_via_alignment(*corpus, request, alignment.as_ref()).await?;
                    if !fetched.is_empty() {
                        fragments.insert(*corpus, fetched);
                    }
                }
                CorpusId::LaterCommentary => {}
            }
        }

        let companion_text = self.fetch_companion_text(request).await?;

        Ok(FetchResult { fragments, companion_text })
    }

    /// Fetches the exact-paragraph ref for a corpus whose refs address
    /// paragraphs directly (primary, later-commentary).
    async fn fetch_exact_paragraph(&self, corpus: CorpusId, request: &GuideRequest) -> Result<Vec<Fragment>> {
        if let Some(restricted) = corpus.meta().single_section_only {
            if restricted != request.section {
                return Ok(Vec::new());
            }
        }

        let paragraph_str = request.paragraph.map(|p| p.to_string());
        let reference = match build_ref(corpus, request.section, &request.chapter.to_string(), paragraph_str.as_deref()) {
            Ok(reference) => reference,
            Err(err) => {
                tracing::warn!(corpus = corpus.slug(), error = %err, "[orchestrator] could not build reference, skipping corpus");
                return Ok(Vec::new());
            }
        };

        match fetch_fragments(self.provider.as_ref(), &reference).await {
            Ok((_, fragments)) => Ok(fragments),
            Err(err) => {
                tracing::warn!(corpus = corpus.slug(), reference, error = %err, "[orchestrator] upstream fetch failed, continuing with fewer corpora");
                Ok(Vec::new())
            }
        }
    }

    /// Fetches a secondary corpus's paragraph text via the alignment
    /// engine's precomputed refs.
    ///
    /// For predecessor-code under `linked-passages` mode, first
    /// attempts the "tighter paragraph slicing" strategy
    /// ([`Self::try_paragraph_slice`]) using boundary markers taken
    /// from source-compendium's links on the current and next
    /// paragraph; if that search locates both boundaries, it is used
    /// in place of the full ref-list fetch. Otherwise falls back to
    /// fetching every ref in full.
    async fn fetch_via_alignment(&self,
        corpus: CorpusId,
        request: &GuideRequest,
        alignment: Option<&AlignmentRecord>) -> Result<Vec<Fragment>> {
        let Some(paragraph) = request.paragraph else {
            return Ok(Vec::new());
        };
        let Some(record) = alignment else {
            return Ok(Vec::new());
        };
        let Some(paragraph_alignment) = record.alignment_for(paragraph, corpus) else {
            return Ok(Vec::new());
        };

        if corpus == CorpusId::SourceCompendium && paragraph_alignment.mode != AlignmentMode::LinkedPassages {
            return Ok(Vec::new());
        }
        if paragraph_alignment.refs.is_empty() {
            return Ok(Vec::new());
        }

        if corpus == CorpusId::PredecessorCode && paragraph_alignment.mode == AlignmentMode::LinkedPassages {
            if let Some(sliced) = self.try_paragraph_slice(record, paragraph, &paragraph_alignment.refs).await? {
                return Ok(sliced);
            }
        }

        let mut out = Vec::new();
        for reference in &paragraph_alignment.refs {
            match fetch_fragments(self.provider.as_ref(), reference.as_str()).await {
                Ok((_, fragments)) => out.extend(fragments),
                Err(err) => {
                    tracing::warn!(corpus = corpus.slug(), reference = %reference, error = %err, "[orchestrator] upstream fetch failed for linked ref, skipping");
                }
            }
        }
        Ok(out)
    }

    /// Attempts the "tighter paragraph slicing" strategy for
    /// predecessor-code (spec.md:173): fetches predecessor-code's full
    /// linked text, then narrows it to just this paragraph's span using
    /// the first `BOUNDARY_WORD_COUNT` Hebrew words of source-
    /// compendium's linked passage for this paragraph (the start
    /// boundary) and for the next paragraph (the end boundary) as
    /// locatable markers inside the predecessor's concatenated text.
    ///
    /// Collision rule (spec.md §9 Open Question 1): a boundary phrase
    /// is searched for its first occurrence in the predecessor text,
    /// full stop — even if the true boundary passage repeats later in
    /// the monolithic leaf. This can select the wrong substring when an
    /// earlier, coincidental occurrence of the same four words precedes
    /// the real boundary; that collision is accepted as unspecified
    /// behavior per the spec rather than guarded against, since
    /// resolving it would require upstream context the alignment engine
    /// does not have.
    ///
    /// Returns `None` (triggering the full ref-list fallback) when
    /// either boundary is missing or the end boundary does not occur
    /// strictly after the start boundary.
    async fn try_paragraph_slice(&self,
        record: &AlignmentRecord,
        paragraph: u32,
        predecessor_refs: &[crate::domain::FragmentRef]) -> Result<Option<Vec<Fragment>>> {
        let start_phrase = self.compendium_boundary_phrase(record, paragraph).await?;
        let end_phrase = self.compendium_boundary_phrase(record, paragraph + 1).await?;
        if start_phrase.is_none() && end_phrase.is_none() {
            return Ok(None);
        }

        let mut predecessor_fragments = Vec::new();
        for reference in predecessor_refs {
            match fetch_fragments(self.provider.as_ref(), reference.as_str()).await {
                Ok((_, fragments)) => predecessor_fragments.extend(fragments),
                Err(err) => {
                    tracing::warn!(reference = %reference, error = %err, "[orchestrator] upstream fetch failed for predecessor boundary slice, skipping");
                }
            }
        }
        if predecessor_fragments.is_empty() {
            return Ok(None);
        }

        let full_text = predecessor_fragments.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join(" ");
        let start = start_phrase.as_deref().and_then(|p| full_text.find(p)).unwrap_or(0);
        let end = end_phrase.as_deref().and_then(|p| full_text.find(p));

        let Some(end) = end else { return Ok(None) };
        if end <= start {
            return Ok(None);
        }

        let sliced = full_text[start..end].trim();
        if sliced.is_empty() {
            return Ok(None);
        }

        let reference = predecessor_fragments[0].reference.clone();
        Ok(Some(vec![Fragment::new(reference, Vec::new(), sliced.to_string())]))
    }

    /// Fetches source-compendium's linked passage for `paragraph` (if
    /// its alignment is `linked-passages`) and reduces it to a
    /// locatable boundary phrase via
    /// [`crate::text::leading_hebrew_words`].
    async fn compendium_boundary_phrase(&self, record: &AlignmentRecord, paragraph: u32) -> Result<Option<String>> {
        let Some(alignment) = record.alignment_for(paragraph, CorpusId::SourceCompendium) else {
            return Ok(None);
        };
        if alignment.mode != AlignmentMode::LinkedPassages || alignment.refs.is_empty() {
            return Ok(None);
        }

        let Some(reference) = alignment.refs.first() else {
            return Ok(None);
        };
        let fragments = match fetch_fragments(self.provider.as_ref(), reference.as_str()).await {
            Ok((_, fragments)) => fragments,
            Err(err) => {
                tracing::warn!(reference = %reference, error = %err, "[orchestrator] upstream fetch failed for boundary phrase, skipping");
                return Ok(None);
            }
        };
        let text = fragments.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join(" ");
        Ok(leading_hebrew_words(&text, BOUNDARY_WORD_COUNT))
    }

    /// Fetches the later-commentary's raw paragraph text to serve as
    /// `companionText` for the primary. Only meaningful when both the
    /// primary and later-commentary are requested; later-commentary is
    /// retained only as companion text and never generated
    /// independently.
    async fn fetch_companion_text(&self, request: &GuideRequest) -> Result<Option<String>> {
        if !request.corpora.contains(&CorpusId::Primary) || !request.corpora.contains(&CorpusId::LaterCommentary) {
            return Ok(None);
        }

        let fragments = self.fetch_exact_paragraph(CorpusId::LaterCommentary, request).await?;
        if fragments.is_empty() {
            return Ok(None);
        }
        Ok(Some(fragments.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join(" ")))
    }
}

struct FetchResult {
    fragments: HashMap<CorpusId, Vec<Fragment>>,
    companion_text: Option<String>,
}

/// Processes one corpus's chunks sequentially, carrying the N-1
/// context forward, polling `cancellation` every
/// `config.cancellation_check_interval` chunks.
#[allow(clippy::too_many_arguments)]
async fn process_corpus(store: Arc<dyn Store>,
    llm: Arc<dyn Llm>,
    config: Config,
    progress: Arc<dyn ProgressSink>,
    cancellation: Arc<dyn CancellationFlag>,
    fingerprint: String,
    section: Section,
    chapter: u32,
    paragraph: u32,
    corpus: CorpusId,
    corpus_label: String,
    chunks: Vec<Chunk>,
    companion_text: Option<String>,
    preferred_model: String) -> Result<CorpusOutcome> {
    let mut records = Vec::with_capacity(chunks.len());
    let mut previous: Option<(String, String)> = None;
    let mut cancelled = false;

    for (ordinal, chunk) in chunks.into_iter().enumerate() {
        if ordinal % config.cancellation_check_interval == 0 && cancellation.is_cancelled().await {
            cancelled = true;
            break;
        }

        let request = ExplanationRequest {
            key: ExplanationKey {
                section,
                chapter,
                paragraph,
                corpus,
                ordinal,
            },
            ref_canonical: chunk.reference.as_ref().map(|r| r.as_str().to_string()),
            content_hash: chunk.content_hash.clone(),
            corpus_label: corpus_label.clone(),
            current_segment: chunk.text.clone(),
            previous: previous.clone(),
            companion_text: companion_text.clone(),
            preferred_model: preferred_model.clone(),
        };

        let outcome = explain(&store, Arc::clone(&llm), &config, request).await?;
        previous = Some((chunk.text.clone(), outcome.explanation.clone()));
        progress.increment(&fingerprint).await?;

        records.push(ChunkRecord {
                corpus,
                ordinal,
                chunk_id: chunk.id,
                chunk_text: chunk.text,
                explanation_text: outcome.explanation,
                model_name: outcome.model_used,
                validated: outcome.validated,
        });
    }

    Ok(CorpusOutcome { corpus, records, cancelled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::ParagraphAlignment;
    use crate::llm::fixture::FixtureLlm;
    use crate::progress::NullProgress;
    use crate::resolver::FixtureTextProvider;
    use crate::store::SqliteStore;

    fn provider_with_chapter() -> FixtureTextProvider {
        FixtureTextProvider::new()
        .with_text("Shulchan Arukh, Orach Chayim 24:1",
            "Shulchan Arukh, Orach Chayim 24:1",
            serde_json::json!(["פסקה ראשונה עם תוכן הלכתי"]))
        .with_text("Tur, Orach Chayim 24",
            "Tur, Orach Chayim 24",
            serde_json::json!(["טקסט תור המקביל"]))
        .with_text("Beit Yosef, Orach Chayim 24",
            "Beit Yosef, Orach Chayim 24",
            serde_json::json!(["טקסט בית יוסף המקביל"]))
        .with_links("Shulchan Arukh, Orach Chayim 24:1",
            vec![serde_json::json!({"refs": ["Tur, Orach Chayim 24", "Beit Yosef, Orach Chayim 24"]})])
    }

    fn orchestrator(store: Arc<dyn Store>, provider: Arc<dyn TextProvider>, llm: Arc<dyn Llm>) -> GuideOrchestrator {
        let alignment = Arc::new(AlignmentEngine::new(Arc::clone(&store), Arc::clone(&provider)));
        GuideOrchestrator::new(store, provider, llm, alignment, Arc::new(NullProgress), Config::default())
    }

    fn alignment_record_with_boundaries() -> AlignmentRecord {
        use crate::domain::FragmentRef;
        use std::collections::BTreeMap;

        let mut paragraph_map = BTreeMap::new();

        let mut paragraph_1 = BTreeMap::new();
        paragraph_1.insert(CorpusId::PredecessorCode.slug().to_string(),
            ParagraphAlignment {
                refs: vec![FragmentRef::from("Tur, Orach Chayim 24")],
                mode: AlignmentMode::LinkedPassages,
                score: 1.0,
            });
        paragraph_1.insert(CorpusId::SourceCompendium.slug().to_string(),
            ParagraphAlignment {
                refs: vec![FragmentRef::from("Beit Yosef, Orach Chayim 24:1")],
                mode: AlignmentMode::LinkedPassages,
                score: 1.0,
            });
        paragraph_map.insert("1".to_string(), paragraph_1);

        let mut paragraph_2 = BTreeMap::new();
        paragraph_2.insert(CorpusId::SourceCompendium.slug().to_string(),
            ParagraphAlignment {
                refs: vec![FragmentRef::from("Beit Yosef, Orach Chayim 24:2")],
                mode: AlignmentMode::LinkedPassages,
                score: 1.0,
            });
        paragraph_map.insert("2".to_string(), paragraph_2);

        AlignmentRecord {
            version: crate::domain::records::ALIGNMENT_SCHEMA_VERSION,
            section: Section::OrachChayim,
            chapter: 24,
            status: crate::domain::records::AlignmentStatus::Ready,
            lock_expires_at: None,
            source_hash: BTreeMap::new(),
            paragraph_map,
            source_checked_at: now_ts(),
            created_at: now_ts(),
            updated_at: now_ts(),
            error: None,
        }
    }

    #[test]
    fn fingerprint_is_stable_regardless_of_corpora_order() {
        let a = GuideRequest::new(Section::OrachChayim,
            24,
            Some(1),
            vec![CorpusId::Primary, CorpusId::PredecessorCode]);
        let b = GuideRequest::new(Section::OrachChayim,
            24,
            Some(1),
            vec![CorpusId::PredecessorCode, CorpusId::Primary]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_paragraph() {
        let a = GuideRequest::new(Section::OrachChayim, 24, Some(1), vec![CorpusId::Primary]);
        let b = GuideRequest::new(Section::OrachChayim, 24, Some(2), vec![CorpusId::Primary]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[tokio::test]
    async fn paragraph_slice_narrows_predecessor_text_between_boundaries() {
        let provider = FixtureTextProvider::new()
            .with_text("Beit Yosef, Orach Chayim 24:1",
                "Beit Yosef, Orach Chayim 24:1",
                serde_json::json!(["אחת שתיים שלוש ארבע פתיחה"]))
            .with_text("Beit Yosef, Orach Chayim 24:2",
                "Beit Yosef, Orach Chayim 24:2",
                serde_json::json!(["חמש שש שבע שמונה פתיחה"]))
            .with_text("Tur, Orach Chayim 24",
                "Tur, Orach Chayim 24",
                serde_json::json!(["מבוא אחת שתיים שלוש ארבע תוכן פסקה ראשונה חמש שש שבע שמונה תוכן פסקה שנייה"]));
        let provider: Arc<dyn TextProvider> = Arc::new(provider);
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let llm = Arc::new(FixtureLlm::new());
        let orchestrator = orchestrator(store, provider, llm);

        let record = alignment_record_with_boundaries();
        let predecessor_refs = vec![crate::domain::FragmentRef::from("Tur, Orach Chayim 24")];
        let sliced = orchestrator
            .try_paragraph_slice(&record, 1, &predecessor_refs)
            .await
            .unwrap()
            .expect("boundaries should be found");
        assert_eq!(sliced.len(), 1);
        assert_eq!(sliced[0].text, "תוכן פסקה ראשונה");
    }

    #[tokio::test]
    async fn paragraph_slice_falls_back_when_no_boundaries_found() {
        let provider = FixtureTextProvider::new().with_text("Tur, Orach Chayim 24",
            "Tur, Orach Chayim 24",
            serde_json::json!(["טקסט ללא גבולות מזוהים כלל"]));
        let provider: Arc<dyn TextProvider> = Arc::new(provider);
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let llm = Arc::new(FixtureLlm::new());
        let orchestrator = orchestrator(store, provider, llm);

        let record = alignment_record_with_boundaries();
        let predecessor_refs = vec![crate::domain::FragmentRef::from("Tur, Orach Chayim 24")];
        let sliced = orchestrator.try_paragraph_slice(&record, 1, &predecessor_refs).await.unwrap();
        assert!(sliced.is_none());
    }

    #[tokio::test]
    async fn empty_corpora_returns_localized_failure_without_touching_store() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let provider: Arc<dyn TextProvider> = Arc::new(FixtureTextProvider::new());
        let llm = Arc::new(FixtureLlm::new());
        let orchestrator = orchestrator(store, provider, llm);

        let request = GuideRequest::new(Section::OrachChayim, 24, Some(1), vec![]);
        let outcome = orchestrator.generate(request, Arc::new(NeverCancelled)).await.unwrap();
        assert!(!outcome.success);
        assert!(!outcome.cancelled);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn full_request_builds_and_caches_a_guide() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let provider: Arc<dyn TextProvider> = Arc::new(provider_with_chapter());
        let llm = Arc::new(FixtureLlm::new()
            .script("gemini-2.5-pro", vec![Ok("**הסבר** מפורט בעברית לנושא".to_string()); 10])
            .script("gemini-2.5-flash", vec![Ok("- פסק עיקרי\n- הלכה למעשה".to_string())]));
        let orchestrator = orchestrator(Arc::clone(&store), provider, llm);

        let request = GuideRequest::new(Section::OrachChayim,
            24,
            Some(1),
            vec![CorpusId::Primary, CorpusId::PredecessorCode, CorpusId::SourceCompendium]);
        let first = orchestrator.generate(request.clone(), Arc::new(NeverCancelled)).await.unwrap();
        assert!(first.success);
        let guide = first.guide.unwrap();
        assert!(!guide.chunks.is_empty());
        assert!(!guide.summary_text.is_empty());

        let cached = orchestrator.generate(request, Arc::new(NeverCancelled)).await.unwrap();
        assert!(cached.success);
        assert_eq!(cached.guide.unwrap().fingerprint, guide.fingerprint);
    }

    #[tokio::test]
    async fn no_content_from_any_corpus_is_a_localized_failure() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let provider: Arc<dyn TextProvider> = Arc::new(FixtureTextProvider::new());
        let llm = Arc::new(FixtureLlm::new());
        let orchestrator = orchestrator(store, provider, llm);

        let request = GuideRequest::new(Section::OrachChayim, 24, Some(1), vec![CorpusId::Primary]);
        let outcome = orchestrator.generate(request, Arc::new(NeverCancelled)).await.unwrap();
        assert!(!outcome.success);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.error.as_deref(), Some(MSG_NO_CONTENT));
    }

    struct AlwaysCancelled;

    #[async_trait]
    impl CancellationFlag for AlwaysCancelled {
        async fn is_cancelled(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn cancellation_before_first_chunk_yields_cancelled_outcome_and_writes_no_chunks() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let provider: Arc<dyn TextProvider> = Arc::new(provider_with_chapter());
        let llm = Arc::new(FixtureLlm::new().script("gemini-2.5-pro", vec![Ok("לא אמור להיקרא".to_string())]));
        let orchestrator = orchestrator(Arc::clone(&store), provider, llm);

        let request = GuideRequest::new(Section::OrachChayim, 24, Some(1), vec![CorpusId::Primary]);
        let fp = fingerprint(&request);
        let outcome = orchestrator.generate(request, Arc::new(AlwaysCancelled)).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.cancelled);
        assert!(store.get_canonical_chunks(&fp).await.unwrap().is_empty());
    }
}
