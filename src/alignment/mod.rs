//! The cross-corpus alignment engine.
//!
//! For a `(section, chapter)`, computes for each paragraph of the
//! primary work a [`ParagraphAlignment`] against each secondary corpus,
//! preferring the upstream link graph and falling back to lexical
//! similarity. Builds are single-flight both in-process (one
//! pending [`Shared`] future per key) and across processes (the
//! store's conditional lock transaction).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

use crate::chunking::{ALIGNMENT_CHUNK_CAP, ChunkProfile, chunk_fragments};
use crate::domain::records::ALIGNMENT_SCHEMA_VERSION;
use crate::domain::{AlignmentMode, AlignmentRecord, AlignmentStatus, CorpusId, Fragment, FragmentRef, ParagraphAlignment, Section};
use crate::error::{AlignmentError, Error, Result};
use crate::resolver::{TextProvider, build_ref, fetch_fragments, fetch_linked_refs};
use crate::similarity::{Candidate, SimilarityIndex, TextProfile};
use crate::store::{AlignmentLockOutcome, Store};
use crate::util::{content_hash, now_ts};

/// Lock TTL for a fresh build.
const ALIGNMENT_LOCK_TTL_SECS: i64 = 5 * 60;
/// How long a ready record is trusted before its source is re-checked
/// ("Staleness / revalidation").
const REVALIDATION_INTERVAL_SECS: i64 = 12 * 60 * 60;
/// Polling cadence while another process holds the build lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Total time to poll before raising a timeout.
const LOCK_POLL_TOTAL: Duration = Duration::from_secs(180);

/// The three corpora fetched for one alignment build.
const ALIGNMENT_CORPORA: [CorpusId; 3] = [CorpusId::Primary, CorpusId::PredecessorCode, CorpusId::SourceCompendium];

type PendingFuture = Shared<BoxFuture<'static, Arc<std::result::Result<AlignmentRecord, String>>>>;

/// Computes and memoizes per-chapter cross-corpus alignments.
pub struct AlignmentEngine {
    store: Arc<dyn Store>,
    provider: Arc<dyn TextProvider>,
    pending: Mutex<HashMap<String, PendingFuture>>,
}

impl AlignmentEngine {
    /// Builds an engine over the given store and text provider.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn TextProvider>) -> Self {
        Self {
            store,
            provider,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the `(section, chapter)` alignment, building or
    /// revalidating it if necessary. Concurrent callers for the same
    /// key share one in-flight build ("in-process
    /// deduplication").
    ///
    /// # Errors
    ///
    /// Returns an error if the build fails, if lock contention exceeds
    /// the polling timeout, or if the store itself errors.
    pub async fn get_or_build(&self, section: Section, chapter: u32) -> Result<AlignmentRecord> {
        let key = format!("{}_{}", section.slug(), chapter);

        let shared = {
            let mut pending = self.pending.lock().await;
            if let Some(existing) = pending.get(&key) {
                existing.clone()
            } else {
                let store = Arc::clone(&self.store);
                let provider = Arc::clone(&self.provider);
                let fut: BoxFuture<'static, Arc<std::result::Result<AlignmentRecord, String>>> = Box::pin(async move {
                        let outcome = resolve(&store, &provider, section, chapter).await;
                        Arc::new(outcome.map_err(|e| e.to_string()))
                });
                let shared = fut.shared();
                pending.insert(key.clone(), shared.clone());
                shared
            }
        };

        let outcome = shared.await;

        {
            let mut pending = self.pending.lock().await;
            pending.remove(&key);
        }

        (*outcome).clone().map_err(|reason| {
                Error::Alignment(AlignmentError::BuildFailed {
                        section: section.canonical_name().to_string(),
                        chapter,
                        reason,
                })
        })
    }
}

fn store_err(section: Section, chapter: u32) -> impl Fn(Error) -> AlignmentError {
    move |err: Error| AlignmentError::BuildFailed {
        section: section.canonical_name().to_string(),
        chapter,
        reason: err.to_string(),
    }
}

fn build_err(section: Section, chapter: u32, err: &impl std::fmt::Display) -> AlignmentError {
    AlignmentError::BuildFailed {
        section: section.canonical_name().to_string(),
        chapter,
        reason: err.to_string(),
    }
}

async fn resolve(store: &Arc<dyn Store>,
    provider: &Arc<dyn TextProvider>,
    section: Section,
    chapter: u32) -> std::result::Result<AlignmentRecord, AlignmentError> {
    let existing = store
    .get_alignment(section, chapter)
    .await
    .map_err(store_err(section, chapter))?;

    match existing {
        Some(record) if record.status == AlignmentStatus::Ready => revalidate(store, provider, section, chapter, record).await,
        _ => acquire_and_build(store, provider, section, chapter).await,
    }
}

async fn revalidate(store: &Arc<dyn Store>,
    provider: &Arc<dyn TextProvider>,
    section: Section,
    chapter: u32,
    record: AlignmentRecord) -> std::result::Result<AlignmentRecord, AlignmentError> {
    let now = now_ts();
    if now - record.source_checked_at < REVALIDATION_INTERVAL_SECS {
        return Ok(record);
    }

    let fetched = fetch_corpus_fragments(provider, section, chapter).await?;
    let fresh_hash = hash_fetched(&fetched);

    if fresh_hash == record.source_hash {
        store
        .touch_alignment_checked(section, chapter)
        .await
        .map_err(store_err(section, chapter))?;
        let mut touched = record;
        touched.source_checked_at = now;
        return Ok(touched);
    }

    tracing::info!(section = section.canonical_name(),
        chapter,
        "[alignment] source hash changed since last check, forcing rebuild");

    match store
    .acquire_alignment_revalidation_lock(section, chapter, ALIGNMENT_LOCK_TTL_SECS)
    .await
    .map_err(store_err(section, chapter))?
    {
        AlignmentLockOutcome::Acquired => build_and_write(store, provider, section, chapter, record.created_at, Some(fetched)).await,
        AlignmentLockOutcome::AlreadyReady(fresh) => Ok(*fresh),
        AlignmentLockOutcome::Contended => poll_until_ready(store, section, chapter).await,
    }
}

async fn acquire_and_build(store: &Arc<dyn Store>,
    provider: &Arc<dyn TextProvider>,
    section: Section,
    chapter: u32) -> std::result::Result<AlignmentRecord, AlignmentError> {
    match store
    .acquire_alignment_lock(section, chapter, ALIGNMENT_LOCK_TTL_SECS)
    .await
    .map_err(store_err(section, chapter))?
    {
        AlignmentLockOutcome::Acquired => build_and_write(store, provider, section, chapter, now_ts(), None).await,
        AlignmentLockOutcome::AlreadyReady(record) => Ok(*record),
        AlignmentLockOutcome::Contended => poll_until_ready(store, section, chapter).await,
    }
}

async fn poll_until_ready(store: &Arc<dyn Store>,
    section: Section,
    chapter: u32) -> std::result::Result<AlignmentRecord, AlignmentError> {
    let deadline = tokio::time::Instant::now() + LOCK_POLL_TOTAL;
    loop {
        if let Some(record) = store
        .get_alignment(section, chapter)
        .await
        .map_err(store_err(section, chapter))?
        {
            if record.status == AlignmentStatus::Ready {
                return Ok(record);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AlignmentError::LockTimeout {
                    section: section.canonical_name().to_string(),
                    chapter,
            });
        }
        tokio::time::sleep(LOCK_POLL_INTERVAL).await;
    }
}

async fn build_and_write(store: &Arc<dyn Store>,
    provider: &Arc<dyn TextProvider>,
    section: Section,
    chapter: u32,
    created_at: i64,
    prefetched: Option<HashMap<CorpusId, Vec<Fragment>>>) -> std::result::Result<AlignmentRecord, AlignmentError> {
    match build_record(provider, section, chapter, created_at, prefetched).await {
        Ok(record) => {
            store
            .write_alignment_ready(record.clone())
            .await
            .map_err(store_err(section, chapter))?;
            Ok(record)
        }
        Err(err) => {
            let _ = store.write_alignment_failed(section, chapter, &err.to_string()).await;
            Err(err)
        }
    }
}

async fn fetch_corpus_fragments(provider: &Arc<dyn TextProvider>,
    section: Section,
    chapter: u32) -> std::result::Result<HashMap<CorpusId, Vec<Fragment>>, AlignmentError> {
    let mut out = HashMap::new();
    for corpus in ALIGNMENT_CORPORA {
        let reference = build_ref(corpus, section, &chapter.to_string(), None).map_err(|e| build_err(section, chapter, &e))?;
        let (_, fragments) = fetch_fragments(provider.as_ref(), &reference)
        .await
        .map_err(|e| build_err(section, chapter, &e))?;
        out.insert(corpus, fragments);
    }
    Ok(out)
}

fn hash_fetched(fetched: &HashMap<CorpusId, Vec<Fragment>>) -> std::collections::BTreeMap<String, String> {
    fetched
    .iter()
    .map(|(corpus, fragments)| {
            let concatenated = fragments.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join(" ");
            (corpus.slug().to_string(), content_hash(&concatenated))
    })
    .collect()
}

/// Recovers a fragment's paragraph number: `path[0] + 1` when a path is
/// present, else a regex on the trailing `:<chapter>:<paragraph>[:<sub>]`
/// of the reference string. Deliberately kept to this one call site
/// rather than scattered across callers.
fn fragment_paragraph(fragment: &Fragment) -> Option<u32> {
    static TRAILING_LOCATION_RE: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r":(\d+):(\d+)(?::\d+)?$").expect("valid regex"));

    fragment.path_paragraph().or_else(|| {
            TRAILING_LOCATION_RE
            .captures(fragment.reference.as_str())
            .and_then(|caps| caps.get(2))
            .and_then(|m| m.as_str().parse().ok())
    })
}

fn partition_by_paragraph(fragments: &[Fragment]) -> std::collections::BTreeMap<u32, String> {
    let mut map = std::collections::BTreeMap::<u32, String>::new();
    for fragment in fragments {
        if let Some(paragraph) = fragment_paragraph(fragment) {
            let entry = map.entry(paragraph).or_default();
            if !entry.is_empty() {
                entry.push(' ');
            }
            entry.push_str(&fragment.text);
        }
    }
    map
}

/// Builds a similarity index over one secondary corpus's candidates.
///
/// Candidates are the corpus's fragments split under the adaptive
/// alignment chunk profile, not the raw fragments: a fragment
/// can span an entire chapter, and indexing it whole would dilute the
/// bigram-overlap signal against a single-paragraph query. The profile
/// scales with how many upstream fragments the chapter has, and the
/// candidate count is capped per 's chunk cap.
fn build_index(fragments: &[Fragment], corpus: CorpusId) -> SimilarityIndex {
    let profile = ChunkProfile::alignment_for_fragment_count(fragments.len());
    let (chunks, _) = chunk_fragments(fragments, corpus, profile, Some(ALIGNMENT_CHUNK_CAP));
    let candidates = chunks
    .into_iter()
    .map(|c| Candidate {
            reference: c.reference.unwrap_or_else(|| FragmentRef::from(c.id.clone())),
            profile: TextProfile::from_text(&c.text),
    })
    .collect();
    SimilarityIndex::new(candidates)
}

fn select_alignment(linked: Vec<FragmentRef>, index: &SimilarityIndex, query_text: &str) -> ParagraphAlignment {
    if !linked.is_empty() {
        return ParagraphAlignment {
            refs: linked,
            mode: AlignmentMode::LinkedPassages,
            score: 1.0,
        };
    }

    let (refs, score) = index.select_scored(query_text);
    if refs.is_empty() {
        ParagraphAlignment::empty()
    } else {
        ParagraphAlignment {
            refs,
            mode: AlignmentMode::FallbackSimilarity,
            score,
        }
    }
}

async fn build_record(provider: &Arc<dyn TextProvider>,
    section: Section,
    chapter: u32,
    created_at: i64,
    prefetched: Option<HashMap<CorpusId, Vec<Fragment>>>) -> std::result::Result<AlignmentRecord, AlignmentError> {
    let fetched = match prefetched {
        Some(f) => f,
        None => fetch_corpus_fragments(provider, section, chapter).await?,
    };

    let source_hash = hash_fetched(&fetched);

    let empty: Vec<Fragment> = Vec::new();
    let primary_fragments = fetched.get(&CorpusId::Primary).unwrap_or(&empty);
    let predecessor_fragments = fetched.get(&CorpusId::PredecessorCode).unwrap_or(&empty);
    let compendium_fragments = fetched.get(&CorpusId::SourceCompendium).unwrap_or(&empty);

    let paragraph_text = partition_by_paragraph(primary_fragments);
    let predecessor_index = build_index(predecessor_fragments, CorpusId::PredecessorCode);
    let compendium_index = build_index(compendium_fragments, CorpusId::SourceCompendium);

    let predecessor_prefix = CorpusId::PredecessorCode.meta().provider_prefix;
    let compendium_prefix = CorpusId::SourceCompendium.meta().provider_prefix;

    let mut paragraph_map = std::collections::BTreeMap::new();
    for (&paragraph, text) in &paragraph_text {
        let primary_paragraph_ref = build_ref(CorpusId::Primary, section, &chapter.to_string(), Some(&paragraph.to_string()))
        .map_err(|e| build_err(section, chapter, &e))?;

        let (linked_predecessor, linked_compendium) =
        fetch_linked_refs(provider.as_ref(), &primary_paragraph_ref, predecessor_prefix, compendium_prefix)
        .await
        .unwrap_or_default();

        let predecessor_alignment = select_alignment(linked_predecessor, &predecessor_index, text);
        let compendium_alignment = select_alignment(linked_compendium, &compendium_index, text);

        let mut per_corpus = std::collections::BTreeMap::new();
        per_corpus.insert(CorpusId::PredecessorCode.slug().to_string(), predecessor_alignment);
        per_corpus.insert(CorpusId::SourceCompendium.slug().to_string(), compendium_alignment);
        paragraph_map.insert(paragraph.to_string(), per_corpus);
    }

    let now = now_ts();
    Ok(AlignmentRecord {
            version: ALIGNMENT_SCHEMA_VERSION,
            section,
            chapter,
            status: AlignmentStatus::Ready,
            lock_expires_at: None,
            source_hash,
            paragraph_map,
            source_checked_at: now,
            created_at,
            updated_at: now,
            error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::FixtureTextProvider;
    use crate::store::SqliteStore;

    fn provider_with_chapter(section_name: &str, chapter: u32) -> FixtureTextProvider {
        FixtureTextProvider::new()
        .with_text(&format!("Shulchan Arukh, {section_name} {chapter}"),
            &format!("Shulchan Arukh, {section_name} {chapter}"),
            serde_json::json!(["פסקה ראשונה עם תוכן", "פסקה שנייה עם תוכן אחר"]))
        .with_text(&format!("Tur, {section_name} {chapter}"),
            &format!("Tur, {section_name} {chapter}"),
            serde_json::json!(["טקסט תור המקביל לפסקה ראשונה"]))
        .with_text(&format!("Beit Yosef, {section_name} {chapter}"),
            &format!("Beit Yosef, {section_name} {chapter}"),
            serde_json::json!(["טקסט בית יוסף המקביל לפסקה ראשונה"]))
        .with_links(&format!("Shulchan Arukh, {section_name} {chapter}:1"),
            vec![serde_json::json!({"refs": [format!("Tur, {section_name} {chapter}")]})])
    }

    #[tokio::test]
    async fn builds_ready_record_with_linked_passage_for_first_paragraph() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let provider: Arc<dyn TextProvider> = Arc::new(provider_with_chapter("Orach Chayim", 24));
        let engine = AlignmentEngine::new(store, provider);

        let record = engine.get_or_build(Section::OrachChayim, 24).await.unwrap();
        assert_eq!(record.status, AlignmentStatus::Ready);
        let first = &record.paragraph_map["1"];
        assert_eq!(first["predecessor"].mode, AlignmentMode::LinkedPassages);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_build_and_agree() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let provider: Arc<dyn TextProvider> = Arc::new(provider_with_chapter("Orach Chayim", 24));
        let engine = Arc::new(AlignmentEngine::new(store, provider));

        let a = Arc::clone(&engine);
        let b = Arc::clone(&engine);
        let (ra, rb) = tokio::join!(tokio::spawn(async move { a.get_or_build(Section::OrachChayim, 24).await }),
            tokio::spawn(async move { b.get_or_build(Section::OrachChayim, 24).await }));
        let ra = ra.unwrap().unwrap();
        let rb = rb.unwrap().unwrap();
        assert_eq!(ra.paragraph_map, rb.paragraph_map);
    }

    #[tokio::test]
    async fn stale_source_hash_forces_rebuild_with_newer_timestamp() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let provider = Arc::new(provider_with_chapter("Orach Chayim", 24));

        let store_dyn: Arc<dyn Store> = store.clone();
        let provider_dyn: Arc<dyn TextProvider> = provider.clone();
        let engine = AlignmentEngine::new(store_dyn, provider_dyn);
        let first = engine.get_or_build(Section::OrachChayim, 24).await.unwrap();

        let mut stale = first.clone();
        stale.source_checked_at = now_ts() - (13 * 60 * 60);
        store.write_alignment_ready(stale).await.unwrap();

        provider.set_text("Tur, Orach Chayim 24",
            "Tur, Orach Chayim 24",
            serde_json::json!(["טקסט תור שהשתנה לגמרי מאז הבדיקה האחרונה"]));

        let store_dyn: Arc<dyn Store> = store;
        let provider_dyn: Arc<dyn TextProvider> = provider;
        let engine = AlignmentEngine::new(store_dyn, provider_dyn);
        let rebuilt = engine.get_or_build(Section::OrachChayim, 24).await.unwrap();
        assert!(rebuilt.updated_at >= first.updated_at);
        assert_ne!(rebuilt.source_hash["predecessor"], first.source_hash["predecessor"]);
    }
}
