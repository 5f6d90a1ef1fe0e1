//! `SQLite`-backed [`Store`] implementation.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tokio::sync::Mutex;

use crate::domain::records::{
    AlignmentRecord, AlignmentStatus, CanonicalGuideRecord, CanonicalStatus, ChunkRecord,
    ExplanationRecord, ALIGNMENT_SCHEMA_VERSION, CANONICAL_SCHEMA_VERSION,
};
use crate::domain::{CorpusId, Section};
use crate::error::{Result, StoreError};
use crate::progress::ProgressSink;
use crate::store::schema::{CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL};
use crate::store::traits::{
    AlignmentLockOutcome, CanonicalLockOutcome, CanonicalRequestMeta, ExplanationKey, Store,
};
use crate::util::now_ts;

/// `SQLite`-based implementation of [`Store`].
///
/// Wraps the connection in a `tokio::sync::Mutex` so the trait's async
/// methods can be called concurrently from multiple per-corpus tasks;
/// each call still executes its `SQLite` statements synchronously while
/// holding the lock, a single-connection design.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens or creates a database at `path`, creating the schema if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        let _: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates an in-memory database, useful for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// The database file path (`None` for in-memory stores).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.blocking_lock();
        conn.execute_batch(SCHEMA_SQL)?;
        let version: Option<String> = conn
        .query_row(GET_VERSION_SQL, [], |row| row.get(0))
        .optional()?;
        if version.is_none() {
            conn.execute(SET_VERSION_SQL, params![CURRENT_SCHEMA_VERSION.to_string()])?;
        }
        Ok(())
    }

    /// Whether schema initialization has already run (always true
    /// after [`Self::open()`]/[`Self::in_memory()`], exposed for CLI
    /// `status` reporting).
    ///
    /// # Errors
    ///
    /// Returns an error if the check query fails.
    pub fn is_initialized(&self) -> Result<bool> {
        let conn = self.conn.blocking_lock();
        let version: Option<String> = conn
        .query_row(GET_VERSION_SQL, [], |row| row.get(0))
        .optional()?;
        Ok(version.is_some())
    }

    /// Collects row counts across every collection, for the CLI
    /// `status` command.
    ///
    /// # Errors
    ///
    /// Returns an error if any count query fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.blocking_lock();
        let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };
        let schema_version: Option<String> = conn
        .query_row(GET_VERSION_SQL, [], |row| row.get(0))
        .optional()?;
        let db_size = self.path.as_ref().and_then(|p| std::fs::metadata(p).ok()).map(|m| m.len());
        Ok(StoreStats {
                alignment_count: count("SELECT COUNT(*) FROM alignments")? as u64,
                explanation_count: count("SELECT COUNT(*) FROM explanations")? as u64,
                canonical_guide_count: count("SELECT COUNT(*) FROM canonical_guides")? as u64,
                canonical_ready_count: count("SELECT COUNT(*) FROM canonical_guides WHERE status = 'ready'")? as u64,
                schema_version,
                db_path: self.path.as_ref().map(|p| p.display().to_string()),
                db_size,
        })
    }
}

/// Row counts across every collection, surfaced by the CLI `status`
/// command.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Number of alignment records (building, ready, or failed).
    pub alignment_count: u64,
    /// Number of per-fragment explanation records at the structured key.
    pub explanation_count: u64,
    /// Number of canonical guide records (processing, ready, or failed).
    pub canonical_guide_count: u64,
    /// Number of canonical guide records with `status = ready`.
    pub canonical_ready_count: u64,
    /// The stored schema version marker, if the schema has been
    /// initialized.
    pub schema_version: Option<String>,
    /// The database file path, `None` for an in-memory store.
    pub db_path: Option<String>,
    /// The database file size in bytes, `None` for an in-memory store.
    pub db_size: Option<u64>,
}

fn section_from_slug(slug: &str) -> Option<Section> {
    Section::ALL.into_iter().find(|s| s.slug() == slug)
}

fn parse_alignment_status(s: &str) -> Result<AlignmentStatus> {
    match s {
        "building" => Ok(AlignmentStatus::Building),
        "ready" => Ok(AlignmentStatus::Ready),
        "failed" => Ok(AlignmentStatus::Failed),
        other => Err(StoreError::InvalidRecord {
                collection: "alignments".to_string(),
                id: String::new(),
                reason: format!("unknown status {other}"),
            }
            .into()),
    }
}

fn parse_canonical_status(s: &str) -> Result<CanonicalStatus> {
    match s {
        "processing" => Ok(CanonicalStatus::Processing),
        "ready" => Ok(CanonicalStatus::Ready),
        "failed" => Ok(CanonicalStatus::Failed),
        other => Err(StoreError::InvalidRecord {
                collection: "canonical_guides".to_string(),
                id: String::new(),
                reason: format!("unknown status {other}"),
            }
            .into()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
    .map_err(StoreError::from)
    .map_err(Into::into)
}

/// Row shape for `alignments`, matched positionally against
/// [`ALIGNMENT_SELECT`].
const ALIGNMENT_SELECT: &str = "SELECT version, section, chapter, status, lock_expires_at, \
 source_hash, paragraph_map, source_checked_at, created_at, updated_at, error \
 FROM alignments WHERE doc_id = ?1";

fn row_to_alignment(row: &rusqlite::Row<'_>) -> rusqlite::Result<(u32, AlignmentRecord)> {
    let version: u32 = row.get(0)?;
    let section_slug: String = row.get(1)?;
    let section = section_from_slug(&section_slug).unwrap_or(Section::OrachChayim);
    let source_hash_json: String = row.get(5)?;
    let paragraph_map_json: String = row.get(6)?;

    let source_hash = serde_json::from_str(&source_hash_json).unwrap_or_default();
    let paragraph_map = serde_json::from_str(&paragraph_map_json).unwrap_or_default();

    let status_str: String = row.get(3)?;
    let status = parse_alignment_status(&status_str).unwrap_or(AlignmentStatus::Failed);

    Ok((version,
            AlignmentRecord {
                version,
                section,
                chapter: row.get(2)?,
                status,
                lock_expires_at: row.get(4)?,
                source_hash,
                paragraph_map,
                source_checked_at: row.get(7)?,
                created_at: row.get(8)?,
                updated_at: row.get(9)?,
                error: row.get(10)?,
    }))
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_alignment(&self,
        section: Section,
        chapter: u32) -> Result<Option<AlignmentRecord>> {
        let doc_id = AlignmentRecord::doc_id(section, chapter);
        let conn = self.conn.lock().await;
        let row: Option<(u32, AlignmentRecord)> = conn
        .query_row(ALIGNMENT_SELECT, params![doc_id], row_to_alignment)
        .optional()?;
        Ok(row.and_then(|(version, record)| {
                    (version == ALIGNMENT_SCHEMA_VERSION).then_some(record)
        }))
    }

    async fn acquire_alignment_lock(&self,
        section: Section,
        chapter: u32,
        ttl_secs: i64) -> Result<AlignmentLockOutcome> {
        let doc_id = AlignmentRecord::doc_id(section, chapter);
        let now = now_ts();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(u32, AlignmentRecord)> = tx
        .query_row(ALIGNMENT_SELECT, params![doc_id], row_to_alignment)
        .optional()?;

        let outcome = match existing {
            None => {
                tx.execute("INSERT INTO alignments (doc_id, version, section, chapter, status, \
 lock_expires_at, source_hash, paragraph_map, source_checked_at, \
 created_at, updated_at, error) \
 VALUES (?1, ?2, ?3, ?4, 'building', ?5, '{}', '{}', ?6, ?6, ?6, NULL)",
                    params![
                        doc_id,
                        ALIGNMENT_SCHEMA_VERSION,
                        section.slug(),
                        chapter,
                        now + ttl_secs,
                        now
                ])?;
                AlignmentLockOutcome::Acquired
            }
            Some((version, record))
            if version == ALIGNMENT_SCHEMA_VERSION
            && record.status == AlignmentStatus::Ready =>
            {
                AlignmentLockOutcome::AlreadyReady(Box::new(record))
            }
            Some((_, record))
            if record.status == AlignmentStatus::Building
            && record.lock_expires_at.is_some_and(|exp| exp > now) =>
            {
                AlignmentLockOutcome::Contended
            }
            Some(_) => {
                tx.execute("UPDATE alignments SET status = 'building', lock_expires_at = ?2, \
 updated_at = ?3 WHERE doc_id = ?1",
                    params![doc_id, now + ttl_secs, now])?;
                AlignmentLockOutcome::Acquired
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    async fn acquire_alignment_revalidation_lock(&self,
        section: Section,
        chapter: u32,
        ttl_secs: i64) -> Result<AlignmentLockOutcome> {
        let doc_id = AlignmentRecord::doc_id(section, chapter);
        let now = now_ts();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(u32, AlignmentRecord)> = tx
        .query_row(ALIGNMENT_SELECT, params![doc_id], row_to_alignment)
        .optional()?;

        let outcome = match existing {
            None => {
                tx.execute("INSERT INTO alignments (doc_id, version, section, chapter, status, \
 lock_expires_at, source_hash, paragraph_map, source_checked_at, \
 created_at, updated_at, error) \
 VALUES (?1, ?2, ?3, ?4, 'building', ?5, '{}', '{}', ?6, ?6, ?6, NULL)",
                    params![
                        doc_id,
                        ALIGNMENT_SCHEMA_VERSION,
                        section.slug(),
                        chapter,
                        now + ttl_secs,
                        now
                ])?;
                AlignmentLockOutcome::Acquired
            }
            Some((_, record))
            if record.status == AlignmentStatus::Building
            && record.lock_expires_at.is_some_and(|exp| exp > now) =>
            {
                AlignmentLockOutcome::Contended
            }
            Some(_) => {
                tx.execute("UPDATE alignments SET status = 'building', lock_expires_at = ?2, \
 updated_at = ?3 WHERE doc_id = ?1",
                    params![doc_id, now + ttl_secs, now])?;
                AlignmentLockOutcome::Acquired
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    async fn write_alignment_ready(&self, record: AlignmentRecord) -> Result<()> {
        let doc_id = AlignmentRecord::doc_id(record.section, record.chapter);
        let source_hash = to_json(&record.source_hash)?;
        let paragraph_map = to_json(&record.paragraph_map)?;
        let conn = self.conn.lock().await;
        conn.execute("INSERT INTO alignments (doc_id, version, section, chapter, status, \
 lock_expires_at, source_hash, paragraph_map, source_checked_at, \
 created_at, updated_at, error) \
 VALUES (?1, ?2, ?3, ?4, 'ready', NULL, ?5, ?6, ?7, ?8, ?9, NULL) \
 ON CONFLICT(doc_id) DO UPDATE SET \
 version = excluded.version, status = 'ready', lock_expires_at = NULL, \
 source_hash = excluded.source_hash, paragraph_map = excluded.paragraph_map, \
 source_checked_at = excluded.source_checked_at, updated_at = excluded.updated_at, \
 error = NULL",
            params![
                doc_id,
                record.version,
                record.section.slug(),
                record.chapter,
                source_hash,
                paragraph_map,
                record.source_checked_at,
                record.created_at,
                record.updated_at,
        ])?;
        Ok(())
    }

    async fn write_alignment_failed(&self,
        section: Section,
        chapter: u32,
        error: &str) -> Result<()> {
        let doc_id = AlignmentRecord::doc_id(section, chapter);
        let now = now_ts();
        let conn = self.conn.lock().await;
        conn.execute("UPDATE alignments SET status = 'failed', error = ?2, lock_expires_at = NULL, \
 updated_at = ?3 WHERE doc_id = ?1",
            params![doc_id, error, now])?;
        Ok(())
    }

    async fn touch_alignment_checked(&self, section: Section, chapter: u32) -> Result<()> {
        let doc_id = AlignmentRecord::doc_id(section, chapter);
        let now = now_ts();
        let conn = self.conn.lock().await;
        conn.execute("UPDATE alignments SET source_checked_at = ?2, updated_at = ?2 WHERE doc_id = ?1",
            params![doc_id, now])?;
        Ok(())
    }

    async fn get_explanation(&self, key: &ExplanationKey) -> Result<Option<ExplanationRecord>> {
        let conn = self.conn.lock().await;
        row_to_explanation(&conn, "explanations", "doc_id", &key.doc_id())
    }

    async fn get_explanation_legacy(&self,
        legacy_key: &str) -> Result<Option<ExplanationRecord>> {
        let conn = self.conn.lock().await;
        row_to_explanation(&conn, "explanations_legacy", "legacy_key", legacy_key)
    }

    async fn write_explanation(&self,
        key: &ExplanationKey,
        record: ExplanationRecord) -> Result<()> {
        let doc_id = key.doc_id();
        let conn = self.conn.lock().await;
        conn.execute("INSERT INTO explanations (doc_id, section, chapter, paragraph, corpus, ordinal, \
 raw_text, explanation_text, content_hash, model_name, prompt_version, validated, \
 created_at, updated_at) \
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14) \
 ON CONFLICT(doc_id) DO UPDATE SET \
 raw_text = excluded.raw_text, explanation_text = excluded.explanation_text, \
 content_hash = excluded.content_hash, model_name = excluded.model_name, \
 prompt_version = excluded.prompt_version, validated = excluded.validated, \
 updated_at = excluded.updated_at",
            params![
                doc_id,
                key.section.slug(),
                key.chapter,
                key.paragraph,
                key.corpus.slug(),
                key.ordinal as i64,
                record.raw_text,
                record.explanation_text,
                record.content_hash,
                record.model_name,
                record.prompt_version,
                i64::from(record.validated),
                record.created_at,
                record.updated_at,
        ])?;
        Ok(())
    }

    async fn write_explanation_legacy(&self,
        legacy_key: &str,
        record: ExplanationRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("INSERT INTO explanations_legacy (legacy_key, raw_text, explanation_text, \
 content_hash, model_name, prompt_version, validated, created_at, updated_at) \
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
 ON CONFLICT(legacy_key) DO UPDATE SET \
 raw_text = excluded.raw_text, explanation_text = excluded.explanation_text, \
 content_hash = excluded.content_hash, model_name = excluded.model_name, \
 prompt_version = excluded.prompt_version, validated = excluded.validated, \
 updated_at = excluded.updated_at",
            params![
                legacy_key,
                record.raw_text,
                record.explanation_text,
                record.content_hash,
                record.model_name,
                record.prompt_version,
                i64::from(record.validated),
                record.created_at,
                record.updated_at,
        ])?;
        Ok(())
    }

    async fn get_canonical(&self, fingerprint: &str) -> Result<Option<CanonicalGuideRecord>> {
        let conn = self.conn.lock().await;
        row_to_canonical(&conn, fingerprint)
    }

    async fn acquire_canonical_lock(&self,
        fingerprint: &str,
        request: CanonicalRequestMeta,
        stale_secs: i64) -> Result<CanonicalLockOutcome> {
        let now = now_ts();
        let corpora = to_json(&request.corpora)?;
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(String, i64)> = tx
        .query_row("SELECT status, updated_at FROM canonical_guides WHERE fingerprint = ?1",
            params![fingerprint],
            |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;

        let outcome = match existing {
            None => {
                tx.execute("INSERT INTO canonical_guides (fingerprint, version, status, section, \
 chapter, paragraph, corpora, summary_text, summary_model, validated, \
 chunk_count, created_at, updated_at) \
 VALUES (?1, ?2, 'processing', ?3, ?4, ?5, ?6, '', '', 0, 0, ?7, ?7)",
                    params![
                        fingerprint,
                        CANONICAL_SCHEMA_VERSION,
                        request.section.slug(),
                        request.chapter,
                        request.paragraph,
                        corpora,
                        now,
                ])?;
                CanonicalLockOutcome::Acquired
            }
            Some((status, _)) if status == "ready" => {
                let record = row_to_canonical(&tx, fingerprint)?.ok_or_else(|| {
                        StoreError::InvalidRecord {
                            collection: "canonical_guides".to_string(),
                            id: fingerprint.to_string(),
                            reason: "ready row vanished mid-transaction".to_string(),
                        }
                })?;
                CanonicalLockOutcome::AlreadyReady(Box::new(record))
            }
            Some((status, updated_at))
            if status == "processing" && now - updated_at < stale_secs =>
            {
                CanonicalLockOutcome::Contended { updated_at }
            }
            Some(_) => {
                tx.execute("UPDATE canonical_guides SET status = 'processing', updated_at = ?2 \
 WHERE fingerprint = ?1",
                    params![fingerprint, now])?;
                CanonicalLockOutcome::Acquired
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    async fn write_canonical_ready(&self,
        fingerprint: &str,
        record: CanonicalGuideRecord,
        chunks: Vec<ChunkRecord>) -> Result<()> {
        let corpora = to_json(&record.corpora)?;
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("DELETE FROM canonical_chunks WHERE fingerprint = ?1",
            params![fingerprint])?;
        for (ordinal, chunk) in chunks.iter().enumerate() {
            tx.execute("INSERT INTO canonical_chunks (fingerprint, corpus, ordinal, chunk_id, \
 chunk_text, explanation_text, model_name, validated) \
 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    fingerprint,
                    chunk.corpus.slug(),
                    ordinal as i64,
                    chunk.chunk_id,
                    chunk.chunk_text,
                    chunk.explanation_text,
                    chunk.model_name,
                    i64::from(chunk.validated),
            ])?;
        }

        tx.execute("INSERT INTO canonical_guides (fingerprint, version, status, section, chapter, \
 paragraph, corpora, summary_text, summary_model, validated, chunk_count, \
 created_at, updated_at) \
 VALUES (?1, ?2, 'ready', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
 ON CONFLICT(fingerprint) DO UPDATE SET \
 version = excluded.version, status = 'ready', corpora = excluded.corpora, \
 summary_text = excluded.summary_text, summary_model = excluded.summary_model, \
 validated = excluded.validated, chunk_count = excluded.chunk_count, \
 updated_at = excluded.updated_at",
            params![
                fingerprint,
                record.version,
                record.section.slug(),
                record.chapter,
                record.paragraph,
                corpora,
                record.summary_text,
                record.summary_model,
                i64::from(record.validated),
                record.chunk_count as i64,
                record.created_at,
                record.updated_at,
        ])?;

        tx.commit()?;
        Ok(())
    }

    async fn write_canonical_failed(&self, fingerprint: &str, _reason: &str) -> Result<()> {
        let now = now_ts();
        let conn = self.conn.lock().await;
        conn.execute("UPDATE canonical_guides SET status = 'failed', updated_at = ?2 WHERE fingerprint = ?1",
            params![fingerprint, now])?;
        Ok(())
    }

    async fn get_canonical_chunks(&self, fingerprint: &str) -> Result<Vec<ChunkRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT corpus, chunk_id, chunk_text, explanation_text, model_name, validated \
 FROM canonical_chunks WHERE fingerprint = ?1 ORDER BY corpus, ordinal")?;
        let rows = stmt.query_map(params![fingerprint], |row| {
                let corpus_slug: String = row.get(0)?;
                Ok(ChunkRecord {
                        corpus: CorpusId::from_slug(&corpus_slug).unwrap_or(CorpusId::Primary),
                        ordinal: 0,
                        chunk_id: row.get(1)?,
                        chunk_text: row.get(2)?,
                        explanation_text: row.get(3)?,
                        model_name: row.get(4)?,
                        validated: row.get::<_, i64>(5)? != 0,
                })
        })?;
        let mut out = Vec::new();
        for (i, row) in rows.enumerate() {
            let mut record = row?;
            record.ordinal = i;
            out.push(record);
        }
        Ok(out)
    }
}

fn row_to_explanation(conn: &Connection,
    table: &str,
    key_column: &str,
    key_value: &str) -> Result<Option<ExplanationRecord>> {
    let sql = format!("SELECT raw_text, explanation_text, content_hash, model_name, prompt_version, \
 validated, created_at, updated_at FROM {table} WHERE {key_column} = ?1");
    conn.query_row(&sql, params![key_value], |row| {
            Ok(ExplanationRecord {
                    raw_text: row.get(0)?,
                    explanation_text: row.get(1)?,
                    content_hash: row.get(2)?,
                    model_name: row.get(3)?,
                    prompt_version: row.get(4)?,
                    validated: row.get::<_, i64>(5)? != 0,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
            })
    })
    .optional()
    .map_err(Into::into)
}

fn row_to_canonical(conn: &Connection, fingerprint: &str) -> Result<Option<CanonicalGuideRecord>> {
    conn.query_row("SELECT version, status, section, chapter, paragraph, corpora, summary_text, \
 summary_model, validated, chunk_count, created_at, updated_at \
 FROM canonical_guides WHERE fingerprint = ?1",
        params![fingerprint],
        |row| {
            let status_str: String = row.get(1)?;
            let section_slug: String = row.get(2)?;
            let corpora_json: String = row.get(5)?;
            Ok(CanonicalGuideRecord {
                    version: row.get(0)?,
                    status: parse_canonical_status(&status_str).unwrap_or(CanonicalStatus::Failed),
                    section: section_from_slug(&section_slug).unwrap_or(Section::OrachChayim),
                    chapter: row.get(3)?,
                    paragraph: row.get(4)?,
                    corpora: serde_json::from_str(&corpora_json).unwrap_or_default(),
                    summary_text: row.get(6)?,
                    summary_model: row.get(7)?,
                    validated: row.get::<_, i64>(8)? != 0,
                    chunk_count: row.get::<_, i64>(9)? as usize,
                    created_at: row.get(10)?,
                    updated_at: row.get(11)?,
            })
    })
    .optional()
    .map_err(Into::into)
}

#[async_trait]
impl ProgressSink for SqliteStore {
    async fn init(&self, fingerprint: &str, total: usize) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("INSERT INTO progress (fingerprint, done, total) VALUES (?1, 0, ?2) \
 ON CONFLICT(fingerprint) DO UPDATE SET done = 0, total = excluded.total",
            params![fingerprint, total as i64])?;
        Ok(())
    }

    async fn increment(&self, fingerprint: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("UPDATE progress SET done = done + 1 WHERE fingerprint = ?1",
            params![fingerprint])?;
        Ok(())
    }

    async fn read(&self, fingerprint: &str) -> Result<Option<(usize, usize)>> {
        let conn = self.conn.lock().await;
        let row: Option<(i64, i64)> = conn
        .query_row("SELECT done, total FROM progress WHERE fingerprint = ?1",
            params![fingerprint],
            |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;
        Ok(row.map(|(done, total)| (done as usize, total as usize)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::{AlignmentMode, ParagraphAlignment};
    use std::collections::BTreeMap;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    #[tokio::test]
    async fn alignment_lock_acquires_when_absent() {
        let store = store();
        let outcome = store
        .acquire_alignment_lock(Section::OrachChayim, 24, 300)
        .await
        .unwrap();
        assert!(matches!(outcome, AlignmentLockOutcome::Acquired));
    }

    #[tokio::test]
    async fn alignment_lock_is_contended_while_held() {
        let store = store();
        store
        .acquire_alignment_lock(Section::OrachChayim, 24, 300)
        .await
        .unwrap();
        let second = store
        .acquire_alignment_lock(Section::OrachChayim, 24, 300)
        .await
        .unwrap();
        assert!(matches!(second, AlignmentLockOutcome::Contended));
    }

    #[tokio::test]
    async fn alignment_lock_reacquires_after_expiry() {
        let store = store();
        store
        .acquire_alignment_lock(Section::OrachChayim, 24, -1)
        .await
        .unwrap();
        let second = store
        .acquire_alignment_lock(Section::OrachChayim, 24, 300)
        .await
        .unwrap();
        assert!(matches!(second, AlignmentLockOutcome::Acquired));
    }

    #[tokio::test]
    async fn write_then_read_alignment_round_trips() {
        let store = store();
        let mut paragraph_map = BTreeMap::new();
        let mut per_corpus = BTreeMap::new();
        per_corpus.insert("predecessor".to_string(),
            ParagraphAlignment {
                refs: vec![],
                mode: AlignmentMode::LinkedPassages,
                score: 1.0,
        });
        paragraph_map.insert("1".to_string(), per_corpus);

        let record = AlignmentRecord {
            version: ALIGNMENT_SCHEMA_VERSION,
            section: Section::OrachChayim,
            chapter: 24,
            status: AlignmentStatus::Ready,
            lock_expires_at: None,
            source_hash: BTreeMap::new(),
            paragraph_map,
            source_checked_at: now_ts(),
            created_at: now_ts(),
            updated_at: now_ts(),
            error: None,
        };
        store.write_alignment_ready(record).await.unwrap();

        let read = store
        .get_alignment(Section::OrachChayim, 24)
        .await
        .unwrap()
        .unwrap();
        assert_eq!(read.status, AlignmentStatus::Ready);
        assert_eq!(read.paragraph_map["1"]["predecessor"].mode,
            AlignmentMode::LinkedPassages);
    }

    #[tokio::test]
    async fn canonical_lock_ready_short_circuits() {
        let store = store();
        store
        .acquire_canonical_lock("fp1",
            CanonicalRequestMeta {
                section: Section::OrachChayim,
                chapter: 24,
                paragraph: Some(1),
                corpora: vec!["primary".to_string()],
            },
            600)
        .await
        .unwrap();

        let record = CanonicalGuideRecord {
            version: CANONICAL_SCHEMA_VERSION,
            status: CanonicalStatus::Ready,
            section: Section::OrachChayim,
            chapter: 24,
            paragraph: Some(1),
            corpora: vec!["primary".to_string()],
            summary_text: "summary".to_string(),
            summary_model: "m".to_string(),
            validated: true,
            chunk_count: 0,
            created_at: now_ts(),
            updated_at: now_ts(),
        };
        store
        .write_canonical_ready("fp1", record, vec![])
        .await
        .unwrap();

        let outcome = store
        .acquire_canonical_lock("fp1",
            CanonicalRequestMeta {
                section: Section::OrachChayim,
                chapter: 24,
                paragraph: Some(1),
                corpora: vec!["primary".to_string()],
            },
            600)
        .await
        .unwrap();
        assert!(matches!(outcome, CanonicalLockOutcome::AlreadyReady(_)));
    }

    #[tokio::test]
    async fn canonical_lock_is_contended_while_fresh() {
        let store = store();
        let meta = CanonicalRequestMeta {
            section: Section::OrachChayim,
            chapter: 24,
            paragraph: Some(1),
            corpora: vec!["primary".to_string()],
        };
        store
        .acquire_canonical_lock("fp2", meta.clone(), 600)
        .await
        .unwrap();
        let second = store.acquire_canonical_lock("fp2", meta, 600).await.unwrap();
        assert!(matches!(second, CanonicalLockOutcome::Contended {.. }));
    }

    #[tokio::test]
    async fn progress_counter_increments() {
        let store = store();
        store.init("fp", 10).await.unwrap();
        store.increment("fp").await.unwrap();
        store.increment("fp").await.unwrap();
        assert_eq!(store.read("fp").await.unwrap(), Some((2, 10)));
    }

    #[test]
    fn stats_reports_zero_counts_on_a_fresh_store() {
        let store = store();
        let stats = store.stats().unwrap();
        assert_eq!(stats.alignment_count, 0);
        assert_eq!(stats.canonical_guide_count, 0);
        assert!(stats.schema_version.is_some());
        assert!(stats.db_path.is_none());
    }
}
