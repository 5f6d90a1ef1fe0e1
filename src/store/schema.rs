//! `SQLite` schema for the persistent store: one table per record
//! collection, plus a schema-version marker and a progress-counter
//! table for the client-observable progress surface.

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Full schema DDL, executed idempotently on [`crate::store::SqliteStore::open()`].
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_info (key TEXT PRIMARY KEY,
 value TEXT NOT NULL);

-- /alignments/<section-slug>_<chapter>
CREATE TABLE IF NOT EXISTS alignments (doc_id TEXT PRIMARY KEY,
 version INTEGER NOT NULL,
 section TEXT NOT NULL,
 chapter INTEGER NOT NULL,
 status TEXT NOT NULL,
 lock_expires_at INTEGER,
 source_hash TEXT NOT NULL,
 paragraph_map TEXT NOT NULL,
 source_checked_at INTEGER NOT NULL,
 created_at INTEGER NOT NULL,
 updated_at INTEGER NOT NULL,
 error TEXT);

-- /corpus-archive/<section>/<chapter>/<paragraph>/<corpus>/<ordinal>
CREATE TABLE IF NOT EXISTS explanations (doc_id TEXT PRIMARY KEY,
 section TEXT NOT NULL,
 chapter INTEGER NOT NULL,
 paragraph INTEGER NOT NULL,
 corpus TEXT NOT NULL,
 ordinal INTEGER NOT NULL,
 raw_text TEXT NOT NULL,
 explanation_text TEXT NOT NULL,
 content_hash TEXT NOT NULL,
 model_name TEXT NOT NULL,
 prompt_version TEXT NOT NULL,
 validated INTEGER NOT NULL,
 created_at INTEGER NOT NULL,
 updated_at INTEGER NOT NULL);

-- legacy opaque-hash-keyed cache, read-migrated from only
CREATE TABLE IF NOT EXISTS explanations_legacy (legacy_key TEXT PRIMARY KEY,
 raw_text TEXT NOT NULL,
 explanation_text TEXT NOT NULL,
 content_hash TEXT NOT NULL,
 model_name TEXT NOT NULL,
 prompt_version TEXT NOT NULL,
 validated INTEGER NOT NULL,
 created_at INTEGER NOT NULL,
 updated_at INTEGER NOT NULL);

-- /canonical-guides/<fingerprint>
CREATE TABLE IF NOT EXISTS canonical_guides (fingerprint TEXT PRIMARY KEY,
 version INTEGER NOT NULL,
 status TEXT NOT NULL,
 section TEXT NOT NULL,
 chapter INTEGER NOT NULL,
 paragraph INTEGER,
 corpora TEXT NOT NULL,
 summary_text TEXT NOT NULL,
 summary_model TEXT NOT NULL,
 validated INTEGER NOT NULL,
 chunk_count INTEGER NOT NULL,
 created_at INTEGER NOT NULL,
 updated_at INTEGER NOT NULL);

-- canonical-guides/<fingerprint>/chunks sub-collection
CREATE TABLE IF NOT EXISTS canonical_chunks (fingerprint TEXT NOT NULL,
 corpus TEXT NOT NULL,
 ordinal INTEGER NOT NULL,
 chunk_id TEXT NOT NULL,
 chunk_text TEXT NOT NULL,
 explanation_text TEXT NOT NULL,
 model_name TEXT NOT NULL,
 validated INTEGER NOT NULL,
 PRIMARY KEY (fingerprint, corpus, ordinal));

-- client-observable progress counter
CREATE TABLE IF NOT EXISTS progress (fingerprint TEXT PRIMARY KEY,
 done INTEGER NOT NULL,
 total INTEGER NOT NULL);
";

/// Reads the stored schema version, if any.
pub const GET_VERSION_SQL: &str = "SELECT value FROM schema_info WHERE key = 'schema_version'";

/// Upserts the stored schema version.
pub const SET_VERSION_SQL: &str =
"INSERT INTO schema_info (key, value) VALUES ('schema_version', ?1) \
 ON CONFLICT(key) DO UPDATE SET value = excluded.value";
