//! The persistent store.
//!
//! [`SqliteStore`] is the in-process stand-in for an external document
//! database that is otherwise out of scope here: it gives the rest of
//! the system transactions, server timestamps, and scoped collections
//! over one `SQLite` file, using `BEGIN IMMEDIATE` transactions to
//! emulate the conditional-write semantics a production document
//! database would offer natively.

pub mod schema;
pub mod sqlite;
pub mod traits;

pub use schema::{CURRENT_SCHEMA_VERSION, SCHEMA_SQL};
pub use sqlite::{SqliteStore, StoreStats};
pub use traits::{
    AlignmentLockOutcome, CanonicalLockOutcome, CanonicalRequestMeta, ExplanationKey, Store,
};

/// Default database file name.
pub const DEFAULT_DB_NAME: &str = "guide-weaver.db";

/// Default database path relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".guide-weaver/guide-weaver.db";
