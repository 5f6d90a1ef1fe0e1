//! The client-observable progress counter surface.
//!
//! The orchestrator updates an append-only `(done, total)` counter per
//! request fingerprint so an out-of-scope presentation layer can poll
//! it. The core treats the surface as a trait so tests can use an
//! in-memory double instead of the store-backed implementation.

use async_trait::async_trait;

use crate::error::Result;

/// Progress counter surface the orchestrator writes to.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Initializes the counter for a request fingerprint with a known
    /// total and `done = 0`.
    async fn init(&self, fingerprint: &str, total: usize) -> Result<()>;

    /// Advances `done` by one for a request fingerprint.
    async fn increment(&self, fingerprint: &str) -> Result<()>;

    /// Reads the current `(done, total)`, if initialized.
    async fn read(&self, fingerprint: &str) -> Result<Option<(usize, usize)>>;
}

/// A no-op sink for tests and callers that don't need progress
/// observability.
#[derive(Debug, Default)]
pub struct NullProgress;

#[async_trait]
impl ProgressSink for NullProgress {
    async fn init(&self, _fingerprint: &str, _total: usize) -> Result<()> {
        Ok(())
    }

    async fn increment(&self, _fingerprint: &str) -> Result<()> {
        Ok(())
    }

    async fn read(&self, _fingerprint: &str) -> Result<Option<(usize, usize)>> {
        Ok(None)
    }
}
