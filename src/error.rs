//! Error types for the guide-weaver pipeline.
//!
//! This module provides a comprehensive error hierarchy using `thiserror` for
//! every subsystem: the persistent store, the upstream text/link provider,
//! the LLM provider, the chunker, the alignment engine, and the orchestrator.

use thiserror::Error;

/// Result type alias for guide-weaver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for guide-weaver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Persistent store errors (the document database).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Upstream text/link provider errors.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// LLM provider errors.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Chunking errors.
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// Alignment engine errors.
    #[error("alignment error: {0}")]
    Alignment(#[from] AlignmentError),

    /// Guide orchestrator errors.
    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Invalid configuration.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Errors from the persistent document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(String),

    /// Store not initialized (schema missing).
    #[error("store not initialized. Run: guide-weaver init")]
    NotInitialized,

    /// A record existed but failed validation (unknown schema version,
    /// missing required field).
    #[error("record {collection}/{id} failed validation: {reason}")]
    InvalidRecord {
        /// Collection name.
        collection: String,
        /// Document id within the collection.
        id: String,
        /// Why validation failed.
        reason: String,
    },

    /// A conditional write (e.g. lock acquisition) lost the race.
    #[error("conditional write rejected for {collection}/{id}")]
    ConditionFailed {
        /// Collection name.
        collection: String,
        /// Document id within the collection.
        id: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),
}

/// Errors from the upstream text/link provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider returned a non-2xx response for a ref.
    #[error("upstream not found for ref {reference}")]
    NotFound {
        /// The reference string that was requested.
        reference: String,
    },

    /// The provider's response was missing required fields
    /// (`he`/`ref`). Treated identically to `NotFound` by callers.
    #[error("upstream schema drift for ref {reference}: {reason}")]
    SchemaDrift {
        /// The reference string that was requested.
        reference: String,
        /// What was missing or malformed.
        reason: String,
    },

    /// Transport-level failure (timeout, connection reset, DNS,...).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors from the LLM provider, classified per / taxonomy.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The requested model does not exist or is not supported.
    #[error("model unavailable: {model}")]
    ModelUnavailable {
        /// The model identifier that was rejected.
        model: String,
    },

    /// Quota/rate-limit exhaustion that should skip straight to the
    /// next candidate model.
    #[error("quota exhausted for model {model}")]
    QuotaExhausted {
        /// The model identifier that was throttled.
        model: String,
    },

    /// A transient error (5xx, timeout, rate-limit) worth retrying.
    #[error("transient error for model {model}: {reason}")]
    Transient {
        /// The model identifier.
        model: String,
        /// The underlying message.
        reason: String,
    },

    /// A per-attempt timeout was exceeded.
    #[error("timed out after {millis}ms calling model {model}")]
    Timeout {
        /// The model identifier.
        model: String,
        /// Configured timeout in milliseconds.
        millis: u64,
    },

    /// Any other permanent failure for a single candidate.
    #[error("permanent error for model {model}: {reason}")]
    Permanent {
        /// The model identifier.
        model: String,
        /// The underlying message.
        reason: String,
    },

    /// All candidates in the cascade were exhausted without success.
    #[error("all model candidates exhausted: {candidates}")]
    CascadeExhausted {
        /// Comma-separated list of candidates that were attempted.
        candidates: String,
    },
}

/// Errors from the chunker.
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// Invalid profile configuration (e.g. `min` > `max`).
    #[error("invalid chunk profile: {reason}")]
    InvalidProfile {
        /// Reason the configuration is invalid.
        reason: String,
    },
}

/// Errors from the alignment engine.
#[derive(Error, Debug)]
pub enum AlignmentError {
    /// Lock acquisition polling exceeded the configured timeout.
    #[error("timed out waiting for alignment lock on {section} {chapter}")]
    LockTimeout {
        /// Section name.
        section: String,
        /// Chapter number.
        chapter: u32,
    },

    /// The build procedure failed; the error is also persisted on the
    /// record with `status=failed`.
    #[error("alignment build failed for {section} {chapter}: {reason}")]
    BuildFailed {
        /// Section name.
        section: String,
        /// Chapter number.
        chapter: u32,
        /// The underlying failure.
        reason: String,
    },
}

/// Errors from the guide orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// No corpus produced any usable content.
    #[error("no corpus returned content")]
    NoContent,

    /// The request named no corpora at all.
    #[error("no source selected")]
    NoSourceSelected,

    /// Required identifiers (section/chapter) were missing or invalid.
    #[error("missing or invalid identifiers: {reason}")]
    MissingIdentifiers {
        /// What was missing or malformed.
        reason: String,
    },

    /// Single-flight canonical-cache polling exceeded the configured
    /// attempt budget without observing `ready`.
    #[error("timed out waiting for canonical guide {fingerprint}")]
    CanonicalWaitTimeout {
        /// The request fingerprint being awaited.
        fingerprint: String,
    },

    /// A per-corpus task panicked or was aborted by the runtime before it
    /// could return a `CorpusOutcome`.
    #[error("corpus task failed: {reason}")]
    TaskFailure {
        /// The underlying join error.
        reason: String,
    },
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Unknown command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// Output format error.
    #[error("output format error: {0}")]
    OutputFormat(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::from(err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config {
            message: "bad config".to_string(),
        };
        assert_eq!(err.to_string(), "configuration error: bad config");
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotInitialized;
        assert_eq!(err.to_string(),
            "store not initialized. Run: guide-weaver init");

        let err = StoreError::ConditionFailed {
            collection: "alignments".to_string(),
            id: "orach_chayim_24".to_string(),
        };
        assert!(err.to_string().contains("orach_chayim_24"));
    }

    #[test]
    fn test_llm_error_variants() {
        let err = LlmError::ModelUnavailable {
            model: "gpt-nope".to_string(),
        };
        assert!(err.to_string().contains("gpt-nope"));

        let err = LlmError::CascadeExhausted {
            candidates: "a,b,c".to_string(),
        };
        assert!(err.to_string().contains("a,b,c"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: Error = rusqlite_err.into();
        assert!(matches!(err, Error::Store(StoreError::Database(_))));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn test_orchestrator_error_display() {
        let err = OrchestratorError::NoContent;
        assert_eq!(err.to_string(), "no corpus returned content");
    }
}
