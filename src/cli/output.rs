//! Output formatting for CLI commands.
//!
//! Supports text, JSON, and NDJSON output formats.

use serde::Serialize;
use std::fmt::Write;

use crate::orchestrator::{GuideData, GuideOutcome};
use crate::store::StoreStats;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
    /// Newline-delimited JSON (NDJSON) for streaming.
    Ndjson,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" | "stream" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Returns true if this format is a streaming format.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::Ndjson)
    }
}

/// Formats the result of `init`.
#[must_use]
pub fn format_init_result(db_path: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("Initialized store at {db_path}\n"),
        OutputFormat::Json | OutputFormat::Ndjson => {
            format_json(&serde_json::json!({ "initialized": true, "db_path": db_path }))
        }
    }
}

/// Formats a store status response.
#[must_use]
pub fn format_status(stats: &StoreStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_status_text(stats),
        OutputFormat::Json | OutputFormat::Ndjson => format_json(&StoreStatsView::from(stats)),
    }
}

#[derive(Serialize)]
struct StoreStatsView {
    alignment_count: u64,
    explanation_count: u64,
    canonical_guide_count: u64,
    canonical_ready_count: u64,
    schema_version: Option<String>,
    db_path: Option<String>,
    db_size: Option<u64>,
}

impl From<&StoreStats> for StoreStatsView {
    fn from(stats: &StoreStats) -> Self {
        Self {
            alignment_count: stats.alignment_count,
            explanation_count: stats.explanation_count,
            canonical_guide_count: stats.canonical_guide_count,
            canonical_ready_count: stats.canonical_ready_count,
            schema_version: stats.schema_version.clone(),
            db_path: stats.db_path.clone(),
            db_size: stats.db_size,
        }
    }
}

fn format_status_text(stats: &StoreStats) -> String {
    let mut output = String::new();
    output.push_str("guide-weaver Status\n");
    output.push_str("===================\n\n");
    let _ = writeln!(output,
        " Schema version: {}",
        stats.schema_version.as_deref().unwrap_or("uninitialized"));
    let _ = writeln!(output, " Alignments: {}", stats.alignment_count);
    let _ = writeln!(output, " Explanations: {}", stats.explanation_count);
    let _ = writeln!(output,
        " Canonical guides: {} ({} ready)",
        stats.canonical_guide_count, stats.canonical_ready_count);
    if let Some(path) = &stats.db_path {
        let _ = writeln!(output, " Database: {path}");
    } else {
        output.push_str(" Database: (in-memory)\n");
    }
    if let Some(size) = stats.db_size {
        let _ = writeln!(output, " DB size: {size} bytes");
    }
    output
}

/// Formats the result of a `guide` command.
#[must_use]
pub fn format_guide(outcome: &GuideOutcome, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_guide_text(outcome),
        OutputFormat::Json | OutputFormat::Ndjson => format_json(&GuideOutcomeView::from(outcome)),
    }
}

#[derive(Serialize)]
struct GuideOutcomeView {
    success: bool,
    cancelled: bool,
    error: Option<String>,
    guide: Option<GuideDataView>,
}

#[derive(Serialize)]
struct GuideDataView {
    fingerprint: String,
    section: &'static str,
    chapter: u32,
    paragraph: Option<u32>,
    summary_model: String,
    validated: bool,
    chunk_count: usize,
    summary_text: String,
}

impl From<&GuideData> for GuideDataView {
    fn from(data: &GuideData) -> Self {
        Self {
            fingerprint: data.fingerprint.clone(),
            section: data.section.canonical_name(),
            chapter: data.chapter,
            paragraph: data.paragraph,
            summary_model: data.summary_model.clone(),
            validated: data.validated,
            chunk_count: data.chunk_count,
            summary_text: data.summary_text.clone(),
        }
    }
}

impl From<&GuideOutcome> for GuideOutcomeView {
    fn from(outcome: &GuideOutcome) -> Self {
        Self {
            success: outcome.success,
            cancelled: outcome.cancelled,
            error: outcome.error.clone(),
            guide: outcome.guide.as_ref().map(GuideDataView::from),
        }
    }
}

fn format_guide_text(outcome: &GuideOutcome) -> String {
    let mut output = String::new();
    if outcome.cancelled {
        output.push_str("Guide generation was cancelled.\n");
        return output;
    }
    if let Some(error) = &outcome.error {
        let _ = writeln!(output, "Guide generation failed: {error}");
        return output;
    }
    let Some(guide) = &outcome.guide else {
        output.push_str("Guide generation returned no result.\n");
        return output;
    };

    let _ = writeln!(output, "{} {}{}", guide.section.canonical_name(), guide.chapter, guide
        .paragraph
        .map_or_else(String::new(), |p| format!(":{p}")));
    let _ = writeln!(output, "Fingerprint: {}", guide.fingerprint);
    let _ = writeln!(output,
        "Model: {} Validated: {} Chunks: {}",
        guide.summary_model, guide.validated, guide.chunk_count);
    output.push('\n');
    output.push_str(&guide.summary_text);
    output.push('\n');
    output
}

/// Formats a value as JSON.
fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Formats an error for output.
///
/// When format is JSON, returns a structured error object.
/// When format is Text, returns the error message string.
#[must_use]
pub fn format_error(error: &crate::Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let (error_type, suggestion) = get_error_details(error);
            let json = serde_json::json!({
                    "success": false,
                    "error": {
                        "type": error_type,
                        "message": error.to_string(),
                        "suggestion": suggestion
                    }
            });
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
        }
    }
}

/// Extracts error type and recovery suggestion from an error.
fn get_error_details(error: &crate::Error) -> (&'static str, Option<&'static str>) {
    use crate::error::{AlignmentError, ChunkingError, CommandError, LlmError, OrchestratorError, ProviderError, StoreError};

    match error {
        crate::Error::Store(e) => match e {
            StoreError::NotInitialized => ("NotInitialized",
                Some("Run 'guide-weaver init' to initialize the database")),
            StoreError::Database(_) => ("DatabaseError", None),
            StoreError::InvalidRecord {.. } => ("InvalidRecord", None),
            StoreError::ConditionFailed {.. } => ("ConditionFailed", Some("Retry the request")),
            StoreError::Serialization(_) => ("SerializationError", None),
            StoreError::Transaction(_) => ("TransactionError", None),
        },
        crate::Error::Provider(e) => match e {
            ProviderError::NotFound {.. } => ("ProviderNotFound",
                Some("Check that the section/chapter/paragraph exists upstream")),
            ProviderError::SchemaDrift {.. } => ("ProviderSchemaDrift", None),
            ProviderError::Transport(_) => ("ProviderTransportError", Some("Check network connectivity")),
        },
        crate::Error::Llm(e) => match e {
            LlmError::ModelUnavailable {.. } => ("ModelUnavailable", None),
            LlmError::QuotaExhausted {.. } => ("QuotaExhausted", Some("Wait and retry, or configure a different model")),
            LlmError::Transient {.. } => ("TransientLlmError", Some("Retry the request")),
            LlmError::Timeout {.. } => ("LlmTimeout", Some("Retry the request")),
            LlmError::Permanent {.. } => ("PermanentLlmError", None),
            LlmError::CascadeExhausted {.. } => ("CascadeExhausted",
                Some("All configured models failed; check model configuration and credentials")),
        },
        crate::Error::Chunking(e) => match e {
            ChunkingError::InvalidProfile {.. } => ("InvalidChunkProfile", None),
        },
        crate::Error::Alignment(e) => match e {
            AlignmentError::LockTimeout {.. } => ("AlignmentLockTimeout", Some("Retry the request")),
            AlignmentError::BuildFailed {.. } => ("AlignmentBuildFailed", None),
        },
        crate::Error::Orchestrator(e) => match e {
            OrchestratorError::NoContent => ("NoContent", None),
            OrchestratorError::NoSourceSelected => ("NoSourceSelected", Some("Select at least one corpus")),
            OrchestratorError::MissingIdentifiers {.. } => ("MissingIdentifiers", Some("A valid chapter number is required")),
            OrchestratorError::CanonicalWaitTimeout {.. } => ("CanonicalWaitTimeout", Some("Retry the request")),
            OrchestratorError::TaskFailure {.. } => ("TaskFailure", None),
        },
        crate::Error::Command(e) => match e {
            CommandError::UnknownCommand(_) => ("UnknownCommand", None),
            CommandError::InvalidArgument(_) => ("InvalidArgument", None),
            CommandError::ExecutionFailed(_) => ("ExecutionFailed", None),
            CommandError::OutputFormat(_) => ("OutputFormatError", None),
        },
        crate::Error::Config {.. } => ("ConfigError", None),
    }
}
