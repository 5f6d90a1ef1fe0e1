//! CLI command implementations.
//!
//! Contains the business logic for each CLI command: initializing and
//! inspecting the store, and driving the guide-generation pipeline
//! against either the live upstream/LLM providers or the
//! in-memory `--dry-run` stand-ins (`cli::dryrun`).

use std::sync::Arc;

use crate::alignment::AlignmentEngine;
use crate::cli::dryrun::{CannedLlm, CannedTextProvider};
use crate::cli::output::{format_guide, format_init_result, format_status};
use crate::cli::parser::{Cli, Commands};
use crate::config::Config;
use crate::domain::{CorpusId, Section};
use crate::error::{CommandError, Error, OrchestratorError, Result};
use crate::llm::Llm;
use crate::orchestrator::{GuideOrchestrator, GuideRequest, NeverCancelled};
use crate::progress::NullProgress;
use crate::resolver::{HttpTextProvider, TextProvider};
use crate::store::{SqliteStore, Store};

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = crate::cli::output::OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init { force } => cmd_init(&db_path, *force, format),
        Commands::Status => cmd_status(&db_path, format),
        Commands::Guide {
            section,
            chapter,
            paragraph,
            corpora,
            dry_run,
            provider_base_url,
        } => cmd_guide(&db_path,
            section,
            *chapter,
            *paragraph,
            corpora,
            *dry_run,
            provider_base_url,
            format),
    }
}

fn cmd_init(db_path: &std::path::Path, force: bool, format: crate::cli::output::OutputFormat) -> Result<String> {
    if force && db_path.exists() {
        std::fs::remove_file(db_path)
        .map_err(|e| Error::Command(CommandError::ExecutionFailed(e.to_string())))?;
    }
    SqliteStore::open(db_path)?;
    Ok(format_init_result(&db_path.display().to_string(), format))
}

fn cmd_status(db_path: &std::path::Path, format: crate::cli::output::OutputFormat) -> Result<String> {
    let store = SqliteStore::open(db_path)?;
    let stats = store.stats()?;
    Ok(format_status(&stats, format))
}

fn parse_corpora(spec: &str) -> Result<Vec<CorpusId>> {
    if spec.eq_ignore_ascii_case("all") {
        return Ok(CorpusId::ALL.to_vec());
    }
    spec.split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| {
            CorpusId::from_slug(s).ok_or_else(|| {
                    Error::Command(CommandError::InvalidArgument(format!("unknown corpus slug '{s}' (expected one of: primary, compendium, predecessor, later_commentary, or 'all')")))
            })
    })
    .collect()
}

#[allow(clippy::too_many_arguments)]
fn cmd_guide(db_path: &std::path::Path,
    section: &str,
    chapter: u32,
    paragraph: Option<u32>,
    corpora: &str,
    dry_run: bool,
    provider_base_url: &str,
    format: crate::cli::output::OutputFormat) -> Result<String> {
    let section = Section::parse(section).ok_or_else(|| {
            Error::Orchestrator(OrchestratorError::MissingIdentifiers {
                    reason: format!("unrecognized section '{section}'"),
            })
    })?;
    let corpora = parse_corpora(corpora)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .map_err(|e| Error::Command(CommandError::ExecutionFailed(e.to_string())))?;

    runtime.block_on(async move {
            let store: Arc<dyn Store> = Arc::new(SqliteStore::open(db_path)?);
            let provider: Arc<dyn TextProvider> = if dry_run {
                Arc::new(CannedTextProvider)
            } else {
                Arc::new(HttpTextProvider::new(provider_base_url.to_string()))
            };
            let llm: Arc<dyn Llm> = if dry_run {
                Arc::new(CannedLlm)
            } else {
                Arc::new(crate::llm::openai::OpenAiLlm::from_env())
            };
            let alignment = Arc::new(AlignmentEngine::new(Arc::clone(&store), Arc::clone(&provider)));
            let orchestrator = GuideOrchestrator::new(store,
                provider,
                llm,
                alignment,
                Arc::new(NullProgress),
                Config::from_env());

            let request = GuideRequest::new(section, chapter, paragraph, corpora);
            let outcome = orchestrator
            .generate(request, Arc::new(NeverCancelled))
            .await?;
            Ok(format_guide(&outcome, format))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_corpora_all_returns_every_corpus() {
        let corpora = parse_corpora("all").unwrap();
        assert_eq!(corpora.len(), 4);
    }

    #[test]
    fn parse_corpora_accepts_csv_slugs() {
        let corpora = parse_corpora("primary, predecessor").unwrap();
        assert_eq!(corpora, vec![CorpusId::Primary, CorpusId::PredecessorCode]);
    }

    #[test]
    fn parse_corpora_rejects_unknown_slug() {
        assert!(parse_corpora("nonsense").is_err());
    }

    #[test]
    fn init_and_status_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("guide-weaver.db");
        let cli = Cli {
            db_path: Some(db_path.clone()),
            verbose: false,
            format: "text".to_string(),
            command: Commands::Init { force: false },
        };
        let out = execute(&cli).unwrap();
        assert!(out.contains("Initialized"));

        let cli = Cli {
            db_path: Some(db_path),
            verbose: false,
            format: "json".to_string(),
            command: Commands::Status,
        };
        let out = execute(&cli).unwrap();
        assert!(out.contains("\"alignment_count\""));
    }

    #[test]
    fn guide_dry_run_produces_output() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("guide-weaver.db");
        let cli = Cli {
            db_path: Some(db_path),
            verbose: false,
            format: "text".to_string(),
            command: Commands::Guide {
                section: "Orach Chayim".to_string(),
                chapter: 1,
                paragraph: Some(1),
                corpora: "primary".to_string(),
                dry_run: true,
                provider_base_url: "https://example.invalid/api".to_string(),
            },
        };
        let out = execute(&cli).unwrap();
        assert!(!out.is_empty());
    }
}
