//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// guide-weaver: generates consolidated, multi-source study guides for
/// the legal corpus against a persistent `SQLite`-backed store.
#[derive(Parser, Debug)]
#[command(name = "guide-weaver")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the guide-weaver database file.
    ///
    /// Defaults to `.guide-weaver/guide-weaver.db` in the current
    /// directory.
    #[arg(short, long, env = "GUIDE_WEAVER_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json, ndjson).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the store.
    ///
    /// Creates the database file and schema if they don't exist.
    Init {
        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Show current store status (record counts, schema version).
    Status,

    /// Generate (or fetch, if already cached) a study guide.
    Guide {
        /// Section name, e.g. "Orach Chayim".
        section: String,

        /// Chapter (siman) number.
        chapter: u32,

        /// Paragraph (seif) number; a whole-chapter guide is produced
        /// if omitted.
        #[arg(long)]
        paragraph: Option<u32>,

        /// Comma-separated corpus slugs to include (`primary`,
        /// `compendium`, `predecessor`, `later_commentary`), or `all`.
        #[arg(long, default_value = "all")]
        corpora: String,

        /// Run against in-memory placeholder text and LLM providers
        /// instead of the live upstream API and model endpoint, for
        /// local smoke-testing without network access or credentials.
        #[arg(long)]
        dry_run: bool,

        /// Upstream text/link provider base URL, used unless
        /// `--dry-run` is set.
        #[arg(long, env = "PROVIDER_API_BASE_URL", default_value = "https://www.sefaria.org/api")]
        provider_base_url: String,
    },
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(crate::store::DEFAULT_DB_PATH))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_db_path() {
        let cli = Cli {
            db_path: None,
            verbose: false,
            format: "text".to_string(),
            command: Commands::Status,
        };
        assert_eq!(cli.get_db_path(), PathBuf::from(crate::store::DEFAULT_DB_PATH));
    }

    #[test]
    fn test_custom_db_path() {
        let cli = Cli {
            db_path: Some(PathBuf::from("/custom/path.db")),
            verbose: false,
            format: "text".to_string(),
            command: Commands::Status,
        };
        assert_eq!(cli.get_db_path(), PathBuf::from("/custom/path.db"));
    }

    #[test]
    fn guide_requires_section_and_chapter() {
        let cli = Cli::try_parse_from(["guide-weaver", "guide", "Orach Chayim", "24"]).unwrap();
        match cli.command {
            Commands::Guide { section, chapter, paragraph, corpora, dry_run,.. } => {
                assert_eq!(section, "Orach Chayim");
                assert_eq!(chapter, 24);
                assert_eq!(paragraph, None);
                assert_eq!(corpora, "all");
                assert!(!dry_run);
            }
            _ => panic!("expected Guide"),
        }
    }
}
