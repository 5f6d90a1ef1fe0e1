//! # guide-weaver
//!
//! Server-side generation pipeline for multi-source rabbinic study
//! guides: cross-corpus alignment, per-fragment explanation
//! memoization with model fallback, a request-level canonical guide
//! cache with single-flight coordination, and a fragment chunker.
//!
//! ## Modules
//!
//! - [`domain`]: shared record and value types.
//! - [`resolver`]: reference building and upstream text/link fetch.
//! - [`chunking`]: fragment-to-chunk splitting.
//! - [`similarity`]: Hebrew-normalized lexical scoring.
//! - [`alignment`]: cross-corpus paragraph alignment engine.
//! - [`explain`]: per-fragment explanation memoizer.
//! - [`summary`]: final consolidated-summary producer.
//! - [`orchestrator`]: the top-level guide pipeline.
//! - [`store`]: the persistent document-store stand-in.
//! - [`llm`]: the LLM provider abstraction and model cascade.
//! - [`progress`]: the client-observable progress counter surface.
//! - [`cli`]: the command-line interface.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod alignment;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod explain;
pub mod llm;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod resolver;
pub mod similarity;
pub mod store;
pub mod summary;
pub mod text;
pub mod util;

// Re-export the top-level error type at crate root.
pub use error::{Error, Result};

// Re-export core domain types.
pub use domain::{Chunk, CorpusId, Fragment, FragmentRef, Location, Section};

// Re-export the orchestrator's public surface.
pub use orchestrator::{CancellationFlag, GuideData, GuideOrchestrator, GuideOutcome, GuideRequest};

// Re-export storage types.
pub use store::{DEFAULT_DB_PATH, SqliteStore, Store};

// Re-export the CLI entry point.
pub use cli::{Cli, Commands, execute};
