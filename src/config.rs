//! Environment-driven configuration.
//!
//! CLI-exposed settings use `clap`'s `env` attribute (see
//! [`crate::cli::parser`]); settings with no CLI surface are read
//! directly from the process environment via [`Config::from_env()`].

use std::env;

/// Default preferred (pro-tier) model.
pub const DEFAULT_MODEL_PRIMARY: &str = "gemini-2.5-pro";
/// Default cost-tier model.
pub const DEFAULT_MODEL_COST: &str = "gemini-2.5-flash";
/// Default fallback (flash-lite) model.
pub const DEFAULT_MODEL_FALLBACK: &str = "gemini-2.5-flash-lite";

/// Default batch threshold: chunk counts above this use the cost tier
/// when batch mode is enabled.
pub const DEFAULT_BATCH_THRESHOLD: usize = 5;
/// Default cap on chunks processed per corpus per request.
pub const DEFAULT_MAX_CHUNKS_PER_SOURCE: usize = 15;
/// Default number of chunks between cancellation-flag polls.
pub const DEFAULT_CANCELLATION_CHECK_INTERVAL: usize = 3;
/// Default minimum Hebrew-codepoint ratio for validation.
pub const DEFAULT_HEBREW_RATIO_THRESHOLD: f64 = 0.7;

/// Process-wide configuration assembled from the environment.
///
/// Constructed once at process start and threaded through the
/// orchestrator as an explicit dependency, rather than read ad hoc
/// from `std::env` deep inside the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Preferred (primary-tier) LLM model.
    pub llm_model_primary: String,
    /// Cost-tier LLM model, used for the cascade and for batch mode.
    pub llm_model_cost: String,
    /// Fallback (cheapest) LLM model, last in the cascade.
    pub llm_model_fallback: String,
    /// Whether batch mode is enabled (`LLM_USE_BATCH`).
    pub llm_use_batch: bool,
    /// Chunk-count threshold above which batch mode selects the cost
    /// tier (`LLM_BATCH_THRESHOLD`).
    pub llm_batch_threshold: usize,
    /// Cap on chunks processed per corpus per request
    /// (`MAX_CHUNKS_PER_SOURCE`).
    pub max_chunks_per_source: usize,
    /// Chunks between cancellation-flag polls
    /// (`CANCELLATION_CHECK_INTERVAL`).
    pub cancellation_check_interval: usize,
    /// Minimum Hebrew-ratio for validation (`HEBREW_RATIO_THRESHOLD`).
    pub hebrew_ratio_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_model_primary: DEFAULT_MODEL_PRIMARY.to_string(),
            llm_model_cost: DEFAULT_MODEL_COST.to_string(),
            llm_model_fallback: DEFAULT_MODEL_FALLBACK.to_string(),
            llm_use_batch: false,
            llm_batch_threshold: DEFAULT_BATCH_THRESHOLD,
            max_chunks_per_source: DEFAULT_MAX_CHUNKS_PER_SOURCE,
            cancellation_check_interval: DEFAULT_CANCELLATION_CHECK_INTERVAL,
            hebrew_ratio_threshold: DEFAULT_HEBREW_RATIO_THRESHOLD,
        }
    }
}

impl Config {
    /// Reads configuration from the process environment, falling back
    /// to documented defaults for any variable that is unset or
    /// unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            llm_model_primary: env::var("LLM_MODEL_PRIMARY").unwrap_or(defaults.llm_model_primary),
            llm_model_cost: env::var("LLM_MODEL_COST").unwrap_or(defaults.llm_model_cost),
            llm_model_fallback: env::var("LLM_MODEL_FALLBACK").unwrap_or(defaults.llm_model_fallback),
            llm_use_batch: env::var("LLM_USE_BATCH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.llm_use_batch),
            llm_batch_threshold: env::var("LLM_BATCH_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.llm_batch_threshold),
            max_chunks_per_source: env::var("MAX_CHUNKS_PER_SOURCE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_chunks_per_source),
            cancellation_check_interval: env::var("CANCELLATION_CHECK_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.cancellation_check_interval),
            hebrew_ratio_threshold: env::var("HEBREW_RATIO_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.hebrew_ratio_threshold),
        }
    }

    /// The model cascade in order: preferred, cost, fallback,
    /// deduplicated while preserving first occurrence.
    #[must_use]
    pub fn model_cascade(&self, preferred: &str) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        [preferred, &self.llm_model_cost, &self.llm_model_fallback]
        .into_iter()
        .filter(|m| seen.insert((*m).to_string()))
        .map(ToString::to_string)
        .collect()
    }

    /// Picks the model tier for a request given its total chunk count.
    #[must_use]
    pub fn tier_for_chunk_count(&self, chunk_count: usize) -> &str {
        if self.llm_use_batch && chunk_count > self.llm_batch_threshold {
            &self.llm_model_cost
        } else {
            &self.llm_model_primary
        }
    }
}

/// Store credentials, read from the environment with fallback to
/// ambient credentials. The `SqliteStore` backend does not use
/// these directly; they are plumbed through for parity with the
/// production document-database client a deployment would configure.
#[derive(Debug, Clone, Default)]
pub struct StoreCredentials {
    /// `STORE_PROJECT_ID`, if set.
    pub project_id: Option<String>,
    /// `STORE_CLIENT_EMAIL`, if set.
    pub client_email: Option<String>,
    /// `STORE_PRIVATE_KEY`, if set.
    pub private_key: Option<String>,
}

impl StoreCredentials {
    /// Reads store credentials from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            project_id: env::var("STORE_PROJECT_ID").ok(),
            client_email: env::var("STORE_CLIENT_EMAIL").ok(),
            private_key: env::var("STORE_PRIVATE_KEY").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.llm_model_primary, DEFAULT_MODEL_PRIMARY);
        assert_eq!(config.max_chunks_per_source, 15);
        assert_eq!(config.cancellation_check_interval, 3);
        assert!((config.hebrew_ratio_threshold - 0.7).abs() < 1e-9);
    }

    #[test]
    fn model_cascade_dedupes_preserving_order() {
        let config = Config::default();
        let cascade = config.model_cascade(&config.llm_model_cost);
        assert_eq!(cascade.len(), 2);
        assert_eq!(cascade[0], config.llm_model_cost);
        assert_eq!(cascade[1], config.llm_model_fallback);
    }

    #[test]
    fn tier_selection_respects_batch_threshold() {
        let mut config = Config::default();
        config.llm_use_batch = true;
        config.llm_batch_threshold = 5;
        assert_eq!(config.tier_for_chunk_count(3), &config.llm_model_primary);
        assert_eq!(config.tier_for_chunk_count(6), &config.llm_model_cost);
    }

    #[test]
    fn tier_selection_ignores_threshold_when_batch_disabled() {
        let config = Config::default();
        assert_eq!(config.tier_for_chunk_count(100), &config.llm_model_primary);
    }
}
