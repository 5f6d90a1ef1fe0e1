//! The per-fragment explanation memoizer.
//!
//! For a single chunk, either returns a prior explanation from the
//! persistent store or invokes the LLM cascade, validates the result,
//! repairs it once if validation fails, and writes it back under both
//! the structured key and the legacy opaque key (forward-deflection).

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::domain::records::ExplanationRecord;
use crate::domain::CorpusId;
use crate::error::{Error, Result};
use crate::llm::{run_cascade, Llm, RetryPolicy};
use crate::prompts::{self, EXPLANATION_PROMPT_VERSION};
use crate::store::{ExplanationKey, Store};
use crate::text::hebrew_ratio;
use crate::util::{now_ts, sha256_hex};

/// Everything the memoizer needs for one chunk ("Inputs to one
/// explanation call").
#[derive(Debug, Clone)]
pub struct ExplanationRequest {
    /// The structured lookup/write key.
    pub key: ExplanationKey,
    /// The source fragment's canonical reference string, used to
    /// derive the legacy opaque key; `None` for a ref-less chunk.
    pub ref_canonical: Option<String>,
    /// Content hash of the chunk text (`Chunk.contentHash`).
    pub content_hash: String,
    /// Display label for the corpus, used in the prompt header.
    pub corpus_label: String,
    /// The chunk's text.
    pub current_segment: String,
    /// The previous chunk's `(text, explanation)`, if this is not the
    /// first chunk of the corpus (ordering guarantee).
    pub previous: Option<(String, String)>,
    /// The later-commentary's raw text for the same paragraph,
    /// present only when `key.corpus` is the primary.
    pub companion_text: Option<String>,
    /// The preferred model for this request (the orchestrator's
    /// selected tier).
    pub preferred_model: String,
}

/// Result of one memoized explanation call ("Output").
#[derive(Debug, Clone)]
pub struct ExplanationOutcome {
    /// Final explanation text.
    pub explanation: String,
    /// Model that produced the returned text.
    pub model_used: String,
    /// Whether this was served from the cache (structured or legacy).
    pub cache_hit: bool,
    /// Prompt version the explanation was generated/validated under.
    pub prompt_version: String,
    /// Whether the explanation passed (or was repaired into passing)
    /// validation.
    pub validated: bool,
    /// Wall-clock time spent on LLM calls, `0` on a cache hit.
    pub duration_ms: u64,
}

fn legacy_key(corpus: CorpusId, ref_canonical: Option<&str>, ordinal: usize, content_hash: &str, prompt_version: &str, model: &str) -> String {
    let reference = ref_canonical.unwrap_or("");
    sha256_hex(&format!("{}|{}|{}|{}|{}|{}",
            corpus.slug(),
            reference,
            ordinal,
            content_hash,
            prompt_version,
            model))
}

fn outcome_from_record(record: &ExplanationRecord) -> ExplanationOutcome {
    ExplanationOutcome {
        explanation: record.explanation_text.clone(),
        model_used: record.model_name.clone(),
        cache_hit: true,
        prompt_version: record.prompt_version.clone(),
        validated: record.validated,
        duration_ms: 0,
    }
}

/// Looks up the structured key, then falls back to the legacy keys for
/// each cascade candidate in order ("Cache lookup order").
async fn lookup_cached(store: &dyn Store,
    request: &ExplanationRequest,
    candidates: &[String]) -> Result<Option<ExplanationRecord>> {
    if let Some(record) = store.get_explanation(&request.key).await? {
        if record.matches(&request.content_hash, EXPLANATION_PROMPT_VERSION) {
            return Ok(Some(record));
        }
    }

    for model in candidates {
        let key = legacy_key(request.key.corpus,
            request.ref_canonical.as_deref(),
            request.key.ordinal,
            &request.content_hash,
            EXPLANATION_PROMPT_VERSION,
            model);
        if let Some(record) = store.get_explanation_legacy(&key).await? {
            if record.matches(&request.content_hash, EXPLANATION_PROMPT_VERSION) {
                return Ok(Some(record));
            }
        }
    }

    Ok(None)
}

/// Runs the full memoizer for one chunk.
///
/// # Errors
///
/// Returns an error if every candidate model in the cascade fails, or
/// if the store itself errors.
pub async fn explain(store: &Arc<dyn Store>,
    llm: Arc<dyn Llm>,
    config: &Config,
    request: ExplanationRequest) -> Result<ExplanationOutcome> {
    let candidates = config.model_cascade(&request.preferred_model);

    if let Some(record) = lookup_cached(store.as_ref(), &request, &candidates).await? {
        // Migrate a legacy hit into the structured key atomically so
        // future structured-key lookups hit immediately.
        store.write_explanation(&request.key, record.clone()).await?;
        return Ok(outcome_from_record(&record));
    }

    let started = Instant::now();

    let prompt = prompts::explanation_prompt(&request.current_segment,
        request
        .previous
        .as_ref()
        .map(|(text, explanation)| (text.as_str(), explanation.as_str())),
        request.companion_text.as_deref(),
        &request.corpus_label);

    let generated = run_cascade(Arc::clone(&llm), &candidates, &prompt, RetryPolicy::explanation())
    .await
    .map_err(Error::Llm)?;

    let raw_text = generated.text.clone();
    let mut final_text = generated.text;
    let mut validated = hebrew_ratio(&final_text) >= config.hebrew_ratio_threshold;

    if !validated {
        let repair_prompt = prompts::explanation_repair_prompt(&final_text);
        let repair_candidates = vec![generated.model_used.clone()];
        if let Ok(repaired) = run_cascade(Arc::clone(&llm),
            &repair_candidates,
            &repair_prompt,
            RetryPolicy::explanation_repair())
        .await
        {
            final_text = repaired.text;
            validated = hebrew_ratio(&final_text) >= config.hebrew_ratio_threshold;
        }
    }

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let now = now_ts();
    let record = ExplanationRecord {
        raw_text,
        explanation_text: final_text.clone(),
        content_hash: request.content_hash.clone(),
        model_name: generated.model_used.clone(),
        prompt_version: EXPLANATION_PROMPT_VERSION.to_string(),
        validated,
        created_at: now,
        updated_at: now,
    };

    store.write_explanation(&request.key, record.clone()).await?;

    let used_key = legacy_key(request.key.corpus,
        request.ref_canonical.as_deref(),
        request.key.ordinal,
        &request.content_hash,
        EXPLANATION_PROMPT_VERSION,
        &generated.model_used);
    store.write_explanation_legacy(&used_key, record.clone()).await?;

    if generated.model_used != request.preferred_model {
        let preferred_key = legacy_key(request.key.corpus,
            request.ref_canonical.as_deref(),
            request.key.ordinal,
            &request.content_hash,
            EXPLANATION_PROMPT_VERSION,
            &request.preferred_model);
        store.write_explanation_legacy(&preferred_key, record).await?;
    }

    Ok(ExplanationOutcome {
            explanation: final_text,
            model_used: generated.model_used,
            cache_hit: false,
            prompt_version: EXPLANATION_PROMPT_VERSION.to_string(),
            validated,
            duration_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Section;
    use crate::llm::fixture::FixtureLlm;
    use crate::store::SqliteStore;

    fn request(preferred_model: &str) -> ExplanationRequest {
        ExplanationRequest {
            key: ExplanationKey {
                section: Section::OrachChayim,
                chapter: 24,
                paragraph: 1,
                corpus: CorpusId::PredecessorCode,
                ordinal: 0,
            },
            ref_canonical: Some("Tur, Orach Chayim 24".to_string()),
            content_hash: "hash-a".to_string(),
            corpus_label: "Tur".to_string(),
            current_segment: "טקסט מקור לדוגמה".to_string(),
            previous: None,
            companion_text: None,
            preferred_model: preferred_model.to_string(),
        }
    }

    #[tokio::test]
    async fn full_miss_generates_and_caches() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let llm = Arc::new(FixtureLlm::new().script("primary", vec![Ok("הסבר תקין בעברית".to_string())]));
        let config = Config::default();

        let first = explain(&store, llm.clone(), &config, request("primary")).await.unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.model_used, "primary");
        assert!(first.validated);

        let second = explain(&store, llm, &config, request("primary")).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.explanation, first.explanation);
    }

    #[tokio::test]
    async fn content_hash_change_is_a_cache_miss() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let llm = Arc::new(FixtureLlm::new()
            .script("primary", vec![Ok("הסבר ראשון".to_string()), Ok("הסבר שני".to_string())]));
        let config = Config::default();

        let mut req1 = request("primary");
        req1.content_hash = "hash-a".to_string();
        let first = explain(&store, llm.clone(), &config, req1).await.unwrap();

        let mut req2 = request("primary");
        req2.content_hash = "hash-b".to_string();
        let second = explain(&store, llm, &config, req2).await.unwrap();

        assert!(!second.cache_hit);
        assert_ne!(first.explanation, second.explanation);
    }

    #[tokio::test]
    async fn cascade_falls_through_to_cost_model() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let config = Config::default();
        let llm = Arc::new(FixtureLlm::new()
            .script(&config.llm_model_primary, vec![Err("model not found 404".to_string())])
            .script(&config.llm_model_cost, vec![Ok("הסבר מהדגם הזול".to_string())]));

        let mut req = request(&config.llm_model_primary);
        req.content_hash = "hash-cascade".to_string();
        let outcome = explain(&store, llm, &config, req).await.unwrap();
        assert_eq!(outcome.model_used, config.llm_model_cost);
    }

    #[tokio::test]
    async fn invalid_output_triggers_repair_round() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let llm = Arc::new(FixtureLlm::new().script("primary",
                vec![Ok("not hebrew at all".to_string()), Ok("הסבר מתוקן לגמרי בעברית".to_string())]));
        let config = Config::default();

        let mut req = request("primary");
        req.content_hash = "hash-repair".to_string();
        let outcome = explain(&store, llm, &config, req).await.unwrap();
        assert!(outcome.validated);
        assert_eq!(outcome.explanation, "הסבר מתוקן לגמרי בעברית");
    }

    #[tokio::test]
    async fn repair_failure_keeps_original_unvalidated() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let llm = Arc::new(FixtureLlm::new().script("primary",
                vec![Ok("not hebrew".to_string()), Err("invalid request".to_string())]));
        let config = Config::default();

        let mut req = request("primary");
        req.content_hash = "hash-repair-fail".to_string();
        let outcome = explain(&store, llm, &config, req).await.unwrap();
        assert!(!outcome.validated);
        assert_eq!(outcome.explanation, "not hebrew");
    }
}
