//! The LLM provider contract and the cascade/retry machinery shared by
//! the explanation memoizer and the summary producer.
//!
//! The provider itself — model selection, billing, actual inference —
//! is out of scope; this module owns only candidate-list construction,
//! per-attempt timeouts, exponential backoff, and substring-based
//! error classification.

pub mod fixture;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;

/// A text-in/text-out model endpoint ("LLM provider contract").
///
/// Implementations return the raw stringified error on failure;
/// [`classify_error`] is responsible for turning that into a typed
/// [`LlmError`] by substring match, exactly as the upstream provider's
/// opaque errors are classified.
#[async_trait]
pub trait Llm: Send + Sync + 'static {
    /// Calls the model, returning its raw text output.
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, String>;
}

/// Per-candidate retry policy: how many attempts, and how long each
/// attempt is allowed to run before being abandoned.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts for one candidate model, including the first.
    pub max_attempts: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl RetryPolicy {
    /// The generic default: 3 attempts, 60 s per attempt.
    #[must_use]
    pub const fn generic() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(60),
        }
    }

    /// Explanation generation: 3 attempts, 120 s per attempt.
    #[must_use]
    pub const fn explanation() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(120),
        }
    }

    /// Explanation repair round: 2 attempts, 90 s per attempt.
    #[must_use]
    pub const fn explanation_repair() -> Self {
        Self {
            max_attempts: 2,
            timeout: Duration::from_secs(90),
        }
    }

    /// Summary generation: 3 attempts, 120 s per attempt.
    #[must_use]
    pub const fn summary() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(120),
        }
    }

    /// Summary repair round: 2 attempts, 45 s per attempt.
    #[must_use]
    pub const fn summary_repair() -> Self {
        Self {
            max_attempts: 2,
            timeout: Duration::from_secs(45),
        }
    }
}

/// The result of a successful cascade run.
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    /// The model's raw text output.
    pub text: String,
    /// Which candidate actually produced `text`.
    pub model_used: String,
}

/// Classifies a provider's stringified error by substring match.
/// Case-insensitive, since providers are inconsistent about casing in
/// error strings.
#[must_use]
pub fn classify_error(raw: &str, model: &str) -> LlmError {
    let lower = raw.to_lowercase();

    let model_unavailable = lower.contains("model")
    && (lower.contains("not found") || lower.contains("not supported") || lower.contains("404"));
    if model_unavailable {
        return LlmError::ModelUnavailable {
            model: model.to_string(),
        };
    }

    if lower.contains("429") || lower.contains("quota") || lower.contains("resource_exhausted") {
        return LlmError::QuotaExhausted {
            model: model.to_string(),
        };
    }

    if lower.contains("503") || lower.contains("timeout") || lower.contains("temporar") || lower.contains("rate limit")
    {
        return LlmError::Transient {
            model: model.to_string(),
            reason: raw.to_string(),
        };
    }

    LlmError::Permanent {
        model: model.to_string(),
        reason: raw.to_string(),
    }
}

const fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(400 * (1 << (attempt.saturating_sub(1))))
}

fn spawn_call(llm: Arc<dyn Llm>,
    model: String,
    prompt: String) -> tokio::task::JoinHandle<Result<String, String>> {
    tokio::spawn(async move { llm.generate(&model, &prompt).await })
}

/// Runs the retry loop for a single candidate model :
/// "model unavailable"/"quota exhausted" skip remaining attempts for
/// this candidate; transient errors and per-attempt timeouts retry
/// with exponential backoff; anything else stops the candidate
/// immediately. A timed-out call is abandoned rather than cancelled —
/// its eventual completion is logged but never consumed.
async fn run_candidate(llm: Arc<dyn Llm>,
    model: &str,
    prompt: &str,
    policy: RetryPolicy) -> Result<String, LlmError> {
    let mut last_err: Option<LlmError> = None;

    for attempt in 1..=policy.max_attempts {
        let mut handle = spawn_call(Arc::clone(&llm), model.to_string(), prompt.to_string());

        match tokio::time::timeout(policy.timeout, &mut handle).await {
            Ok(Ok(Ok(text))) => return Ok(text),
            Ok(Ok(Err(raw))) => {
                let classified = classify_error(&raw, model);
                match classified {
                    LlmError::ModelUnavailable {.. } | LlmError::QuotaExhausted {.. } => {
                        return Err(classified);
                    }
                    LlmError::Transient {.. } => {
                        last_err = Some(classified);
                    }
                    other => return Err(other),
                }
            }
            Ok(Err(join_err)) => {
                last_err = Some(LlmError::Permanent {
                        model: model.to_string(),
                        reason: join_err.to_string(),
                });
            }
            Err(_elapsed) => {
                tracing::warn!(model,
                    attempt,
                    millis = policy.timeout.as_millis(),
                    "[llm-retry] call abandoned after timeout");
                tokio::spawn(async move {
                        match handle.await {
                            Ok(Ok(_)) => {
                                tracing::info!("[llm-retry] abandoned call completed after timeout");
                            }
                            Ok(Err(raw)) => {
                                tracing::info!(error = %raw, "[llm-retry] abandoned call errored after timeout");
                            }
                            Err(_) => {}
                        }
                });
                last_err = Some(LlmError::Timeout {
                        model: model.to_string(),
                        millis: policy.timeout.as_millis() as u64,
                });
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }
    }

    Err(last_err.unwrap_or_else(|| LlmError::Permanent {
                model: model.to_string(),
                reason: "exhausted retries".to_string(),
    }))
}

/// Runs the full cascade over `candidates`, already deduplicated by
/// the caller (see [`crate::config::Config::model_cascade()`]). Stops at
/// the first candidate that succeeds; the candidate loop always
/// continues to the next entry on failure and never retries a
/// candidate that already returned from [`run_candidate`].
pub async fn run_cascade(llm: Arc<dyn Llm>,
    candidates: &[String],
    prompt: &str,
    policy: RetryPolicy) -> Result<CascadeOutcome, LlmError> {
    for model in candidates {
        if let Ok(text) = run_candidate(Arc::clone(&llm), model, prompt, policy).await {
            return Ok(CascadeOutcome {
                    text,
                    model_used: model.clone(),
            });
        }
    }

    Err(LlmError::CascadeExhausted {
            candidates: candidates.join(","),
    })
}

#[cfg(test)]
mod tests {
    use crate::llm::fixture::FixtureLlm;
    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn classify_error_matches_documented_substrings() {
        assert!(matches!(classify_error("Error: model gpt-x not found", "gpt-x"),
                LlmError::ModelUnavailable {.. }));
        assert!(matches!(classify_error("429 Too Many Requests", "m"),
                LlmError::QuotaExhausted {.. }));
        assert!(matches!(classify_error("RESOURCE_EXHAUSTED", "m"),
                LlmError::QuotaExhausted {.. }));
        assert!(matches!(classify_error("503 Service Unavailable", "m"),
                LlmError::Transient {.. }));
        assert!(matches!(classify_error("request timeout", "m"),
                LlmError::Transient {.. }));
        assert!(matches!(classify_error("invalid api key", "m"),
                LlmError::Permanent {.. }));
    }

    #[tokio::test]
    async fn cascade_returns_first_success() {
        let llm = Arc::new(FixtureLlm::new().script("primary", vec![Ok("explanation".to_string())]));
        let candidates = vec!["primary".to_string(), "cost".to_string()];
        let outcome = run_cascade(llm, &candidates, "prompt", fast_policy()).await.unwrap();
        assert_eq!(outcome.model_used, "primary");
    }

    #[tokio::test]
    async fn cascade_falls_through_on_model_unavailable() {
        let llm = Arc::new(FixtureLlm::new()
            .script("primary", vec![Err("model primary not found (404)".to_string())])
            .script("cost", vec![Ok("explanation".to_string())]));
        let candidates = vec!["primary".to_string(), "cost".to_string()];
        let outcome = run_cascade(llm, &candidates, "prompt", fast_policy()).await.unwrap();
        assert_eq!(outcome.model_used, "cost");
    }

    #[tokio::test]
    async fn cascade_retries_transient_errors_before_success() {
        let llm = Arc::new(FixtureLlm::new().script("primary",
                vec![
                    Err("503 upstream overloaded".to_string()),
                    Ok("explanation".to_string()),
        ]));
        let candidates = vec!["primary".to_string()];
        let outcome = run_cascade(llm, &candidates, "prompt", fast_policy()).await.unwrap();
        assert_eq!(outcome.model_used, "primary");
        assert_eq!(outcome.text, "explanation");
    }

    #[tokio::test]
    async fn cascade_exhausted_when_every_candidate_fails() {
        let llm = Arc::new(FixtureLlm::new()
            .script("primary", vec![Err("invalid request".to_string())])
            .script("cost", vec![Err("invalid request".to_string())]));
        let candidates = vec!["primary".to_string(), "cost".to_string()];
        let result = run_cascade(llm, &candidates, "prompt", fast_policy()).await;
        assert!(matches!(result, Err(LlmError::CascadeExhausted {.. })));
    }
}
