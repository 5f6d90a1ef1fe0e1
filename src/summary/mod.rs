//! The summary producer.
//!
//! Combines every participating corpus's per-chunk explanations into
//! one Hebrew-language LLM call, post-processes the result (preamble
//! and forbidden-phrase stripping), validates it, and runs one repair
//! round on failure. Shares the cascade/retry machinery with
//! [`crate::explain()`].

use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::llm::{run_cascade, Llm, RetryPolicy};
use crate::prompts::{self, SummarySection};
use crate::text::hebrew_ratio;

/// Lines whose trimmed text starts with one of these are dropped, but
/// only among the first [`PREAMBLE_SCAN_LINES`] non-empty lines
/// ("strip a configured list of meta-preamble prefixes").
const PREAMBLE_PREFIXES: &[&str] = &[
    "הנה",
    "להלן",
    "סיכום מתוקן",
    "ניסוח מחדש",
    "הסיכום הבא",
    "כמובן",
];

/// How many leading non-empty lines are examined for a preamble prefix
/// match.
const PREAMBLE_SCAN_LINES: usize = 5;

/// Lines containing any of these phrases are dropped entirely,
/// wherever they occur ("Strip forbidden-phrase lines
/// entirely").
const FORBIDDEN_PHRASES: &[&str] = &["כמודל שפה", "כבינה מלאכותית", "אינני יכול"];

/// Bullet-line markers recognized by validation ("must contain
/// at least one bullet-line").
const BULLET_MARKERS: &[&str] = &["-", "•", "*", "–"];

/// Strips meta-preamble lines (first `PREAMBLE_SCAN_LINES` non-empty
/// lines only) and forbidden-phrase lines (anywhere) from raw model
/// output ("Post-process").
#[must_use]
pub fn postprocess(raw: &str) -> String {
    let mut out = Vec::new();
    let mut non_empty_seen = 0usize;

    for line in raw.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            non_empty_seen += 1;
            if non_empty_seen <= PREAMBLE_SCAN_LINES
            && PREAMBLE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
            {
                continue;
            }
        }
        if FORBIDDEN_PHRASES.iter().any(|phrase| line.contains(phrase)) {
            continue;
        }
        out.push(line);
    }

    out.join("\n").trim().to_string()
}

/// Validation errors a failed check can report, fed into the repair
/// prompt.
fn validate(text: &str, hebrew_ratio_threshold: f64) -> Vec<String> {
    let mut errors = Vec::new();
    if text.trim().is_empty() {
        errors.push("הטקסט ריק".to_string());
    }
    if hebrew_ratio(text) < hebrew_ratio_threshold {
        errors.push("אחוז העברית בטקסט נמוך מדי".to_string());
    }
    let has_bullet = text
    .lines()
    .any(|line| BULLET_MARKERS.iter().any(|m| line.trim_start().starts_with(m)));
    if !has_bullet {
        errors.push("חסרה לפחות נקודת תקציר אחת בפורמט בולט".to_string());
    }
    errors
}

/// Result of one summary production call ("Output").
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    /// Final (post-process, possibly post-repair) summary text.
    pub summary: String,
    /// Model that produced the returned text.
    pub model_used: String,
    /// Whether the summary passed (or was repaired into passing)
    /// validation.
    pub validated: bool,
    /// Validation errors from the last validation pass run (empty if
    /// `validated`).
    pub validation_errors: Vec<String>,
}

/// Produces the final consolidated summary from every participating
/// corpus's combined explanation text.
///
/// # Errors
///
/// Returns an error if every candidate model in the cascade fails.
pub async fn summarize(llm: Arc<dyn Llm>,
    config: &Config,
    sections: &[SummarySection<'_>],
    preferred_model: &str) -> Result<SummaryOutcome> {
    let candidates = config.model_cascade(preferred_model);
    let prompt = prompts::summary_prompt(sections);

    let generated = run_cascade(Arc::clone(&llm), &candidates, &prompt, RetryPolicy::summary())
    .await
    .map_err(Error::Llm)?;

    let mut model_used = generated.model_used;
    let mut text = postprocess(&generated.text);
    let mut errors = validate(&text, config.hebrew_ratio_threshold);
    let mut validated = errors.is_empty();

    if !validated {
        let repair_prompt = prompts::summary_repair_prompt(&text, &errors);
        let repair_candidates = vec![model_used.clone()];
        if let Ok(repaired) = run_cascade(Arc::clone(&llm),
            &repair_candidates,
            &repair_prompt,
            RetryPolicy::summary_repair())
        .await
        {
            model_used = repaired.model_used;
            text = postprocess(&repaired.text);
            errors = validate(&text, config.hebrew_ratio_threshold);
            validated = errors.is_empty();
        }
    }

    Ok(SummaryOutcome {
            summary: text,
            model_used,
            validated,
            validation_errors: errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fixture::FixtureLlm;

    #[test]
    fn postprocess_strips_leading_preamble_line() {
        let raw = "הנה הסיכום המבוקש:\n- נקודה ראשונה\n- נקודה שנייה";
        let cleaned = postprocess(raw);
        assert!(!cleaned.starts_with("הנה"));
        assert!(cleaned.contains("נקודה ראשונה"));
    }

    #[test]
    fn postprocess_keeps_preamble_like_text_outside_scan_window() {
        let mut raw = String::new();
        for i in 0..6 {
            raw.push_str(&format!("- נקודה {i}\n"));
        }
        raw.push_str("הנה תוספת באמצע הטקסט");
        let cleaned = postprocess(&raw);
        assert!(cleaned.contains("הנה תוספת"));
    }

    #[test]
    fn postprocess_strips_forbidden_phrase_lines_anywhere() {
        let raw = "- נקודה ראשונה\nאינני יכול לספק מידע זה\n- נקודה שנייה";
        let cleaned = postprocess(raw);
        assert!(!cleaned.contains("אינני יכול"));
        assert!(cleaned.contains("נקודה שנייה"));
    }

    #[test]
    fn validate_requires_bullet_line() {
        let errors = validate("טקסט רגיל בלי נקודות כלל", 0.7);
        assert!(errors.iter().any(|e| e.contains("בולט")));
    }

    #[test]
    fn validate_passes_well_formed_hebrew_with_bullets() {
        let text = "- פסק ראשון\n- פסק שני";
        assert!(validate(text, 0.7).is_empty());
    }

    #[tokio::test]
    async fn summarize_returns_validated_output_on_first_try() {
        let llm = Arc::new(FixtureLlm::new().script("primary", vec![Ok("- פסק עיקרי\n- הלכה למעשה".to_string())]));
        let config = Config::default();
        let sections = vec![SummarySection {
                label: "Shulchan Arukh",
                combined_text: "טקסט מקור",
        }];
        let outcome = summarize(llm, &config, &sections, "primary").await.unwrap();
        assert!(outcome.validated);
        assert_eq!(outcome.model_used, "primary");
    }

    #[tokio::test]
    async fn summarize_repairs_invalid_output_once() {
        let llm = Arc::new(FixtureLlm::new().script("primary",
                vec![
                    Ok("not hebrew text with no bullets".to_string()),
                    Ok("- פסק מתוקן\n- הלכה למעשה".to_string()),
        ]));
        let config = Config::default();
        let sections = vec![SummarySection {
                label: "Shulchan Arukh",
                combined_text: "טקסט מקור",
        }];
        let outcome = summarize(llm, &config, &sections, "primary").await.unwrap();
        assert!(outcome.validated);
        assert!(outcome.summary.contains("הלכה למעשה"));
    }

    #[tokio::test]
    async fn summarize_keeps_invalid_flag_when_repair_fails() {
        let llm = Arc::new(FixtureLlm::new().script("primary",
                vec![Ok("not hebrew text with no bullets".to_string()), Err("invalid request".to_string())]));
        let config = Config::default();
        let sections = vec![SummarySection {
                label: "Shulchan Arukh",
                combined_text: "טקסט מקור",
        }];
        let outcome = summarize(llm, &config, &sections, "primary").await.unwrap();
        assert!(!outcome.validated);
        assert!(!outcome.validation_errors.is_empty());
    }
}
