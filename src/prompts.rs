//! Hebrew prompt templates for explanation and summary generation.
//!
//! Builder functions assemble the final prompt string from a chunk's
//! inputs with small template constants plus plain string building,
//! rather than a templating engine.

/// Monotonic prompt-version tag. Bumping this invalidates every cached
/// explanation, since [`crate::domain::records::ExplanationRecord::matches()`]
/// requires an exact match.
pub const EXPLANATION_PROMPT_VERSION: &str = "v3.4-rabbanut";

/// Prompt-version tag for the summary producer. Summaries are not
/// individually cached by content hash the way explanations are, but
/// the tag is still carried so a future cache layer can key on it.
pub const SUMMARY_PROMPT_VERSION: &str = "v1.0-rabbanut";

const EXPLANATION_SYSTEM_PREAMBLE: &str = "\
הנחיות: ענה בעברית בלבד. צטט כל מילה מהמקור לפי הסדר והדגש אותה בכוכביות \
כפולות (**כך**). הבהר מונחים לא ברורים בתוך הטקסט עצמו, ללא שימוש בסוגריים. \
תרגם קטעים בארמית. פרש ראשי תיבות וקיצורים בתוך הטקסט. כאשר מובאת דעה, ציין \
את שם הפוסק שאמר אותה. אם קיימת מחלוקת בין פוסקים, ציין את ההכרעה בסוף \
ההסבר. אין לכתוב הקדמה או סיכום מחוץ לגוף ההסבר עצמו.";

/// Builds the explanation prompt (generation).
///
/// `previous` is the N-1 context pair `(previous_text, previous_explanation)`,
/// included iff the caller is mid-corpus past the first chunk.
/// `companion_text` is the later-commentary's raw text for the same
/// paragraph, included iff present and `corpus_label` names the primary.
#[must_use]
pub fn explanation_prompt(current_segment: &str,
    previous: Option<(&str, &str)>,
    companion_text: Option<&str>,
    corpus_label: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(EXPLANATION_SYSTEM_PREAMBLE);
    prompt.push('\n');

    if let Some((prev_text, prev_explanation)) = previous {
        prompt.push_str("\nהקטע הקודם ברצף לצורך הקשר בלבד:\n");
        prompt.push_str(prev_text);
        prompt.push_str("\nההסבר שניתן לקטע הקודם:\n");
        prompt.push_str(prev_explanation);
        prompt.push('\n');
    }

    if let Some(companion) = companion_text {
        prompt.push_str("\nקטע מקביל מהפרשנות המאוחרת לאותו סעיף:\n");
        prompt.push_str(companion);
        prompt.push('\n');
    }

    prompt.push_str(&format!("\nמקור להסבר ({corpus_label}):\n"));
    prompt.push_str(current_segment);
    prompt.push_str("\n\nהסבר:");
    prompt
}

/// Builds the explanation repair prompt (validation/repair,
///): instructs a Hebrew rewrite preserving order and bold spans.
#[must_use]
pub fn explanation_repair_prompt(rejected_output: &str) -> String {
    format!("ההסבר הבא אינו עומד בדרישת הכתיבה בעברית בלבד. כתוב מחדש את ההסבר \
 כולו בעברית, תוך שמירה על סדר המילים המקוריות ועל הדגשת הכוכביות \
 הכפולות הקיימות. אל תוסיף הקדמה או סיכום.\n\nהסבר לתיקון:\n{rejected_output}\n\nהסבר מתוקן:")
}

/// One participating corpus's explanations, combined text under a
/// labeled section.
pub struct SummarySection<'a> {
    /// The corpus's display label (used as the section header).
    pub label: &'a str,
    /// Concatenated per-chunk explanations for this corpus.
    pub combined_text: &'a str,
}

/// Builds the combined-text-to-summary prompt.
///
/// `sections` holds one entry per participating corpus that produced
/// explanations (i.e. excludes `later_commentary`, which is
/// `companionText`-only and never summarized on its own).
#[must_use]
pub fn summary_prompt(sections: &[SummarySection<'_>]) -> String {
    let has_primary = sections.iter().any(|s| s.label == "Shulchan Arukh");

    let mut prompt = String::new();
    prompt.push_str("הנחיות: ענה בעברית בלבד. הפק סיכום הלכתי מובנה מתוך המקורות הבאים, \
 בפורמט של נקודות (בולטים). הדגש שמות פוסקים בכוכביות כפולות. אל תפתח \
 במילים כגון \"הנה\", \"להלן\", \"סיכום מתוקן\" או \"ניסוח מחדש\" — עבור \
 ישירות לתוכן. המבנה הנדרש:\n");

    if sections.len() >= 2 && has_primary {
        prompt.push_str("- ריכוז דעות הפוסקים (אם קיימת יותר מדעה אחת)\n");
    }
    if has_primary {
        prompt.push_str("- פסק ההלכה העיקרי על פי השולחן ערוך\n");
    }
    if sections.iter().any(|s| s.label == "Mishnah Berurah") {
        prompt.push_str("- תוספות ועדכונים מהמשנה ברורה\n");
    }
    prompt.push_str("- הלכה למעשה, כסיכום מסכם בסוף\n\n");

    prompt.push_str("מקורות:\n");
    for section in sections {
        prompt.push_str(&format!("\n== {} ==\n{}\n", section.label, section.combined_text));
    }

    prompt.push_str("\nסיכום:");
    prompt
}

/// Builds the summary repair prompt (validation/repair):
/// instructs a re-emission that respects the validator's errors.
#[must_use]
pub fn summary_repair_prompt(rejected_output: &str, validation_errors: &[String]) -> String {
    let errors = if validation_errors.is_empty() {
        "הפורמט אינו תקין".to_string()
    } else {
        validation_errors.join("; ")
    };
    format!("הסיכום הבא אינו עומד בדרישות הבאות: {errors}. כתוב מחדש את הסיכום \
 כולו בעברית בלבד, בפורמט נקודות, תוך תיקון הבעיות שצוינו.\n\nסיכום לתיקון:\n{rejected_output}\n\nסיכום מתוקן:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explanation_prompt_includes_context_when_present() {
        let prompt = explanation_prompt("טקסט נוכחי", Some(("קודם", "הסבר קודם")), None, "Tur");
        assert!(prompt.contains("טקסט נוכחי"));
        assert!(prompt.contains("הקטע הקודם"));
        assert!(prompt.contains("הסבר קודם"));
    }

    #[test]
    fn explanation_prompt_omits_context_when_absent() {
        let prompt = explanation_prompt("טקסט נוכחי", None, None, "Tur");
        assert!(!prompt.contains("הקטע הקודם"));
    }

    #[test]
    fn explanation_prompt_includes_companion_only_when_present() {
        let prompt = explanation_prompt("טקסט", None, Some("קטע מקביל"), "Shulchan Arukh");
        assert!(prompt.contains("קטע מקביל"));
        assert!(prompt.contains("פרשנות המאוחרת"));
    }

    #[test]
    fn summary_prompt_includes_majority_section_only_with_two_corpora_and_primary() {
        let sections = vec![
            SummarySection {
                label: "Shulchan Arukh",
                combined_text: "א",
            },
            SummarySection {
                label: "Tur",
                combined_text: "ב",
            },
        ];
        let prompt = summary_prompt(&sections);
        assert!(prompt.contains("ריכוז דעות הפוסקים"));
    }

    #[test]
    fn summary_prompt_omits_majority_section_for_single_corpus() {
        let sections = vec![SummarySection {
                label: "Shulchan Arukh",
                combined_text: "א",
        }];
        let prompt = summary_prompt(&sections);
        assert!(!prompt.contains("ריכוז דעות הפוסקים"));
    }

    #[test]
    fn repair_prompts_carry_original_text() {
        assert!(explanation_repair_prompt("טקסט שגוי").contains("טקסט שגוי"));
        assert!(summary_repair_prompt("סיכום שגוי", &["חסרה נקודה".to_string()]).contains("סיכום שגוי"));
    }
}
