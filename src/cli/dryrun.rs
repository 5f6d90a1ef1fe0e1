//! In-memory placeholder providers for `guide-weaver guide --dry-run`.
//!
//! Unlike [`crate::resolver::fixture::FixtureTextProvider`] and
//! [`crate::llm::fixture::FixtureLlm`], which are scripted with exact
//! expected calls for tests, these always succeed for any input, so an
//! operator can exercise the full pipeline end to end without network
//! access or model credentials.

use async_trait::async_trait;
use serde_json::json;

use crate::error::ProviderError;
use crate::llm::Llm;
use crate::resolver::{RawLinksResponse, RawTextResponse, TextProvider};

/// Returns canned Hebrew placeholder text for any reference, and no
/// links.
#[derive(Debug, Default)]
pub struct CannedTextProvider;

#[async_trait]
impl TextProvider for CannedTextProvider {
    async fn fetch_text(&self, ref_string: &str) -> Result<RawTextResponse, ProviderError> {
        Ok(RawTextResponse {
                provider_ref: ref_string.to_string(),
                he: json!([format!("טקסט מקור לדוגמה עבור {ref_string} (מצב בדיקה מקומית).")]),
        })
    }

    async fn fetch_links(&self, _ref_string: &str) -> Result<RawLinksResponse, ProviderError> {
        Ok(RawLinksResponse::Array(Vec::new()))
    }
}

/// Returns a fixed, validation-passing Hebrew explanation for any
/// model/prompt.
#[derive(Debug, Default)]
pub struct CannedLlm;

#[async_trait]
impl Llm for CannedLlm {
    async fn generate(&self, _model: &str, _prompt: &str) -> Result<String, String> {
        Ok("זהו הסבר לדוגמה שנוצר במצב בדיקה מקומית, ללא קריאה לשירות חיצוני.\n\
 - נקודה לדוגמה אחת\n\
 - נקודה לדוגמה שנייה"
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn canned_provider_answers_any_ref() {
        let provider = CannedTextProvider;
        let response = provider.fetch_text("Tur, Orach Chayim 24").await.unwrap();
        assert_eq!(response.provider_ref, "Tur, Orach Chayim 24");
        let links = provider.fetch_links("anything").await.unwrap();
        match links {
            RawLinksResponse::Array(entries) => assert!(entries.is_empty()),
            RawLinksResponse::Wrapped {.. } => panic!("unexpected variant"),
        }
    }

    #[tokio::test]
    async fn canned_llm_always_succeeds() {
        let llm = CannedLlm;
        for _ in 0..5 {
            assert!(llm.generate("any-model", "any prompt").await.is_ok());
        }
    }
}
