//! An in-memory [`TextProvider`] fixture for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::resolver::{RawLinksResponse, RawTextResponse, TextProvider};
use crate::error::ProviderError;

/// A scriptable text/link provider backed by in-memory maps, keyed by
/// the exact ref string a caller requests.
#[derive(Default)]
pub struct FixtureTextProvider {
    texts: RwLock<HashMap<String, RawTextResponse>>,
    links: RwLock<HashMap<String, RawLinksResponse>>,
}

impl FixtureTextProvider {
    /// Builds an empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a text response for `requested_ref`. `canonical_ref`
    /// becomes the `ref` field the caller stores, which may differ
    /// from `requested_ref`.
    pub fn with_text(self, requested_ref: &str, canonical_ref: &str, he: Value) -> Self {
        self.texts.write().unwrap().insert(requested_ref.to_string(),
            RawTextResponse {
                provider_ref: canonical_ref.to_string(),
                he,
        });
        self
    }

    /// Registers a links response for `requested_ref`.
    pub fn with_links(self, requested_ref: &str, entries: Vec<Value>) -> Self {
        self.links
        .write()
        .unwrap()
        .insert(requested_ref.to_string(), RawLinksResponse::Array(entries));
        self
    }

    /// Overwrites a previously-registered text response (for tests that
    /// simulate upstream content changing between revalidation passes).
    pub fn set_text(&self, requested_ref: &str, canonical_ref: &str, he: Value) {
        self.texts.write().unwrap().insert(requested_ref.to_string(),
            RawTextResponse {
                provider_ref: canonical_ref.to_string(),
                he,
        });
    }
}

#[async_trait]
impl TextProvider for FixtureTextProvider {
    async fn fetch_text(&self, ref_string: &str) -> Result<RawTextResponse, ProviderError> {
        self.texts
        .read()
        .unwrap()
        .get(ref_string)
        .cloned()
        .ok_or_else(|| ProviderError::NotFound {
                reference: ref_string.to_string(),
        })
    }

    async fn fetch_links(&self, ref_string: &str) -> Result<RawLinksResponse, ProviderError> {
        Ok(self
            .links
            .read()
            .unwrap()
            .get(ref_string)
            .map(clone_links)
            .unwrap_or(RawLinksResponse::Array(Vec::new())))
    }
}

fn clone_links(response: &RawLinksResponse) -> RawLinksResponse {
    match response {
        RawLinksResponse::Array(entries) => RawLinksResponse::Array(entries.clone()),
        RawLinksResponse::Wrapped { links } => RawLinksResponse::Wrapped { links: links.clone() },
    }
}
