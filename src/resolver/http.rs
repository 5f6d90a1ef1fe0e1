//! HTTP-backed [`TextProvider`].

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::resolver::{RawLinksResponse, RawTextResponse, TextProvider};

/// Calls the real upstream text/link API over HTTP.
pub struct HttpTextProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTextProvider {
    /// Builds a provider against `base_url` (e.g.
    /// `https://www.sefaria.org/api`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TextProvider for HttpTextProvider {
    async fn fetch_text(&self, ref_string: &str) -> Result<RawTextResponse, ProviderError> {
        let url = format!(
            "{}/v3/texts/{}?lang=he&context=0",
            self.base_url,
            urlencoding::encode(ref_string)
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::NotFound {
                reference: ref_string.to_string(),
            });
        }
        response
            .json::<RawTextResponse>()
            .await
            .map_err(|e| ProviderError::SchemaDrift {
                reference: ref_string.to_string(),
                reason: e.to_string(),
            })
    }

    async fn fetch_links(&self, ref_string: &str) -> Result<RawLinksResponse, ProviderError> {
        let url = format!(
            "{}/links/{}",
            self.base_url,
            urlencoding::encode(ref_string)
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::NotFound {
                reference: ref_string.to_string(),
            });
        }
        response
            .json::<RawLinksResponse>()
            .await
            .map_err(|e| ProviderError::SchemaDrift {
                reference: ref_string.to_string(),
                reason: e.to_string(),
            })
    }
}
