//! `async-openai`-backed [`Llm`] implementation.
//!
//! The upstream provider in production is an opaque text-in/text-out
//! service with configurable model identifiers; `async-openai` is the
//! concrete gateway for exactly this shape of call.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs};
use async_trait::async_trait;

use crate::llm::Llm;

/// Calls a real model endpoint through the `OpenAI`-compatible chat
/// completions API.
pub struct OpenAiLlm {
    client: Client<OpenAIConfig>,
}

impl OpenAiLlm {
    /// Builds a client against an explicit API key (and, optionally, a
    /// non-default base URL for OpenAI-compatible gateways).
    #[must_use]
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(config),
        }
    }

    /// Builds a client from the ambient `OPENAI_API_KEY`/`OPENAI_API_BASE`
    /// environment, following `async-openai`'s own conventions.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Llm for OpenAiLlm {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, String> {
        let message = ChatCompletionRequestUserMessageArgs::default()
        .content(prompt)
        .build()
        .map_err(|e| e.to_string())?;

        let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages(vec![ChatCompletionRequestMessage::User(message)])
        .build()
        .map_err(|e| e.to_string())?;

        let response = self
        .client
        .chat()
        .create(request)
        .await
        .map_err(|e| e.to_string())?;

        response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| format!("model {model} returned no content"))
    }
}
