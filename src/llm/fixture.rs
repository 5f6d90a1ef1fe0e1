//! A scriptable in-memory [`Llm`] for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::Llm;

/// Replays a scripted sequence of outcomes per model, in call order.
/// Once a model's queue is drained, further calls return an error
/// naming the model, so a test that over-calls fails loudly instead of
/// hanging.
#[derive(Default)]
pub struct FixtureLlm {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
}

impl FixtureLlm {
    /// Builds an empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the ordered sequence of outcomes `model` will return,
    /// one per call.
    #[must_use]
    pub fn script(self, model: &str, outcomes: Vec<Result<String, String>>) -> Self {
        self.scripts
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .insert(model.to_string(), outcomes.into());
        self
    }
}

#[async_trait]
impl Llm for FixtureLlm {
    async fn generate(&self, model: &str, _prompt: &str) -> Result<String, String> {
        let mut scripts = self.scripts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        scripts
        .get_mut(model)
        .and_then(VecDeque::pop_front)
        .unwrap_or_else(|| Err(format!("no scripted response left for model {model}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_outcomes_in_order() {
        let llm = FixtureLlm::new().script("m", vec![Ok("one".to_string()), Ok("two".to_string())]);
        assert_eq!(llm.generate("m", "p").await, Ok("one".to_string()));
        assert_eq!(llm.generate("m", "p").await, Ok("two".to_string()));
    }

    #[tokio::test]
    async fn errors_loudly_once_drained() {
        let llm = FixtureLlm::new().script("m", vec![Ok("one".to_string())]);
        let _ = llm.generate("m", "p").await;
        let result = llm.generate("m", "p").await;
        assert!(result.is_err());
    }
}
