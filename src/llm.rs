use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use crate::traits::ModelProvider;

/// Thin wrapper over the model capability: model tier selection plus a hard
/// timeout on every call. The three turn-pipeline call sites (reply,
/// extraction, completion judgment) each own their prompt and output
/// contract and share only this plumbing.
#[derive(Clone)]
pub struct LlmClient {
    provider: Arc<dyn ModelProvider>,
    primary_model: String,
    fast_model: String,
    call_timeout: Duration,
}

impl LlmClient {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        primary_model: String,
        fast_model: String,
        call_timeout_secs: u64,
    ) -> Self {
        Self {
            provider,
            primary_model,
            fast_model,
            call_timeout: Duration::from_secs(call_timeout_secs),
        }
    }

    /// Conversational completion on the primary model.
    pub async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        self.call(&self.primary_model, system, user).await
    }

    /// Constrained classification/extraction completion on the fast model.
    pub async fn complete_fast(&self, system: &str, user: &str) -> anyhow::Result<String> {
        self.call(&self.fast_model, system, user).await
    }

    async fn call(&self, model: &str, system: &str, user: &str) -> anyhow::Result<String> {
        let messages = vec![
            json!({"role": "system", "content": system}),
            json!({"role": "user", "content": user}),
        ];

        let response = tokio::time::timeout(self.call_timeout, self.provider.chat(model, &messages))
            .await
            .map_err(|_| {
                warn!(model, timeout_secs = self.call_timeout.as_secs(), "LLM call timed out");
                anyhow::anyhow!("LLM call timed out after {}s", self.call_timeout.as_secs())
            })??;

        match response.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => anyhow::bail!("LLM returned an empty response"),
        }
    }
}
