use async_trait::async_trait;
use serde_json::Value;

/// Model provider — sends a message history to an LLM, gets back a response.
///
/// One provider serves three distinct call sites (companion reply, fact
/// extraction, completion judgment); the typed prompt/output contracts live
/// at those call sites, not here.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(&self, model: &str, messages: &[Value]) -> anyhow::Result<ProviderResponse>;
}

/// Token usage statistics from an LLM API response.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model: String,
}

/// The LLM's response text plus usage metadata.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: Option<String>,
    pub usage: Option<TokenUsage>,
}
