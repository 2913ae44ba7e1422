use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub turn: TurnConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// API key for the OpenAI-compatible endpoint. Falls back to the
    /// OPENAI_API_KEY environment variable when empty.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub models: ModelsConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModelsConfig {
    /// Conversational replies.
    #[serde(default)]
    pub primary: String,
    /// Extraction and completion judgment. Defaults to `primary`.
    #[serde(default)]
    pub fast: String,
}

impl ModelsConfig {
    pub fn apply_defaults(&mut self) {
        if self.primary.is_empty() {
            self.primary = "gpt-4o-mini".to_string();
        }
        if self.fast.is_empty() {
            self.fast = self.primary.clone();
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_base_url")]
    pub base_url: String,
    #[serde(default = "default_memory_timeout")]
    pub timeout_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_memory_base_url(),
            timeout_secs: default_memory_timeout(),
        }
    }
}

fn default_memory_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_memory_timeout() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "caremind.db".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TurnConfig {
    /// Episodic snippets retrieved per turn.
    #[serde(default = "default_top_k")]
    pub episodic_top_k: usize,
    /// Hard timeout applied to every LLM call.
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            episodic_top_k: default_top_k(),
            llm_timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_top_k() -> usize {
    12
}

fn default_llm_timeout() -> u64 {
    60
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
        let mut config: AppConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;

        if config.provider.api_key.is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                config.provider.api_key = key;
            }
        }
        if config.provider.api_key.is_empty() {
            anyhow::bail!(
                "No API key: set provider.api_key in {} or export OPENAI_API_KEY",
                path.display()
            );
        }

        config.provider.models.apply_defaults();
        Ok(config)
    }
}
