//! Test infrastructure: MockProvider, MockMemoryService, and TestHarness.
//!
//! Provides a fully wired orchestrator with a mock LLM, an in-memory memory
//! service, and a temp-file SQLite store, suitable for integration tests
//! that exercise the real turn pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::careplan::CarePlanService;
use crate::llm::LlmClient;
use crate::orchestrator::TurnOrchestrator;
use crate::state::SqliteStateStore;
use crate::traits::{
    CareStore, EpisodicHit, MemoryStore, ModelProvider, ProviderResponse, TokenUsage,
};

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// A recorded call to `MockProvider::chat()`.
#[derive(Debug, Clone)]
pub struct MockChatCall {
    pub model: String,
    pub messages: Vec<Value>,
}

/// Mock LLM provider that returns scripted responses in FIFO order.
pub struct MockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    pub call_log: Mutex<Vec<MockChatCall>>,
    fail_all: bool,
}

impl MockProvider {
    /// A provider that always returns "Mock response".
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            call_log: Mutex::new(Vec::new()),
            fail_all: false,
        }
    }

    /// A provider with a FIFO queue of scripted responses.
    pub fn with_responses(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_log: Mutex::new(Vec::new()),
            fail_all: false,
        }
    }

    /// A provider whose every call fails — the ResponseUnavailable path.
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            call_log: Mutex::new(Vec::new()),
            fail_all: true,
        }
    }

    /// Helper: build a text-only ProviderResponse.
    pub fn text_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            content: Some(text.to_string()),
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                model: "mock".to_string(),
            }),
        }
    }

    /// How many times `chat()` was called.
    pub async fn call_count(&self) -> usize {
        self.call_log.lock().await.len()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn chat(&self, model: &str, messages: &[Value]) -> anyhow::Result<ProviderResponse> {
        self.call_log.lock().await.push(MockChatCall {
            model: model.to_string(),
            messages: messages.to_vec(),
        });

        if self.fail_all {
            anyhow::bail!("mock provider unavailable");
        }

        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            Ok(MockProvider::text_response("Mock response"))
        } else {
            Ok(responses.remove(0))
        }
    }
}

// ---------------------------------------------------------------------------
// MockMemoryService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredEpisodic {
    pub person: String,
    pub text: String,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredSemantic {
    pub person: String,
    pub key: String,
    pub value: String,
    pub category: String,
}

/// In-memory memory service. `set_fail(true)` simulates the service being
/// unreachable so tests can exercise the degraded-context path.
#[derive(Default)]
pub struct MockMemoryService {
    pub episodic: Mutex<Vec<StoredEpisodic>>,
    pub semantic: Mutex<Vec<StoredSemantic>>,
    fail: AtomicBool,
}

impl MockMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("mock memory service unreachable");
        }
        Ok(())
    }

    pub async fn episodic_for(&self, person: &str) -> Vec<StoredEpisodic> {
        self.episodic
            .lock()
            .await
            .iter()
            .filter(|r| r.person == person)
            .cloned()
            .collect()
    }

    pub async fn semantic_for(&self, person: &str) -> Vec<StoredSemantic> {
        self.semantic
            .lock()
            .await
            .iter()
            .filter(|r| r.person == person)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MemoryStore for MockMemoryService {
    async fn remember_episodic(
        &self,
        person: &str,
        text: &str,
        tags: &[&str],
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.check()?;
        self.episodic.lock().await.push(StoredEpisodic {
            person: person.to_string(),
            text: text.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            timestamp,
        });
        Ok(())
    }

    async fn remember_semantic(
        &self,
        person: &str,
        key: &str,
        value: &str,
        category: &str,
    ) -> anyhow::Result<()> {
        self.check()?;
        self.semantic.lock().await.push(StoredSemantic {
            person: person.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            category: category.to_string(),
        });
        Ok(())
    }

    async fn retrieve_episodic(
        &self,
        person: &str,
        _query: &str,
        top_k: usize,
    ) -> anyhow::Result<Vec<EpisodicHit>> {
        self.check()?;
        let mut hits: Vec<EpisodicHit> = self
            .episodic
            .lock()
            .await
            .iter()
            .filter(|r| r.person == person)
            .map(|r| EpisodicHit {
                text: r.text.clone(),
                score: None,
                timestamp: Some(r.timestamp),
            })
            .collect();
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn retrieve_semantic(&self, person: &str) -> anyhow::Result<Vec<String>> {
        self.check()?;
        Ok(self
            .semantic
            .lock()
            .await
            .iter()
            .filter(|r| r.person == person)
            .map(|r| format!("{}: {}", r.key, r.value))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// TestHarness
// ---------------------------------------------------------------------------

/// Everything needed to run integration tests against the turn pipeline.
pub struct TestHarness {
    pub orchestrator: TurnOrchestrator,
    pub careplan: CarePlanService,
    pub store: Arc<SqliteStateStore>,
    pub provider: Arc<MockProvider>,
    pub memory: Arc<MockMemoryService>,
    /// Keep the temp file alive — DB is deleted when this drops.
    _db_file: tempfile::NamedTempFile,
}

/// Build a fully wired orchestrator with a mock provider, mock memory, and a
/// temp-file SQLite DB. Each call creates an isolated database, so tests can
/// run in parallel.
pub async fn setup_test_runtime(provider: MockProvider) -> anyhow::Result<TestHarness> {
    let db_file = tempfile::NamedTempFile::new()?;
    let db_path = db_file.path().to_str().unwrap().to_string();

    let store = Arc::new(SqliteStateStore::new(&db_path).await?);
    let provider = Arc::new(provider);
    let memory = Arc::new(MockMemoryService::new());

    let llm = LlmClient::new(
        provider.clone() as Arc<dyn ModelProvider>,
        "mock-model".to_string(),
        "mock-model".to_string(),
        5,
    );

    let careplan = CarePlanService::new(
        store.clone() as Arc<dyn CareStore>,
        memory.clone() as Arc<dyn MemoryStore>,
    );
    let orchestrator = TurnOrchestrator::new(
        store.clone() as Arc<dyn CareStore>,
        memory.clone() as Arc<dyn MemoryStore>,
        llm,
        12,
    );

    Ok(TestHarness {
        orchestrator,
        careplan,
        store,
        provider,
        memory,
        _db_file: db_file,
    })
}
