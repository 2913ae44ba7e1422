use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One ranked episodic recall result.
#[derive(Debug, Clone)]
pub struct EpisodicHit {
    pub text: String,
    /// Relevance score reported by the memory service, when it reports one.
    pub score: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// External episodic/semantic memory service.
///
/// Must tolerate being queried for a person with zero history — that returns
/// an empty list, not an error. Transport failures DO return errors; the
/// fusion reader absorbs them into a degraded context.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append an episodic (event/conversation) record for a person.
    async fn remember_episodic(
        &self,
        person: &str,
        text: &str,
        tags: &[&str],
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    /// Append a semantic "key: value" fact for a person. No uniqueness is
    /// enforced — later writes are recall candidates, not overwrites.
    async fn remember_semantic(
        &self,
        person: &str,
        key: &str,
        value: &str,
        category: &str,
    ) -> anyhow::Result<()>;

    /// Retrieve the top-K episodic records ranked by relevance to `query`,
    /// ties broken by recency (most recent first).
    async fn retrieve_episodic(
        &self,
        person: &str,
        query: &str,
        top_k: usize,
    ) -> anyhow::Result<Vec<EpisodicHit>>;

    /// Retrieve the person's full semantic fact set, unranked.
    async fn retrieve_semantic(&self, person: &str) -> anyhow::Result<Vec<String>>;
}
