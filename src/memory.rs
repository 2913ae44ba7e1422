//! HTTP client for the external episodic/semantic memory service.
//!
//! The service exposes a session-scoped memory API: episodic records go to
//! `/v1/memories` and are searched via `/v1/memories/search`; semantic
//! (profile) facts go to `/v1/memories/profile` and are searched via
//! `/v1/memories/profile/search`. Search responses come back in several
//! shapes depending on the deployment, so parsing is deliberately tolerant.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::traits::{EpisodicHit, MemoryStore};

const APP_ID: &str = "caremind";
/// Shared group for semantic/profile records; episodic records are grouped
/// per person.
const PROFILE_GROUP: &str = "caremind_profiles";
/// Search over-fetch factor: the per-user filter below discards records that
/// belong to other members of the group.
const OVERFETCH: usize = 3;

pub struct MemoryServiceClient {
    client: Client,
    base_url: String,
}

impl MemoryServiceClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Service liveness probe.
    pub async fn health(&self) -> anyhow::Result<Value> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    fn session(&self, group_id: &str, person: &str) -> Value {
        json!({
            "group_id": group_id,
            "agent_id": [APP_ID],
            "user_id": [person],
            "session_id": person,
        })
    }

    async fn post_json(&self, path: &str, payload: &Value) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).json(payload).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            anyhow::bail!("memory service {} returned {}: {}", path, status, text);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl MemoryStore for MemoryServiceClient {
    async fn remember_episodic(
        &self,
        person: &str,
        text: &str,
        tags: &[&str],
        timestamp: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let payload = json!({
            "session": self.session(person, person),
            "producer": person,
            "produced_for": person,
            "episode_content": text,
            "episode_type": "memory_entry",
            "metadata": {
                "tags": tags,
                "actual_user_id": person,
                "timestamp": timestamp.to_rfc3339(),
            },
        });
        debug!(person, tags = ?tags, "Storing episodic record");
        self.post_json("/v1/memories", &payload).await?;
        Ok(())
    }

    async fn remember_semantic(
        &self,
        person: &str,
        key: &str,
        value: &str,
        category: &str,
    ) -> anyhow::Result<()> {
        let payload = json!({
            "session": self.session(PROFILE_GROUP, person),
            "producer": person,
            "produced_for": person,
            "episode_content": format!("{}: {}", key, value),
            "episode_type": category,
            "metadata": {
                "type": "profile",
                "key": key,
                "value": value,
                "category": category,
                "actual_user_id": person,
            },
        });
        debug!(person, key, category, "Storing semantic fact");
        self.post_json("/v1/memories/profile", &payload).await?;
        Ok(())
    }

    async fn retrieve_episodic(
        &self,
        person: &str,
        query: &str,
        top_k: usize,
    ) -> anyhow::Result<Vec<EpisodicHit>> {
        let payload = json!({
            "session": self.session(person, person),
            "query": query,
            "limit": top_k * OVERFETCH,
        });

        let data = self.post_json("/v1/memories/search", &payload).await?;
        let records = flatten_search_results(&data, "episodic_memory");

        let mut hits: Vec<EpisodicHit> = records
            .into_iter()
            .filter(|r| record_owner(r) == Some(person))
            .filter_map(|r| {
                let text = record_text(&r)?;
                Some(EpisodicHit {
                    text,
                    score: r.get("score").and_then(Value::as_f64),
                    timestamp: record_timestamp(&r),
                })
            })
            .collect();

        // The service ranks by relevance; break score ties by recency,
        // most recent first.
        if hits.iter().any(|h| h.score.is_some()) {
            hits.sort_by(|a, b| {
                let sa = a.score.unwrap_or(f64::MIN);
                let sb = b.score.unwrap_or(f64::MIN);
                sb.partial_cmp(&sa)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.timestamp.cmp(&a.timestamp))
            });
        }

        hits.truncate(top_k);
        Ok(hits)
    }

    async fn retrieve_semantic(&self, person: &str) -> anyhow::Result<Vec<String>> {
        let payload = json!({
            "session": self.session(PROFILE_GROUP, person),
            "query": "profile information",
            "filter": { "produced_for_id": person },
            "limit": 50,
        });

        let data = self.post_json("/v1/memories/profile/search", &payload).await?;
        let records = flatten_search_results(&data, "profile_memory");

        Ok(records
            .into_iter()
            .filter(|r| {
                // Profile results carry ownership either as produced_for_id
                // or in the metadata block.
                r.get("produced_for_id").and_then(Value::as_str) == Some(person)
                    || record_owner(r) == Some(person)
            })
            .filter_map(|r| record_text(&r))
            .collect())
    }
}

/// Flatten the service's search response into a flat record list.
///
/// Known shapes:
/// - `{"content": {"<section>": [[...], [...], [...]]}}` — nested buckets,
///   records live in the leading buckets
/// - `{"results": [...]}`
/// - a bare top-level array
fn flatten_search_results(data: &Value, section: &str) -> Vec<Value> {
    if let Some(buckets) = data
        .get("content")
        .and_then(|c| c.get(section))
        .and_then(Value::as_array)
    {
        let mut out = Vec::new();
        for bucket in buckets {
            if let Some(items) = bucket.as_array() {
                out.extend(items.iter().filter(|v| v.is_object()).cloned());
            }
        }
        return out;
    }

    if let Some(results) = data.get("results").and_then(Value::as_array) {
        return results.iter().filter(|v| v.is_object()).cloned().collect();
    }

    if let Some(items) = data.as_array() {
        return items.iter().filter(|v| v.is_object()).cloned().collect();
    }

    warn!("Unrecognized memory search response shape");
    Vec::new()
}

fn record_owner(record: &Value) -> Option<&str> {
    record
        .get("user_metadata")
        .or_else(|| record.get("metadata"))
        .and_then(|m| m.get("actual_user_id"))
        .and_then(Value::as_str)
}

fn record_text(record: &Value) -> Option<String> {
    for key in ["content", "episode_content", "text"] {
        if let Some(text) = record.get(key).and_then(Value::as_str) {
            if !text.trim().is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

fn record_timestamp(record: &Value) -> Option<DateTime<Utc>> {
    for key in ["timestamp", "created_at"] {
        let raw = record
            .get(key)
            .or_else(|| record.get("user_metadata").and_then(|m| m.get(key)))
            .and_then(Value::as_str);
        if let Some(raw) = raw {
            if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
                return Some(ts.with_timezone(&Utc));
            }
        }
    }
    None
}
