use serde::{Deserialize, Serialize};

/// Which memory lane a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Time-stamped event or conversation record, append-only.
    Episodic,
    /// Durable "label: value" fact, retrieved in full per person.
    Semantic,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Episodic => "episodic",
            MemoryKind::Semantic => "semantic",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "semantic" | "profile" | "fact" => MemoryKind::Semantic,
            _ => MemoryKind::Episodic,
        }
    }
}
