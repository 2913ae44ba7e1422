mod memory;
mod provider;
mod store;

pub use memory::{EpisodicHit, MemoryStore};
pub use provider::{ModelProvider, ProviderResponse, TokenUsage};
pub use store::{CareStore, DoseLogStore, GoalStore, PersonStore, PlanStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A person enrolled in the care program (patient or staff).
///
/// Persons are created at enrollment and never deleted — only deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    /// Unique stable identifier. Memory records are keyed by this.
    pub username: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hobbies: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A prescribed medication schedule with a validity window.
///
/// `active` is flipped to false by the scheduler pass once `window_end`
/// passes — that pass is the only writer of the flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionPlan {
    pub id: i64,
    pub person_id: i64,
    pub name: String,
    pub times_per_day: i32,
    /// Comma-separated "HH:MM" dose times. None = spread evenly over the day.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dose_times: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub active: bool,
    pub window_start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One recorded dose event. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoseLog {
    pub id: i64,
    pub plan_id: i64,
    pub taken_at: DateTime<Utc>,
    /// Index of the dose window this log landed in, or None when the dose
    /// was logged outside every window (it still counts toward the day's
    /// total, but satisfies no specific slot).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<i32>,
}

/// A therapeutic objective assigned by staff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub person_id: i64,
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    /// Set exactly once when the completion detector fires; immutable after.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
