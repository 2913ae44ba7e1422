use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{DoseLog, Goal, Person, PrescriptionPlan};

/// Person persistence. Persons are never deleted, only deactivated.
#[async_trait]
pub trait PersonStore: Send + Sync {
    /// Create a person record. Returns the new person's ID.
    /// Fails when the username is already taken.
    async fn create_person(&self, person: &Person) -> anyhow::Result<i64>;

    /// Get a person by their database ID.
    async fn get_person(&self, id: i64) -> anyhow::Result<Option<Person>>;

    /// Look up a person by their unique username.
    async fn get_person_by_username(&self, username: &str) -> anyhow::Result<Option<Person>>;

    /// Find a person by display name or username (case-insensitive,
    /// first-name prefix tolerated). Used by fact routing.
    async fn find_person_by_name(&self, name: &str) -> anyhow::Result<Option<Person>>;

    /// All active (non-deactivated) persons.
    async fn get_active_people(&self) -> anyhow::Result<Vec<Person>>;

    /// Deactivate a person. The record and their history stay.
    async fn deactivate_person(&self, id: i64) -> anyhow::Result<()>;
}

/// Prescription plan persistence.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Create a plan. Returns the new plan's ID.
    async fn create_plan(&self, plan: &PrescriptionPlan) -> anyhow::Result<i64>;

    /// Get a plan by ID.
    async fn get_plan(&self, id: i64) -> anyhow::Result<Option<PrescriptionPlan>>;

    /// Active plans for a person.
    async fn get_active_plans(&self, person_id: i64) -> anyhow::Result<Vec<PrescriptionPlan>>;

    /// Find a person's active plan by medication name (case-insensitive).
    async fn find_active_plan_by_name(
        &self,
        person_id: i64,
        name: &str,
    ) -> anyhow::Result<Option<PrescriptionPlan>>;

    /// Flip `active = false` for every plan of a person whose window end has
    /// passed. Idempotent; expiry is monotonic. Returns rows changed.
    ///
    /// This is the mechanism behind the scheduler pass — call it through
    /// `scheduler::expire_plans`, which is the single policy site for the
    /// mutation.
    async fn deactivate_expired_plans(
        &self,
        person_id: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64>;
}

/// Dose event persistence. Append-only.
#[async_trait]
pub trait DoseLogStore: Send + Sync {
    /// Record a dose event. Returns the new log's ID.
    async fn log_dose(&self, log: &DoseLog) -> anyhow::Result<i64>;

    /// Dose logs for a plan on the calendar day containing `now` (UTC).
    async fn get_doses_for_day(
        &self,
        plan_id: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DoseLog>>;
}

/// Goal persistence.
#[async_trait]
pub trait GoalStore: Send + Sync {
    /// Create a goal for a person. Returns the new goal's ID.
    async fn create_goal(&self, person_id: i64, text: &str) -> anyhow::Result<i64>;

    /// Incomplete goals for a person.
    async fn get_incomplete_goals(&self, person_id: i64) -> anyhow::Result<Vec<Goal>>;

    /// All goals for a person (staff view).
    async fn get_goals(&self, person_id: i64) -> anyhow::Result<Vec<Goal>>;

    /// Mark a goal completed, stamping `completed_at`. Returns false when the
    /// goal was already completed — the stamp is written at most once.
    async fn complete_goal(&self, goal_id: i64, completed_at: DateTime<Utc>)
        -> anyhow::Result<bool>;
}

/// Facade trait so call sites can hold one `Arc<dyn CareStore>` while new
/// code depends on the focused store traits.
pub trait CareStore: Send + Sync + PersonStore + PlanStore + DoseLogStore + GoalStore {}

impl<T> CareStore for T where T: Send + Sync + PersonStore + PlanStore + DoseLogStore + GoalStore {}
