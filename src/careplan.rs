//! Staff-side care-plan operations: enrollment, prescribing, goal
//! assignment, and dose logging. Schedule validation happens here, at
//! creation time — malformed schedules never reach the scheduler. Each
//! mutation dual-writes: the structured row plus the matching episodic
//! event and semantic profile facts.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::scheduler;
use crate::traits::{CareStore, DoseLog, Goal, MemoryStore, Person, PrescriptionPlan};

#[derive(Debug, Clone, Default)]
pub struct NewPerson {
    pub username: String,
    pub full_name: String,
    pub family_info: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub hobbies: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPlan {
    pub name: String,
    pub times_per_day: i32,
    /// Comma-separated "HH:MM" times; None spreads doses evenly.
    pub dose_times: Option<String>,
    pub instructions: Option<String>,
}

pub struct CarePlanService {
    store: Arc<dyn CareStore>,
    memory: Arc<dyn MemoryStore>,
}

impl CarePlanService {
    pub fn new(store: Arc<dyn CareStore>, memory: Arc<dyn MemoryStore>) -> Self {
        Self { store, memory }
    }

    /// Enroll a person. Writes the structured row, then the enrollment
    /// episodic record and the profile semantic facts. Memory writes are
    /// best-effort: the enrollment itself is the source of truth.
    pub async fn enroll(&self, new: NewPerson) -> anyhow::Result<Person> {
        let now = Utc::now();
        let person = Person {
            id: 0,
            username: new.username,
            full_name: new.full_name,
            family_info: new.family_info,
            emergency_contact_name: new.emergency_contact_name,
            emergency_contact_phone: new.emergency_contact_phone,
            hobbies: new.hobbies,
            active: true,
            created_at: now,
        };
        let id = self.store.create_person(&person).await?;
        let person = Person { id, ..person };
        info!(person = %person.username, id, "Enrolled person");

        let episodic = format!(
            "{} enrolled in the care program on {}.",
            person.full_name,
            now.format("%Y-%m-%d")
        );
        self.remember_episodic(&person.username, &episodic, &["enrollment"], now)
            .await;

        self.remember_semantic(&person.username, "full_name", &person.full_name, "personal")
            .await;
        if let Some(family) = person.family_info.as_deref() {
            self.remember_semantic(&person.username, "family_info", family, "personal")
                .await;
        }
        if let Some(hobbies) = person.hobbies.as_deref() {
            self.remember_semantic(&person.username, "hobbies", hobbies, "personal")
                .await;
        }
        if let (Some(name), phone) = (
            person.emergency_contact_name.as_deref(),
            person.emergency_contact_phone.as_deref(),
        ) {
            let value = match phone {
                Some(phone) => format!("{} - Phone: {}", name, phone),
                None => name.to_string(),
            };
            self.remember_semantic(&person.username, "emergency_contact", &value, "emergency_info")
                .await;
        }

        Ok(person)
    }

    /// Prescribe a plan with a validity window of `duration_days`.
    ///
    /// Rejects malformed dose schedules (ScheduleInconsistency lives here,
    /// not in the scheduler) and duplicate active plans of the same name.
    pub async fn prescribe(
        &self,
        person: &Person,
        new: NewPlan,
        duration_days: i64,
    ) -> anyhow::Result<PrescriptionPlan> {
        if new.times_per_day < 1 {
            return Err(scheduler::ScheduleError::BadDoseCount(new.times_per_day).into());
        }
        if let Some(csv) = new.dose_times.as_deref() {
            scheduler::parse_dose_times(csv)?;
        }
        if self
            .store
            .find_active_plan_by_name(person.id, &new.name)
            .await?
            .is_some()
        {
            anyhow::bail!("Active medication '{}' already exists", new.name);
        }

        let now = Utc::now();
        let plan = PrescriptionPlan {
            id: 0,
            person_id: person.id,
            name: new.name,
            times_per_day: new.times_per_day,
            dose_times: new.dose_times,
            instructions: new.instructions,
            active: true,
            window_start: now,
            window_end: Some(now + Duration::days(duration_days)),
            created_at: now,
        };
        let id = self.store.create_plan(&plan).await?;
        let plan = PrescriptionPlan { id, ..plan };
        info!(person = %person.username, plan = %plan.name, id, "Prescribed plan");

        let episodic = format!(
            "Staff added new medication '{}' on {}.",
            plan.name,
            now.format("%Y-%m-%d")
        );
        self.remember_episodic(&person.username, &episodic, &["medication", "staff_action"], now)
            .await;

        let key = format!("medication_{}", plan.name.to_lowercase().replace(' ', "_"));
        let value = format!(
            "{} - {}x daily at {}",
            plan.name,
            plan.times_per_day,
            plan.dose_times.as_deref().unwrap_or("evenly spaced times")
        );
        self.remember_semantic(&person.username, &key, &value, "medical_info")
            .await;

        Ok(plan)
    }

    /// Assign a therapeutic goal.
    pub async fn assign_goal(&self, person: &Person, text: &str) -> anyhow::Result<Goal> {
        let now = Utc::now();
        let id = self.store.create_goal(person.id, text).await?;
        info!(person = %person.username, goal_id = id, "Assigned goal");

        let episodic = format!(
            "Staff assigned new goal on {}: {}",
            now.format("%Y-%m-%d"),
            text
        );
        self.remember_episodic(&person.username, &episodic, &["goal", "staff_action"], now)
            .await;

        let key = format!("active_goal_{}", now.format("%Y%m%d_%H%M%S"));
        self.remember_semantic(&person.username, &key, text, "goals")
            .await;

        Ok(Goal {
            id,
            person_id: person.id,
            text: text.to_string(),
            completed: false,
            created_at: now,
            completed_at: None,
        })
    }

    /// Record a dose for the named active plan.
    ///
    /// Enforces the daily cap: once `times_per_day` doses are logged for the
    /// day, further attempts are rejected, not truncated. The matched dose
    /// window's slot index is recorded; a dose outside every window gets
    /// slot = None and still counts toward the day's total.
    pub async fn log_dose(
        &self,
        person: &Person,
        plan_name: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<DoseLog> {
        scheduler::expire_plans(self.store.as_ref(), person.id, now).await?;

        let plan = self
            .store
            .find_active_plan_by_name(person.id, plan_name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Medication '{}' not found", plan_name))?;

        let today = self.store.get_doses_for_day(plan.id, now).await?;
        if today.len() as i32 >= plan.times_per_day {
            anyhow::bail!(
                "Already logged {} doses of '{}' today",
                plan.times_per_day,
                plan.name
            );
        }

        let slots = scheduler::dose_slots(&plan);
        let log = DoseLog {
            id: 0,
            plan_id: plan.id,
            taken_at: now,
            slot: scheduler::match_slot(&slots, now.time()),
        };
        let id = self.store.log_dose(&log).await?;
        let log = DoseLog { id, ..log };
        info!(person = %person.username, plan = %plan.name, slot = ?log.slot, "Dose logged");

        let episodic = format!(
            "Took {} at {} on {}",
            plan.name,
            now.format("%H:%M"),
            now.format("%Y-%m-%d")
        );
        self.remember_episodic(&person.username, &episodic, &["medication_log"], now)
            .await;

        Ok(log)
    }

    /// Deactivate a person. Their record and history remain.
    pub async fn deactivate_person(&self, person: &Person) -> anyhow::Result<()> {
        self.store.deactivate_person(person.id).await?;
        info!(person = %person.username, "Deactivated person");
        Ok(())
    }

    async fn remember_episodic(
        &self,
        person: &str,
        text: &str,
        tags: &[&str],
        now: DateTime<Utc>,
    ) {
        if let Err(e) = self.memory.remember_episodic(person, text, tags, now).await {
            warn!(person, error = %e, "Episodic memory write failed");
        }
    }

    async fn remember_semantic(&self, person: &str, key: &str, value: &str, category: &str) {
        if let Err(e) = self.memory.remember_semantic(person, key, value, category).await {
            warn!(person, error = %e, "Semantic memory write failed");
        }
    }
}
