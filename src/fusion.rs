//! Memory fusion: merge episodic recall, the semantic profile, and
//! structured care-plan state into one per-turn context.
//!
//! The context is built fresh every turn and never cached — memory may have
//! changed between turns. Structured state always wins over memory-derived
//! duplicates: authoritative plan facts are appended to the semantic list as
//! trusted entries, and the reply prompt labels that block authoritative.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::extract::RoutedFact;
use crate::scheduler::{self, DoseStatus};
use crate::traits::{CareStore, Goal, MemoryStore, Person, PrescriptionPlan};
use crate::types::MemoryKind;

/// Fallback query when the targeted retrieval comes back empty.
const BROAD_QUERY: &str = "all memories";
const BROAD_TOP_K: usize = 20;

/// One plan's standing for today.
#[derive(Debug, Clone)]
pub struct PlanDoseStatus {
    pub plan: PrescriptionPlan,
    pub taken_today: usize,
    pub status: DoseStatus,
}

impl PlanDoseStatus {
    pub fn status_line(&self) -> String {
        let total = self.plan.times_per_day;
        if self.taken_today as i32 >= total {
            format!("{}: all doses complete ({}/{})", self.plan.name, total, total)
        } else {
            format!(
                "{}: {}/{} taken, {} remaining today",
                self.plan.name,
                self.taken_today,
                total,
                total - self.taken_today as i32
            )
        }
    }
}

/// Per-turn fused context. Never persisted, never shared across turns.
#[derive(Debug, Clone, Default)]
pub struct FusedContext {
    /// Ranked episodic snippets, most relevant first.
    pub episodic: Vec<String>,
    /// Full semantic fact set; structured (trusted) entries appended last.
    pub semantic: Vec<String>,
    pub plans: Vec<PrescriptionPlan>,
    pub goals: Vec<Goal>,
    pub dose_status: Vec<PlanDoseStatus>,
    /// Reminder lines for doses due right now.
    pub due_reminders: Vec<String>,
    /// True when the memory service was unreachable and the context carries
    /// structured state only.
    pub memory_degraded: bool,
}

impl FusedContext {
    pub fn medication_block(&self) -> String {
        if self.dose_status.is_empty() {
            return "No active medications".to_string();
        }
        self.dose_status
            .iter()
            .map(|s| s.status_line())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn semantic_block(&self) -> String {
        if self.semantic.is_empty() {
            return "No profile information.".to_string();
        }
        self.semantic
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn episodic_block(&self) -> String {
        if self.episodic.is_empty() {
            return "No recent memories.".to_string();
        }
        self.episodic
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn goals_line(&self) -> String {
        if self.goals.is_empty() {
            return "None right now.".to_string();
        }
        self.goals
            .iter()
            .map(|g| g.text.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Read side of fusion.
pub struct FusionReader {
    store: Arc<dyn CareStore>,
    memory: Arc<dyn MemoryStore>,
    top_k: usize,
}

impl FusionReader {
    pub fn new(store: Arc<dyn CareStore>, memory: Arc<dyn MemoryStore>, top_k: usize) -> Self {
        Self { store, memory, top_k }
    }

    /// Build the fused context for one turn. Structured reads run after the
    /// scheduler expiry pass so no expired plan is ever surfaced as active.
    /// Memory-service failure degrades to structured-only context; this
    /// method never fails the turn.
    pub async fn fuse(&self, person: &Person, query: &str, now: DateTime<Utc>) -> FusedContext {
        let mut ctx = FusedContext::default();

        // Structured state, expiry pass first.
        if let Err(e) = scheduler::expire_plans(self.store.as_ref(), person.id, now).await {
            warn!(error = %e, "Plan expiry pass failed");
        }

        match self.store.get_active_plans(person.id).await {
            Ok(plans) => ctx.plans = plans,
            Err(e) => warn!(error = %e, "Failed to read active plans"),
        }
        match self.store.get_incomplete_goals(person.id).await {
            Ok(goals) => ctx.goals = goals,
            Err(e) => warn!(error = %e, "Failed to read incomplete goals"),
        }

        for plan in &ctx.plans {
            let logs = match self.store.get_doses_for_day(plan.id, now).await {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(plan_id = plan.id, error = %e, "Failed to read today's dose logs");
                    Vec::new()
                }
            };
            let status = scheduler::dose_status(plan, &logs, now);
            if let DoseStatus::Due { slot } = &status {
                ctx.due_reminders.push(scheduler::due_reminder(plan, *slot));
            }
            ctx.dose_status.push(PlanDoseStatus {
                plan: plan.clone(),
                taken_today: logs.len(),
                status,
            });
        }

        // Episodic recall, with one broad retry when the targeted query
        // finds nothing.
        match self
            .memory
            .retrieve_episodic(&person.username, query, self.top_k)
            .await
        {
            Ok(hits) if hits.is_empty() => {
                match self
                    .memory
                    .retrieve_episodic(&person.username, BROAD_QUERY, BROAD_TOP_K)
                    .await
                {
                    Ok(hits) => ctx.episodic = hits.into_iter().map(|h| h.text).collect(),
                    Err(e) => {
                        warn!(error = %e, "Broad episodic retrieval failed, degrading");
                        ctx.memory_degraded = true;
                    }
                }
            }
            Ok(hits) => ctx.episodic = hits.into_iter().map(|h| h.text).collect(),
            Err(e) => {
                warn!(error = %e, "Episodic retrieval failed, degrading to structured context");
                ctx.memory_degraded = true;
            }
        }

        match self.memory.retrieve_semantic(&person.username).await {
            Ok(facts) => ctx.semantic = facts,
            Err(e) => {
                warn!(error = %e, "Semantic retrieval failed, degrading to structured context");
                ctx.memory_degraded = true;
            }
        }

        // Structured facts last: they are authoritative, and placing them
        // after any stale memory note means the reply prompt's trusted block
        // reflects the store.
        append_structured_facts(&mut ctx, person);

        debug!(
            person = %person.username,
            episodic = ctx.episodic.len(),
            semantic = ctx.semantic.len(),
            plans = ctx.plans.len(),
            goals = ctx.goals.len(),
            degraded = ctx.memory_degraded,
            "Fused turn context"
        );

        ctx
    }
}

/// Append profile columns and authoritative plan facts to the semantic list.
fn append_structured_facts(ctx: &mut FusedContext, person: &Person) {
    if let Some(family) = person.family_info.as_deref() {
        ctx.semantic.push(format!("Family: {}", family));
    }
    if let Some(hobbies) = person.hobbies.as_deref() {
        ctx.semantic.push(format!("Hobbies: {}", hobbies));
    }
    if let Some(name) = person.emergency_contact_name.as_deref() {
        let mut line = format!("Emergency contact: {}", name);
        if let Some(phone) = person.emergency_contact_phone.as_deref() {
            line.push_str(&format!(" - Phone: {}", phone));
        }
        ctx.semantic.push(line);
    }

    for plan in &ctx.plans {
        let times = plan
            .dose_times
            .as_deref()
            .unwrap_or("evenly spread over the day");
        ctx.semantic.push(format!(
            "Medication {} (authoritative): {}x daily at {}",
            plan.name, plan.times_per_day, times
        ));
    }
}

/// Write side of fusion: persist routed facts into the right memory lane.
/// Returns how many were stored; individual failures are logged and do not
/// fail the turn.
pub async fn persist_facts(
    memory: &dyn MemoryStore,
    facts: &[RoutedFact],
    now: DateTime<Utc>,
) -> usize {
    let mut stored = 0;
    for fact in facts {
        let tags: Vec<&str> = fact.tags.iter().map(|t| t.as_str()).collect();
        let result = match fact.kind {
            MemoryKind::Episodic => {
                memory
                    .remember_episodic(&fact.owner, &fact.text, &tags, now)
                    .await
            }
            MemoryKind::Semantic => {
                // Relationship facts about unenrolled third parties surface
                // under the relationship category regardless of what the
                // extractor proposed.
                let category = if fact.tags.iter().any(|t| t == "relationship") {
                    "relationship"
                } else {
                    fact.tags.first().map(|t| t.as_str()).unwrap_or("memory")
                };
                memory
                    .remember_semantic(&fact.owner, category, &fact.text, category)
                    .await
            }
        };
        match result {
            Ok(()) => stored += 1,
            Err(e) => warn!(owner = %fact.owner, error = %e, "Failed to persist extracted fact"),
        }
    }
    stored
}

/// Persist the conversational turn itself as an episodic record.
pub async fn persist_turn(
    memory: &dyn MemoryStore,
    person: &Person,
    message: &str,
    reply: &str,
    now: DateTime<Utc>,
) {
    let text = format!("User said: {} | Assistant replied: {}", message, reply);
    if let Err(e) = memory
        .remember_episodic(&person.username, &text, &["conversation"], now)
        .await
    {
        warn!(error = %e, "Failed to persist conversation turn");
    }
}
