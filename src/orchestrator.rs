//! The per-turn pipeline: Fusing → Responding → (gated) Extracting →
//! Routing → DetectingCompletion → Persisting.
//!
//! Strictly sequential — each stage feeds the next, and the LLM context must
//! be deterministic. All conversation state lives in the per-turn
//! `FusedContext`; there is no process-wide chat state. Turns for different
//! persons are independent and may run in parallel.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::detect;
use crate::extract;
use crate::fusion::{self, FusedContext, FusionReader};
use crate::gate;
use crate::llm::LlmClient;
use crate::traits::{CareStore, MemoryStore, Person};

pub const COMPANION_SYSTEM: &str = "You are a warm, compassionate companion for people with \
    memory challenges. Talk like a caring friend, not a database. \
    Use the profile information and care-plan blocks to personalize your answers; \
    the medication block is authoritative and overrides anything remembered in conversation. \
    Only reference facts that appear in the context below, and never mix this person up \
    with information about other people — facts mentioning someone else are this \
    person's memories ABOUT them. \
    Ask about their day, feelings, family, hobbies, and routines naturally. \
    Keep responses warm, brief (2-4 sentences), and clear. \
    Never say \"you forgot\" or make anyone feel bad about memory gaps.";

pub const OPENING_SYSTEM: &str = "You are a warm, compassionate companion for people with \
    memory challenges. This is the FIRST message of the day — greet the person by name, \
    ask how they are feeling, and mention you are here to support them. \
    Be friendly and conversational. Keep it to 2-3 sentences.";

/// Reply used when the model capability fails at the Responding stage.
pub const DEGRADED_REPLY: &str =
    "I'm having a little trouble gathering my thoughts right now. Let's try again in a moment.";

/// What a turn did besides produce a reply.
#[derive(Debug, Default)]
pub struct TurnSideEffects {
    pub facts_stored: usize,
    pub goals_completed: Vec<String>,
    pub dose_reminders: Vec<String>,
    /// Memory service was unreachable; the context was structured-only.
    pub memory_degraded: bool,
    /// The gate rejected the message, or extraction produced nothing usable.
    pub extraction_skipped: bool,
    /// The model capability failed at Responding; nothing was persisted.
    pub response_degraded: bool,
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub reply: String,
    pub side_effects: TurnSideEffects,
}

pub struct TurnOrchestrator {
    store: Arc<dyn CareStore>,
    memory: Arc<dyn MemoryStore>,
    llm: LlmClient,
    reader: FusionReader,
}

impl TurnOrchestrator {
    pub fn new(
        store: Arc<dyn CareStore>,
        memory: Arc<dyn MemoryStore>,
        llm: LlmClient,
        episodic_top_k: usize,
    ) -> Self {
        let reader = FusionReader::new(store.clone(), memory.clone(), episodic_top_k);
        Self {
            store,
            memory,
            llm,
            reader,
        }
    }

    /// Process one conversational turn end-to-end.
    pub async fn process_turn(&self, person: &Person, message: &str) -> TurnOutcome {
        let now = Utc::now();
        let mut effects = TurnSideEffects::default();

        // Fusing
        debug!(person = %person.username, "Fusing turn context");
        let ctx = self.reader.fuse(person, message, now).await;
        effects.memory_degraded = ctx.memory_degraded;
        effects.dose_reminders = ctx.due_reminders.clone();

        // Responding — failure here is terminal for the turn: the user gets
        // a degraded reply and no memory writes happen for a turn whose real
        // reply never reached them.
        let payload = build_turn_payload(&ctx, person, message);
        let mut reply = match self.llm.complete(COMPANION_SYSTEM, &payload).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(person = %person.username, error = %e, "Responding failed, returning degraded reply");
                effects.response_degraded = true;
                effects.extraction_skipped = true;
                return TurnOutcome {
                    reply: DEGRADED_REPLY.to_string(),
                    side_effects: effects,
                };
            }
        };

        // Extracting + Routing, behind the gate.
        if gate::should_extract(message) {
            let known = match self.store.get_active_people().await {
                Ok(people) => people,
                Err(e) => {
                    warn!(error = %e, "Failed to load known persons for routing");
                    Vec::new()
                }
            };
            let routed =
                extract::extract_and_route(&self.llm, person, &known, message, &reply).await;
            if routed.is_empty() {
                effects.extraction_skipped = true;
            } else {
                effects.facts_stored = fusion::persist_facts(self.memory.as_ref(), &routed, now).await;
            }
        } else {
            debug!(person = %person.username, "Gate rejected message for extraction");
            effects.extraction_skipped = true;
        }

        // DetectingCompletion
        let outcome = detect::detect_completions(
            &self.llm,
            self.store.as_ref(),
            self.memory.as_ref(),
            person,
            &ctx.goals,
            message,
            now,
        )
        .await;
        if let Some(suffix) = &outcome.reply_suffix {
            reply.push_str(suffix);
        }
        effects.goals_completed = outcome.completed;

        // Persisting — the turn itself, plus an emotional check-in record
        // when the message reads like one.
        fusion::persist_turn(self.memory.as_ref(), person, message, &reply, now).await;
        if gate::is_emotional_checkin(message) {
            let text = format!(
                "Emotional check-in on {}: {}",
                now.format("%Y-%m-%d"),
                message
            );
            if let Err(e) = self
                .memory
                .remember_episodic(&person.username, &text, &["emotional", "wellbeing"], now)
                .await
            {
                warn!(error = %e, "Failed to store emotional check-in");
            }
        }

        info!(
            person = %person.username,
            facts = effects.facts_stored,
            goals_completed = effects.goals_completed.len(),
            reminders = effects.dose_reminders.len(),
            degraded = effects.memory_degraded,
            "Turn complete"
        );

        TurnOutcome {
            reply,
            side_effects: effects,
        }
    }

    /// System-initiated first contact: greet from profile context. Skips the
    /// gate, extraction, and completion detection — there is no user message
    /// to learn from.
    pub async fn process_opening(&self, person: &Person) -> TurnOutcome {
        let now = Utc::now();
        let mut effects = TurnSideEffects::default();
        effects.extraction_skipped = true;

        let ctx = self.reader.fuse(person, BROAD_OPENING_QUERY, now).await;
        effects.memory_degraded = ctx.memory_degraded;
        effects.dose_reminders = ctx.due_reminders.clone();

        let hobbies = person.hobbies.as_deref().unwrap_or("not shared");
        let payload = format!(
            "Start a warm, welcoming conversation with {}. Their hobbies include: {}. \
             Greet them warmly and ask how they are doing today.",
            person.full_name, hobbies
        );

        let reply = match self.llm.complete(OPENING_SYSTEM, &payload).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(person = %person.username, error = %e, "Opening greeting failed");
                effects.response_degraded = true;
                return TurnOutcome {
                    reply: DEGRADED_REPLY.to_string(),
                    side_effects: effects,
                };
            }
        };

        TurnOutcome {
            reply,
            side_effects: effects,
        }
    }
}

const BROAD_OPENING_QUERY: &str = "all memories";

/// Assemble the Responding-stage prompt from the fused context. Block order
/// is fixed so the constructed LLM context is deterministic.
fn build_turn_payload(ctx: &FusedContext, person: &Person, message: &str) -> String {
    let med_names = if ctx.plans.is_empty() {
        "None".to_string()
    } else {
        ctx.plans
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let reminders = if ctx.due_reminders.is_empty() {
        String::new()
    } else {
        format!("\n=== DUE RIGHT NOW ===\n{}\n", ctx.due_reminders.join("\n"))
    };

    format!(
        "User said: {}\n\n\
         === MEDICATION STATUS TODAY ===\n{}\n{}\n\
         === PROFILE INFORMATION (use this to answer questions) ===\n{}\n\n\
         === RECENT MEMORIES ===\n{}\n\n\
         Additional info:\n\
         - Full name: {}\n\
         - Goals: {}\n\
         - Medications: {}",
        message,
        ctx.medication_block(),
        reminders,
        ctx.semantic_block(),
        ctx.episodic_block(),
        person.full_name,
        ctx.goals_line(),
        med_names,
    )
}
