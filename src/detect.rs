//! Goal-completion detection: decide, from one conversational turn, which of
//! the person's incomplete goals were clearly achieved, and apply the
//! transitions. Completed goals are excluded upstream, so repeated mentions
//! never double-fire.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::llm::LlmClient;
use crate::traits::{CareStore, Goal, MemoryStore, Person};

pub const COMPLETION_SYSTEM: &str = "You are a progress tracker for a care companion. \
    Given a person's active goals and their latest message, decide which goals the \
    message clearly shows were achieved or completed. \
    Respond with ONLY a JSON array of the completed goal texts, copied verbatim. \
    If none were completed, respond with [].";

/// Result of one detection pass.
#[derive(Debug, Default)]
pub struct CompletionOutcome {
    /// Texts of the goals that transitioned to completed this turn.
    pub completed: Vec<String>,
    /// Celebration line appended to the companion reply, when any completed.
    pub reply_suffix: Option<String>,
}

pub fn completion_payload(goals: &[Goal], message: &str) -> String {
    let goal_texts: Vec<&str> = goals.iter().map(|g| g.text.as_str()).collect();
    format!(
        "Active goals: {:?}\nUser message: {}",
        goal_texts, message
    )
}

/// Parse the judgment model's JSON list of completed goal texts. Anything
/// unparseable means no completions — never an error for the turn.
pub fn parse_completed(raw: &str) -> Vec<String> {
    let start = match raw.find('[') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let end = match raw.rfind(']') {
        Some(i) if i > start => i,
        _ => return Vec::new(),
    };
    serde_json::from_str::<Vec<String>>(&raw[start..=end]).unwrap_or_default()
}

/// Match judged texts back to goal rows, case-insensitively. Each goal is
/// independent; a judged text that matches nothing is ignored.
pub fn match_completed<'a>(goals: &'a [Goal], completed_texts: &[String]) -> Vec<&'a Goal> {
    goals
        .iter()
        .filter(|g| !g.completed)
        .filter(|g| {
            completed_texts
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(g.text.trim()))
        })
        .collect()
}

fn congratulation(completed: &[String], remaining: &[&Goal]) -> String {
    let remaining_text = if remaining.is_empty() {
        "No active goals now, wonderful work!".to_string()
    } else {
        remaining
            .iter()
            .map(|g| g.text.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "\n\nThat's wonderful! Congratulations on completing: {}. Active goals now: {}",
        completed.join(", "),
        remaining_text
    )
}

/// Run one detection pass: judge, apply transitions, and record the
/// completion event. Model or store failures are absorbed — the turn's reply
/// has already been produced at this point.
pub async fn detect_completions(
    llm: &LlmClient,
    store: &dyn CareStore,
    memory: &dyn MemoryStore,
    person: &Person,
    incomplete_goals: &[Goal],
    message: &str,
    now: DateTime<Utc>,
) -> CompletionOutcome {
    if incomplete_goals.is_empty() {
        return CompletionOutcome::default();
    }

    let raw = match llm
        .complete_fast(COMPLETION_SYSTEM, &completion_payload(incomplete_goals, message))
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Goal completion judgment failed, skipping");
            return CompletionOutcome::default();
        }
    };

    let judged = parse_completed(&raw);
    if judged.is_empty() {
        return CompletionOutcome::default();
    }

    let mut completed = Vec::new();
    for goal in match_completed(incomplete_goals, &judged) {
        match store.complete_goal(goal.id, now).await {
            // complete_goal is write-once; false means another pass got
            // there first, which is fine.
            Ok(true) => {
                info!(goal_id = goal.id, text = %goal.text, "Goal completed");
                completed.push(goal.text.clone());
            }
            Ok(false) => {}
            Err(e) => warn!(goal_id = goal.id, error = %e, "Failed to persist goal completion"),
        }
    }

    if completed.is_empty() {
        return CompletionOutcome::default();
    }

    let record = format!(
        "Goal completed on {}: {}",
        now.format("%Y-%m-%d"),
        completed.join(", ")
    );
    if let Err(e) = memory
        .remember_episodic(&person.username, &record, &["goal_completion", "achievement"], now)
        .await
    {
        warn!(error = %e, "Failed to store goal completion record");
    }

    let remaining: Vec<&Goal> = incomplete_goals
        .iter()
        .filter(|g| !completed.iter().any(|c| c == &g.text))
        .collect();
    let suffix = congratulation(&completed, &remaining);

    CompletionOutcome {
        completed,
        reply_suffix: Some(suffix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(id: i64, text: &str, completed: bool) -> Goal {
        Goal {
            id,
            person_id: 1,
            text: text.to_string(),
            completed,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_parse_completed_plain() {
        assert_eq!(
            parse_completed(r#"["walk 10 minutes"]"#),
            vec!["walk 10 minutes".to_string()]
        );
    }

    #[test]
    fn test_parse_completed_with_prose() {
        let raw = "Here you go:\n```json\n[\"walk 10 minutes\"]\n```";
        assert_eq!(parse_completed(raw).len(), 1);
    }

    #[test]
    fn test_parse_completed_garbage() {
        assert!(parse_completed("nothing was completed").is_empty());
        assert!(parse_completed("[not json").is_empty());
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let goals = vec![goal(1, "Walk 10 minutes", false)];
        let matched = match_completed(&goals, &["walk 10 minutes".to_string()]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, 1);
    }

    #[test]
    fn test_completed_goals_never_match_again() {
        let goals = vec![goal(1, "walk 10 minutes", true)];
        assert!(match_completed(&goals, &["walk 10 minutes".to_string()]).is_empty());
    }

    #[test]
    fn test_unmatched_judgment_ignored() {
        let goals = vec![goal(1, "walk 10 minutes", false)];
        assert!(match_completed(&goals, &["take the pill".to_string()]).is_empty());
    }

    #[test]
    fn test_only_matching_goal_completes() {
        let goals = vec![
            goal(1, "walk 10 minutes", false),
            goal(2, "call your sister", false),
        ];
        let matched = match_completed(&goals, &["walk 10 minutes".to_string()]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, 1);
    }
}
