//! LLM-backed fact extraction and per-person routing.
//!
//! The extractor pulls durable facts out of a conversational turn; the
//! router decides whose record each fact belongs to when several people are
//! named. Routing is resolved exactly once per candidate into a
//! `RoutingDecision` and never re-interpreted downstream.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::llm::LlmClient;
use crate::traits::Person;
use crate::types::MemoryKind;

pub const EXTRACTION_SYSTEM: &str = "You are a memory extraction system for a care companion. \
    Given one conversational turn, extract durable facts worth remembering. \
    Output ONLY a JSON array: \
    [{\"text\": \"...\", \"kind\": \"episodic|semantic\", \"subject\": \"name or null\", \"category\": \"...\"}]. \
    Kinds:\n\
    - episodic: events, completed actions, dated occurrences (\"Took a walk this morning\")\n\
    - semantic: durable preferences, relationships, identity facts (\"Likes hiking\")\n\
    Rules:\n\
    - Write each fact in first person from the speaker's perspective\n\
    - subject: the name of the person the fact is ABOUT when it is not the \
      speaker (e.g. \"Sarah\" for \"my daughter Sarah visits Sundays\"); null when \
      the fact is about the speaker\n\
    - Do NOT extract questions, greetings, or the assistant's own suggestions\n\
    - Categories: personal, family, medical, preference, routine, memory, location\n\
    If nothing is worth storing, return [].";

/// A fact proposed by the extractor, before routing. Transient — dropped
/// once the routing decision has been applied.
#[derive(Debug, Clone)]
pub struct ExtractionCandidate {
    pub text: String,
    pub kind: MemoryKind,
    pub subject: Option<String>,
    pub category: String,
}

/// Wire shape of one candidate. Everything defaults so one sloppy field
/// never sinks the whole batch.
#[derive(Deserialize)]
struct RawCandidate {
    #[serde(default)]
    text: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Whose record a candidate belongs to. Resolved once, at routing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// About the speaker, or no subject named.
    Speaker,
    /// About another enrolled person; routed to their record.
    NamedPerson(i64),
    /// About a third party who is not enrolled; kept on the speaker's record
    /// as a relationship fact rather than dropped.
    UnenrolledRelation,
}

/// A candidate that survived the structure check, with its owner resolved.
#[derive(Debug, Clone)]
pub struct RoutedFact {
    /// Username whose memory record receives the fact.
    pub owner: String,
    pub text: String,
    pub kind: MemoryKind,
    pub tags: Vec<String>,
    pub decision: RoutingDecision,
}

/// The user-turn payload handed to the extraction model.
pub fn extraction_payload(speaker: &Person, message: &str, reply: &str) -> String {
    format!(
        "The person speaking is {} ({}).\n\nUser said: \"{}\"\nAssistant replied: \"{}\"\n\nYour extraction:",
        speaker.full_name, speaker.username, message, reply
    )
}

/// Parse the model's JSON array of candidates. Code fences and stray prose
/// around the array are tolerated; anything unparseable yields an error the
/// caller absorbs as ExtractionSkipped.
pub fn parse_candidates(raw: &str) -> anyhow::Result<Vec<ExtractionCandidate>> {
    let json = extract_json_array(raw)
        .ok_or_else(|| anyhow::anyhow!("no JSON array in extraction response"))?;
    let raws: Vec<RawCandidate> = serde_json::from_str(json)?;
    Ok(raws
        .into_iter()
        .map(|r| ExtractionCandidate {
            text: r.text,
            kind: r
                .kind
                .as_deref()
                .map(MemoryKind::from_str_lossy)
                .unwrap_or(MemoryKind::Semantic),
            subject: r.subject.filter(|s| {
                let s = s.trim();
                !s.is_empty() && !s.eq_ignore_ascii_case("null")
            }),
            category: r.category.unwrap_or_else(|| "memory".to_string()),
        })
        .collect())
}

fn extract_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end > start {
        Some(&raw[start..=end])
    } else {
        None
    }
}

/// Minimal confidence/structure check: a fact must be non-empty and carry at
/// least three words. Failures are discarded silently.
fn passes_structure_check(candidate: &ExtractionCandidate) -> bool {
    let words = candidate.text.split_whitespace().count();
    !candidate.text.trim().is_empty() && words >= 3
}

/// Check whether two person names likely refer to the same person.
/// Handles first-name-only match, case-insensitive.
fn names_likely_match(candidate: &str, existing: &str) -> bool {
    let c = candidate.trim().to_lowercase();
    let e = existing.trim().to_lowercase();

    if c.is_empty() || e.is_empty() {
        return false;
    }
    if c == e {
        return true;
    }

    let c_parts: Vec<&str> = c.split_whitespace().collect();
    let e_parts: Vec<&str> = e.split_whitespace().collect();

    // "Sarah" matches "Sarah Jones", and vice versa.
    if c_parts.len() == 1 && e_parts.len() > 1 && c_parts[0] == e_parts[0] {
        return true;
    }
    if e_parts.len() == 1 && c_parts.len() > 1 && c_parts[0] == e_parts[0] {
        return true;
    }

    false
}

fn resolve_subject(subject: &str, speaker: &Person, known: &[Person]) -> RoutingDecision {
    if names_likely_match(subject, &speaker.full_name)
        || subject.trim().eq_ignore_ascii_case(&speaker.username)
    {
        return RoutingDecision::Speaker;
    }
    for person in known {
        if person.id == speaker.id {
            continue;
        }
        if names_likely_match(subject, &person.full_name)
            || subject.trim().eq_ignore_ascii_case(&person.username)
        {
            return RoutingDecision::NamedPerson(person.id);
        }
    }
    RoutingDecision::UnenrolledRelation
}

/// Apply the structure check and resolve each surviving candidate's owner.
///
/// Candidates whose proposed owner cannot be resolved to a known or speaker
/// identity are attached to the speaker as relationship facts; candidates
/// failing the structure check are dropped.
pub fn route_candidates(
    candidates: Vec<ExtractionCandidate>,
    speaker: &Person,
    known: &[Person],
) -> Vec<RoutedFact> {
    let mut routed = Vec::new();

    for candidate in candidates {
        if !passes_structure_check(&candidate) {
            debug!(text = %candidate.text, "Dropping extraction candidate (structure check)");
            continue;
        }

        let decision = match candidate.subject.as_deref() {
            None | Some("") => RoutingDecision::Speaker,
            Some(subject) => resolve_subject(subject, speaker, known),
        };

        let owner = match &decision {
            RoutingDecision::Speaker | RoutingDecision::UnenrolledRelation => {
                speaker.username.clone()
            }
            RoutingDecision::NamedPerson(id) => {
                match known.iter().find(|p| p.id == *id) {
                    Some(p) => p.username.clone(),
                    // Unreachable by construction, but never route to a
                    // missing identity.
                    None => continue,
                }
            }
        };

        let mut tags = vec![candidate.category.clone()];
        if decision == RoutingDecision::UnenrolledRelation && candidate.category != "relationship" {
            tags.push("relationship".to_string());
        }

        routed.push(RoutedFact {
            owner,
            text: candidate.text,
            kind: candidate.kind,
            tags,
            decision,
        });
    }

    routed
}

/// Full extraction pass: one constrained LLM call, then parse + route.
/// Any failure yields an empty list — extraction is never fatal to a turn.
pub async fn extract_and_route(
    llm: &LlmClient,
    speaker: &Person,
    known: &[Person],
    message: &str,
    reply: &str,
) -> Vec<RoutedFact> {
    let payload = extraction_payload(speaker, message, reply);

    let raw = match llm.complete_fast(EXTRACTION_SYSTEM, &payload).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Fact extraction call failed, skipping");
            return Vec::new();
        }
    };

    let candidates = match parse_candidates(&raw) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Unparseable extraction response, skipping");
            return Vec::new();
        }
    };

    route_candidates(candidates, speaker, known)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn person(id: i64, username: &str, full_name: &str) -> Person {
        Person {
            id,
            username: username.to_string(),
            full_name: full_name.to_string(),
            family_info: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
            hobbies: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_candidates_plain() {
        let raw = r#"[{"text": "I like hiking", "kind": "semantic", "subject": null, "category": "preference"}]"#;
        let parsed = parse_candidates(raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].kind, MemoryKind::Semantic);
    }

    #[test]
    fn test_parse_candidates_fenced() {
        let raw = "```json\n[{\"text\": \"I walked today\", \"kind\": \"episodic\"}]\n```";
        let parsed = parse_candidates(raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].kind, MemoryKind::Episodic);
        assert_eq!(parsed[0].category, "memory");
    }

    #[test]
    fn test_parse_candidates_empty_array() {
        assert!(parse_candidates("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_candidates_garbage() {
        assert!(parse_candidates("no storage needed").is_err());
    }

    #[test]
    fn test_structure_check_drops_short_text() {
        let alice = person(1, "alice", "Alice Smith");
        let candidates = vec![
            ExtractionCandidate {
                text: "".to_string(),
                kind: MemoryKind::Semantic,
                subject: None,
                category: "memory".to_string(),
            },
            ExtractionCandidate {
                text: "yes".to_string(),
                kind: MemoryKind::Semantic,
                subject: None,
                category: "memory".to_string(),
            },
        ];
        assert!(route_candidates(candidates, &alice, &[]).is_empty());
    }

    #[test]
    fn test_routes_to_speaker_without_subject() {
        let alice = person(1, "alice", "Alice Smith");
        let candidates = vec![ExtractionCandidate {
            text: "I like hiking in the hills".to_string(),
            kind: MemoryKind::Semantic,
            subject: None,
            category: "preference".to_string(),
        }];
        let routed = route_candidates(candidates, &alice, &[alice.clone()]);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].owner, "alice");
        assert_eq!(routed[0].decision, RoutingDecision::Speaker);
    }

    #[test]
    fn test_routes_to_named_enrolled_person() {
        let alice = person(1, "alice", "Alice Smith");
        let bob = person(2, "bob", "Bob Smith");
        let candidates = vec![ExtractionCandidate {
            text: "Bob takes his pills at noon".to_string(),
            kind: MemoryKind::Semantic,
            subject: Some("Bob".to_string()),
            category: "medical".to_string(),
        }];
        let routed = route_candidates(candidates, &alice, &[alice.clone(), bob]);
        assert_eq!(routed[0].owner, "bob");
        assert_eq!(routed[0].decision, RoutingDecision::NamedPerson(2));
    }

    #[test]
    fn test_unenrolled_subject_becomes_relationship_fact() {
        let alice = person(1, "alice", "Alice Smith");
        let candidates = vec![ExtractionCandidate {
            text: "My daughter Sarah visits on Sundays".to_string(),
            kind: MemoryKind::Semantic,
            subject: Some("Sarah".to_string()),
            category: "family".to_string(),
        }];
        let routed = route_candidates(candidates, &alice, &[alice.clone()]);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].owner, "alice");
        assert_eq!(routed[0].decision, RoutingDecision::UnenrolledRelation);
        assert!(routed[0].tags.contains(&"relationship".to_string()));
    }

    #[test]
    fn test_subject_matching_is_first_name_tolerant() {
        let alice = person(1, "alice", "Alice Smith");
        let sarah = person(2, "sarah", "Sarah Jones");
        let candidates = vec![ExtractionCandidate {
            text: "Sarah enjoys the garden club".to_string(),
            kind: MemoryKind::Semantic,
            subject: Some("Sarah".to_string()),
            category: "preference".to_string(),
        }];
        let routed = route_candidates(candidates, &alice, &[alice.clone(), sarah]);
        assert_eq!(routed[0].decision, RoutingDecision::NamedPerson(2));
    }

    #[test]
    fn test_subject_matching_speaker_not_self_routed_as_other() {
        let alice = person(1, "alice", "Alice Smith");
        let candidates = vec![ExtractionCandidate {
            text: "Alice walks every morning now".to_string(),
            kind: MemoryKind::Episodic,
            subject: Some("Alice".to_string()),
            category: "routine".to_string(),
        }];
        let routed = route_candidates(candidates, &alice, &[alice.clone()]);
        assert_eq!(routed[0].decision, RoutingDecision::Speaker);
    }
}
