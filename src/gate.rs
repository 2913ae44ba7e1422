//! Pre-filter that decides whether a message is worth an LLM extraction
//! call. Biased permissive: a false negative only means a missed fact, a
//! false positive only costs latency.

const QUESTION_STARTERS: &[&str] = &[
    "what", "who", "when", "where", "why", "how", "which", "whose", "whom", "do you", "can you",
    "could you", "would you", "will you", "should you", "are you", "is there", "did you",
    "tell me", "show me", "help me", "explain",
];

const GREETINGS: &[&str] = &[
    "hello", "hi ", "hi,", "hi!", "hey", "good morning", "good afternoon", "good evening",
    "good night", "thanks", "thank you", "thx", "ok", "okay", "sure", "yes", "no", "yeah", "yep",
    "nope", "bye", "goodbye", "see you", "talk later",
];

const META_REQUESTS: &[&str] = &[
    "clear", "delete", "reset", "forget", "remember this", "save this", "store this",
];

const INFO_INDICATORS: &[&str] = &[
    // Identity
    "i am", "i'm", "my name is", "i was born", "i live in",
    // Preferences
    "i like", "i love", "i enjoy", "i prefer", "i hate", "i don't like", "my favorite", "i want",
    "i need",
    // Relationships and family
    "my wife", "my husband", "my son", "my daughter", "my brother", "my sister", "my friend",
    "my mother", "my father",
    // Activities and routines
    "i work", "i go to", "i take", "i eat", "i drink", "i play", "i watch", "i read", "i listen",
    "i exercise", "every day", "every morning", "every night", "usually",
    // Medical
    "i have", "i take medication", "my doctor", "i'm allergic",
    // Past experiences
    "i used to", "i remember", "i grew up", "when i was", "i worked at", "i went to", "i met",
];

const FEELING_WORDS: &[&str] = &[
    "feeling", "tired", "happy", "sad", "enjoyed", "worried", "anxious", "lonely",
];

/// Should this message be sent to the language model for fact extraction?
pub fn should_extract(message: &str) -> bool {
    let lower = message.to_lowercase();
    let lower = lower.trim();
    let word_count = message.split_whitespace().count();

    // Questions are requests for information, not statements of fact.
    if QUESTION_STARTERS.iter().any(|q| lower.starts_with(q)) {
        return false;
    }
    if message.trim_end().ends_with('?') {
        return false;
    }

    // Greetings and acknowledgements.
    if GREETINGS.iter().any(|g| lower.starts_with(g)) {
        return false;
    }

    // Meta requests are commands, handled elsewhere.
    if META_REQUESTS.iter().any(|m| lower.contains(m)) {
        return false;
    }

    // Strong first-person signals of factual content.
    if INFO_INDICATORS.iter().any(|i| lower.contains(i)) {
        return true;
    }

    // Proper nouns past the first word often mean names or places.
    let words: Vec<&str> = message.split_whitespace().collect();
    if words.len() > 1
        && words[1..]
            .iter()
            .any(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
    {
        return true;
    }

    // Medium-length declaratives are worth a look.
    word_count >= 5
}

/// Does the message read like an emotional check-in? Those get stored as
/// wellbeing records regardless of what the extractor finds.
pub fn is_emotional_checkin(message: &str) -> bool {
    let lower = message.to_lowercase();
    FEELING_WORDS.iter().any(|w| lower.contains(w))
}
