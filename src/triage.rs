//! Fast reactive pre-filter for inbound messages.
//!
//! Runs before the external classifier and costs nothing: plain word
//! matching over the lowercased message. It may short-circuit smalltalk
//! (greetings, farewells, thanks) and refuse obviously off-topic questions
//! (math, trivia, entertainment), but anything that so much as smells like
//! an emergency is escalated to the classifier. The philosophy is blunt:
//! only block the obvious, never gate a potential emergency on a pattern.

/// Where a message should go after the cheap pre-filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triage {
    /// Smalltalk the chat layer can answer instantly.
    Smalltalk(SmalltalkKind),
    /// Clearly outside the assistant's remit; answer with a redirect.
    OffTopic,
    /// Ambiguous or potentially an emergency; consult the classifier.
    Escalate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmalltalkKind {
    Greeting,
    Farewell,
    Thanks,
}

/// Substring matches here force escalation no matter what else the message
/// contains. Deliberately broad: "break" catches "breaking in".
const SAFETY_WORDS: &[&str] = &[
    "help",
    "urgent",
    "emergency",
    "quick",
    "fast",
    "now",
    "immediately",
    "fire",
    "police",
    "ambulance",
    "bleeding",
    "hurt",
    "injured",
    "attack",
    "robbery",
    "break",
    "theft",
    "unconscious",
    "breathing",
    "chest pain",
    // Sinhala
    "උදව්",
    "හදිසි",
    "ඉක්මන්",
    "ගිනි",
    "පොලිස්",
    "ගිලන්",
    // Tamil
    "உதவி",
    "அவசரம்",
    "உடனடி",
    "தீ",
    "காவல்",
    "ஆம்புலன்ஸ்",
];

/// Queries that need conversation memory; the classifier path carries the
/// history context, this one does not.
const CONTEXTUAL_PHRASES: &[&str] = &[
    "my name",
    "i told",
    "i said",
    "i mentioned",
    "remember",
    "recall",
    "earlier",
    "we talked",
    "we discussed",
    "you said",
    "you told",
    "මගේ නම",
    "මතකද",
    "என் பெயர்",
    "நினைவிருக்கிறதா",
];

/// Obvious non-emergency topics, safe to refuse without the classifier.
const OFF_TOPIC_TERMS: &[&str] = &[
    "calculate",
    "solve",
    "capital of",
    "president of",
    "population of",
    "joke",
    "fun fact",
    "weather",
    "temperature",
    "forecast",
    "recipe",
    "cook",
    "restaurant",
    "movie",
    "music",
    "song",
    "meaning of life",
    "philosophy",
];

const GREETING_WORDS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "greetings",
    "ආයුබෝවන්",
    "හෙලෝ",
    "හායි",
    "வணக்கம்",
    "ஹலோ",
    "ஹாய்",
];

const FAREWELL_WORDS: &[&str] = &[
    "bye",
    "goodbye",
    "farewell",
    "ගුඩ්බායි",
    "බායි",
    "பை",
    "குட்பை",
];

const THANKS_WORDS: &[&str] = &[
    "thanks",
    "thank",
    "ස්තූතියි",
    "ස්තුතියි",
    "நன்றி",
];

pub fn triage(message: &str) -> Triage {
    let lower = message.to_lowercase();

    // Safety words win over everything, including the off-topic refusal:
    // "joke" next to "fire" still reaches the classifier.
    if SAFETY_WORDS.iter().any(|w| lower.contains(w)) {
        return Triage::Escalate;
    }

    if CONTEXTUAL_PHRASES.iter().any(|p| lower.contains(p)) {
        return Triage::Escalate;
    }

    if OFF_TOPIC_TERMS.iter().any(|t| matches_term(&lower, t)) {
        return Triage::OffTopic;
    }

    if GREETING_WORDS.iter().any(|w| has_word(&lower, w)) {
        return Triage::Smalltalk(SmalltalkKind::Greeting);
    }
    if FAREWELL_WORDS.iter().any(|w| has_word(&lower, w)) {
        return Triage::Smalltalk(SmalltalkKind::Farewell);
    }
    if THANKS_WORDS.iter().any(|w| has_word(&lower, w)) {
        return Triage::Smalltalk(SmalltalkKind::Thanks);
    }

    Triage::Escalate
}

/// Whole-word match for single tokens, substring match for phrases.
fn matches_term(text: &str, term: &str) -> bool {
    if term.contains(' ') {
        text.contains(term)
    } else {
        has_word(text, term)
    }
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_word_always_escalates() {
        assert_eq!(triage("help my house is on fire"), Triage::Escalate);
        assert_eq!(triage("someone is breaking into my house"), Triage::Escalate);
        assert_eq!(triage("ගෙදර ගිනි ගන්නවා"), Triage::Escalate);
    }

    #[test]
    fn safety_word_beats_off_topic() {
        // "joke" alone is off-topic, but "fire" forces the classifier.
        assert_eq!(triage("a joke about a fire"), Triage::Escalate);
    }

    #[test]
    fn obvious_trivia_is_off_topic() {
        assert_eq!(triage("what is the capital of France"), Triage::OffTopic);
        assert_eq!(triage("tell me a joke"), Triage::OffTopic);
        assert_eq!(triage("what's the weather like"), Triage::OffTopic);
    }

    #[test]
    fn greetings_are_smalltalk() {
        assert_eq!(triage("hello"), Triage::Smalltalk(SmalltalkKind::Greeting));
        assert_eq!(
            triage("hi there"),
            Triage::Smalltalk(SmalltalkKind::Greeting)
        );
        assert_eq!(
            triage("ආයුබෝවන්"),
            Triage::Smalltalk(SmalltalkKind::Greeting)
        );
        assert_eq!(
            triage("வணக்கம்"),
            Triage::Smalltalk(SmalltalkKind::Greeting)
        );
    }

    #[test]
    fn word_boundaries_respected() {
        // "hi" must not match inside "this".
        assert_eq!(triage("this does not mean anything"), Triage::Escalate);
    }

    #[test]
    fn thanks_and_farewells() {
        assert_eq!(triage("thanks a lot"), Triage::Smalltalk(SmalltalkKind::Thanks));
        assert_eq!(triage("goodbye"), Triage::Smalltalk(SmalltalkKind::Farewell));
        assert_eq!(triage("நன்றி"), Triage::Smalltalk(SmalltalkKind::Thanks));
    }

    #[test]
    fn contextual_queries_escalate() {
        assert_eq!(triage("do you recall what i said"), Triage::Escalate);
        assert_eq!(triage("what is my name"), Triage::Escalate);
    }

    #[test]
    fn everything_else_escalates() {
        assert_eq!(triage("there is water coming into the basement"), Triage::Escalate);
    }
}
