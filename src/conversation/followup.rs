//! Follow-up question detection for conversation context memory.
//!
//! Classifies whether a message continues discussion of the previously
//! analyzed food product or opens a new topic. Supports English, Hindi,
//! Gujarati and Hinglish surface forms. Detection is a pure function over
//! ordered rule tables so individual rules can be tested and reordered
//! deliberately.

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum classification confidence at which stored food context is
/// injected into the next reasoning call. Deliberately low: short ambiguous
/// messages reuse context aggressively, at the cost of occasionally applying
/// stale context to a genuinely new question.
pub const CONTEXT_REUSE_THRESHOLD: f32 = 0.6;

// Pronouns that typically reference previous context.
const REFERENCE_PRONOUNS: &[&str] = &[
    // English
    "this", "it", "that", "these", "those",
    // Hindi (transliterated)
    "yeh", "ye", "woh", "wo", "isko", "usko", "iski", "uski", "aapko",
    // Gujarati (transliterated)
    "aa", "te",
];

// Phrases that indicate consumption/safety questions about food.
const CONSUMPTION_PHRASES: &[&str] = &[
    // English
    "can i eat",
    "can we eat",
    "safe to eat",
    "okay to eat",
    "daily",
    "every day",
    "everyday",
    "safe for kids",
    "safe for children",
    "for kids",
    "for children",
    "for babies",
    "for toddlers",
    "diabetes",
    "diabetic",
    "high bp",
    "blood pressure",
    "heart",
    "pregnant",
    "pregnancy",
    "weight loss",
    "lose weight",
    "healthy",
    "good for me",
    "bad for me",
    // Hindi
    "kya kha sakte",
    "kya le sakte",
    "safe hai",
    "theek hai",
    "roz",
    "har din",
    "bachchon ke liye",
    "bacchon ke liye",
    "sehat",
    // Gujarati
    "khaay shakay",
    "khavay",
    "safe che",
    "theek che",
    "har roj",
    "baalo mate",
    "bachcho mate",
    "swasth",
    // Hinglish
    "kha sakte hain",
    "le sakte",
    "safe hai kya",
    "roz kha sakte",
    "daily okay",
    "kids ke liye",
    "health ke liye",
    "diabetes mein",
];

const AMOUNT_PHRASES: &[&str] = &[
    "how much", "how many", "portion", "serving", "quantity", "kitna", "kitni", "ket lu", "amount",
];

const ALTERNATIVE_PHRASES: &[&str] = &[
    "instead",
    "alternative",
    "substitute",
    "replace",
    "better option",
    "uske jagah",
    "badle mein",
];

const QUESTION_WORDS: &[&str] = &[
    "what", "why", "how", "when", "should", "can", "is", "kya", "kyun", "kaise", "kab", "chahiye",
    "shu", "kyare",
];

// Phrases marking that the user is asking ABOUT a named product rather than
// introducing it for fresh analysis.
const ASKING_ABOUT_MARKERS: &[&str] = &["about", "ke baare mein", "vishay", "regarding"];

static PRODUCT_NAME_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+\s+[A-Z][a-z]+\b").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct FollowupSignal {
    pub is_followup: bool,
    pub confidence: f32,
    pub reason: String,
}

impl FollowupSignal {
    fn hit(confidence: f32, reason: String) -> Self {
        Self {
            is_followup: true,
            confidence,
            reason,
        }
    }

    fn miss(reason: String) -> Self {
        Self {
            is_followup: false,
            confidence: 0.0,
            reason,
        }
    }
}

/// Lowercased word tokens, stripped of surrounding punctuation. Pronouns and
/// question words match whole tokens only; substring matching would fire the
/// one- and two-letter transliterations ("aa", "wo") on nearly every message.
fn tokens(message: &str) -> Vec<String> {
    message
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn find_token<'a>(tokens: &[String], table: &'a [&str]) -> Option<&'a str> {
    table
        .iter()
        .find(|entry| tokens.iter().any(|t| t.as_str() == **entry))
        .copied()
}

fn find_phrase<'a>(lowered: &str, table: &'a [&str]) -> Option<&'a str> {
    table.iter().find(|phrase| lowered.contains(*phrase)).copied()
}

/// Classify a message as follow-up vs. new topic.
///
/// Deterministic: the rules below are evaluated in order and the first match
/// wins. The consumption+pronoun rule outranks the bare-pronoun rule so the
/// strongest combined signal reports its own confidence.
pub fn classify(message: &str, has_new_image: bool) -> FollowupSignal {
    // Rule 1: a new image always resets the topic.
    if has_new_image {
        return FollowupSignal::miss("New image uploaded".to_string());
    }

    let lowered = message.to_lowercase();
    let lowered = lowered.trim();
    let words = tokens(message);
    let word_count = message.split_whitespace().count();

    let pronoun = find_token(&words, REFERENCE_PRONOUNS);
    let consumption = find_phrase(lowered, CONSUMPTION_PHRASES);

    // Rule 2: consumption/safety question referencing the prior product.
    if let (Some(phrase), Some(p)) = (consumption, pronoun) {
        return FollowupSignal::hit(
            0.98,
            format!("Consumption query '{}' with pronoun '{}'", phrase, p),
        );
    }

    // Rule 3: short message leaning on a reference pronoun.
    if word_count <= 10 {
        if let Some(p) = pronoun {
            return FollowupSignal::hit(0.95, format!("Reference pronoun '{}' detected", p));
        }
    }

    // Rule 4: consumption question without a pronoun still implies follow-up.
    if let Some(phrase) = consumption {
        return FollowupSignal::hit(0.85, format!("Consumption query '{}'", phrase));
    }

    // Rule 5: amount/portion questions.
    if let Some(phrase) = find_phrase(lowered, AMOUNT_PHRASES) {
        return FollowupSignal::hit(0.8, format!("Amount query '{}'", phrase));
    }

    // Rule 6: alternative/substitute questions.
    if let Some(phrase) = find_phrase(lowered, ALTERNATIVE_PHRASES) {
        return FollowupSignal::hit(0.9, format!("Alternative query '{}'", phrase));
    }

    // Rule 7: short question starting with a question word.
    if word_count <= 8 && lowered.ends_with('?') {
        if let Some(qword) = words.first().and_then(|first| {
            QUESTION_WORDS
                .iter()
                .find(|entry| first.as_str() == **entry)
                .copied()
        }) {
            return FollowupSignal::hit(0.75, format!("Short question starting with '{}'", qword));
        }
    }

    // Rule 8: an explicit capitalized product name signals a new topic,
    // unless the user is merely asking *about* it.
    if let Some(product) = PRODUCT_NAME_PAIR.find(message) {
        let asking_about = ASKING_ABOUT_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker));
        if !asking_about {
            return FollowupSignal::miss(format!(
                "Different product mentioned: {}",
                product.as_str()
            ));
        }
    }

    // Rule 9: short ambiguous messages default to follow-up.
    if word_count <= 12 {
        return FollowupSignal::hit(0.65, "Short message, likely follow-up".to_string());
    }

    FollowupSignal::miss("Long message without follow-up indicators".to_string())
}

/// Gate deciding whether stored food context is injected into the prompt.
/// The detector itself runs regardless of whether context exists; this is
/// where the presence flags apply.
pub fn should_use_context(message: &str, has_food_context: bool, has_new_image: bool) -> bool {
    if !has_food_context || has_new_image {
        return false;
    }

    let signal = classify(message, has_new_image);
    signal.is_followup && signal.confidence >= CONTEXT_REUSE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_image_always_resets() {
        for message in ["is it safe?", "can I eat this daily?", "Maggi Noodles please"] {
            let signal = classify(message, true);
            assert!(!signal.is_followup);
            assert_eq!(signal.confidence, 0.0);
        }
    }

    #[test]
    fn consumption_with_pronoun_is_strongest() {
        let signal = classify("is it safe for kids?", false);
        assert!(signal.is_followup);
        assert_eq!(signal.confidence, 0.98);
    }

    #[test]
    fn pronoun_and_consumption_outranks_weaker_rules() {
        let signal = classify("can I eat this daily?", false);
        assert!(signal.is_followup);
        assert!(signal.confidence >= 0.95);
    }

    #[test]
    fn short_pronoun_message_is_followup() {
        let signal = classify("what is in that?", false);
        assert!(signal.is_followup);
        assert_eq!(signal.confidence, 0.95);
    }

    #[test]
    fn hindi_pronoun_detected() {
        let signal = classify("yeh theek hai kya", false);
        assert!(signal.is_followup);
        // "theek hai" is also a consumption phrase, so the combined rule fires.
        assert_eq!(signal.confidence, 0.98);
    }

    #[test]
    fn consumption_without_pronoun_scores_085() {
        let signal = classify("Can I eat vadapav daily if I have diabetes?", false);
        assert!(signal.is_followup);
        assert_eq!(signal.confidence, 0.85);
    }

    #[test]
    fn amount_query_scores_08() {
        let signal = classify("how much per day is fine for an adult human being really", false);
        assert!(signal.is_followup);
        assert_eq!(signal.confidence, 0.8);
    }

    #[test]
    fn alternative_query_scores_09() {
        let signal = classify(
            "please suggest some better option for my breakfast routine from now on please",
            false,
        );
        assert!(signal.is_followup);
        assert_eq!(signal.confidence, 0.9);
    }

    #[test]
    fn short_question_word_message_scores_075() {
        let signal = classify("why does sugar matter here?", false);
        assert!(signal.is_followup);
        assert_eq!(signal.confidence, 0.75);
    }

    #[test]
    fn explicit_product_name_is_new_topic() {
        let signal = classify(
            "Please analyze Amul Butter nutrition profile in complete exhaustive detail for me today",
            false,
        );
        assert!(!signal.is_followup);
        assert!(signal.reason.contains("Amul Butter"));
    }

    #[test]
    fn asking_about_a_product_is_not_a_new_topic() {
        let signal = classify(
            "I was wondering about Amul Butter nutrition while shopping",
            false,
        );
        // "about" marker suppresses the new-topic rule; the message then
        // falls through to the short-message default.
        assert!(signal.is_followup);
        assert_eq!(signal.confidence, 0.65);
    }

    #[test]
    fn short_ambiguous_message_defaults_to_followup() {
        let signal = classify("and sugar content", false);
        assert!(signal.is_followup);
        assert_eq!(signal.confidence, 0.65);
    }

    #[test]
    fn long_message_without_signals_is_not_followup() {
        let signal = classify(
            "I have been reading a lot of nutrition research lately and wanted to share some general thoughts with you today",
            false,
        );
        assert!(!signal.is_followup);
        assert_eq!(signal.confidence, 0.0);
    }

    #[test]
    fn classification_is_deterministic() {
        let message = "is it safe for kids?";
        let first = classify(message, false);
        for _ in 0..10 {
            assert_eq!(classify(message, false), first);
        }
    }

    #[test]
    fn gujarati_short_transliterations_do_not_fire_as_substrings() {
        // "aa" and "te" appear inside many English words; token matching
        // keeps them from hijacking unrelated messages.
        let signal = classify(
            "what water temperature is best suited for brewing green tea leaves carefully today",
            false,
        );
        assert!(!signal.is_followup);
    }

    #[test]
    fn should_use_context_requires_stored_context() {
        assert!(!should_use_context("is it safe for kids?", false, false));
    }

    #[test]
    fn should_use_context_blocked_by_new_image() {
        assert!(!should_use_context("is it safe for kids?", true, true));
    }

    #[test]
    fn should_use_context_applies_threshold() {
        assert!(should_use_context("is it safe for kids?", true, false));
        assert!(should_use_context("and sugar content", true, false)); // 0.65 >= 0.6
        assert!(!should_use_context(
            "I have been reading a lot of nutrition research lately and wanted to share some general thoughts with you today",
            true,
            false
        ));
    }
}
