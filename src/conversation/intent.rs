//! Structured intent inference and the cross-turn merge policy.

use std::sync::Arc;

use tracing::{info, warn};

use crate::llm::json_guard::extract_json;
use crate::llm::models::GenerateOptions;
use crate::llm::ReasoningProvider;
use crate::conversation::context::format_history;
use crate::conversation::prompts;
use crate::session::{ChatMessage, IntentConfidence, IntentProfile};

pub struct IntentService {
    provider: Arc<dyn ReasoningProvider>,
}

impl IntentService {
    pub fn new(provider: Arc<dyn ReasoningProvider>) -> Self {
        Self { provider }
    }

    /// Infer an intent profile from the current message and surrounding
    /// context. One stricter-prompt retry on unparsable output; any failure
    /// after that yields a low-confidence profile carrying a clarifying
    /// question.
    pub async fn infer(
        &self,
        message: &str,
        ingredients: &[String],
        recent_history: &[ChatMessage],
        existing_context: &serde_json::Map<String, serde_json::Value>,
    ) -> IntentProfile {
        let recent = format_history(recent_history);
        let ingredients_str = if ingredients.is_empty() {
            "none".to_string()
        } else {
            ingredients.join(", ")
        };
        let existing = if existing_context.is_empty() {
            "none".to_string()
        } else {
            serde_json::Value::Object(existing_context.clone()).to_string()
        };

        let prompt = prompts::intent_prompt(message, &recent, &ingredients_str, &existing);
        let options = GenerateOptions {
            system_instruction: Some(prompts::INTENT_SYSTEM_PROMPT.to_string()),
            temperature: Some(0.3),
            ..Default::default()
        };

        match self.try_infer(&prompt, options.clone()).await {
            Some(profile) => {
                info!("Inferred intent: {:?}", profile.user_goal);
                profile
            }
            None => {
                let strict = format!("{}{}", prompt, prompts::STRICT_JSON_SUFFIX);
                match self.try_infer(&strict, options).await {
                    Some(profile) => profile,
                    None => {
                        warn!("Intent inference failed twice, using fallback profile");
                        Self::fallback_profile()
                    }
                }
            }
        }
    }

    async fn try_infer(&self, prompt: &str, options: GenerateOptions) -> Option<IntentProfile> {
        let response = self.provider.generate(prompt, options).await.ok()?;
        let value = extract_json(&response.content).ok()?;
        serde_json::from_value(value).ok()
    }

    fn fallback_profile() -> IntentProfile {
        IntentProfile {
            confidence: IntentConfidence::Low,
            clarifying_question: Some(
                "Could you tell me more about what you're looking for?".to_string(),
            ),
            ..Default::default()
        }
    }
}

/// Merge a newly inferred profile into the previously stored one.
///
/// Settled fields must be earned: `user_goal` and `dietary_style` only move
/// when the new read is high-confidence, or medium against a low-confidence
/// holdover. Allergy risks and concerns accumulate irreversibly within a
/// session. Confidence is sticky upward, and the clarifying question
/// disappears once confidence rises.
pub fn merge(old: &IntentProfile, new: &IntentProfile) -> IntentProfile {
    let overwrite_settled = new.confidence == IntentConfidence::High
        || (new.confidence == IntentConfidence::Medium && old.confidence == IntentConfidence::Low);

    let user_goal = if overwrite_settled && new.user_goal.is_some() {
        new.user_goal.clone()
    } else {
        old.user_goal.clone()
    };
    let dietary_style = if overwrite_settled && new.dietary_style.is_some() {
        new.dietary_style.clone()
    } else {
        old.dietary_style.clone()
    };

    let allergy_risks = old.allergy_risks.union(&new.allergy_risks).cloned().collect();
    let top_concerns = old.top_concerns.union(&new.top_concerns).cloned().collect();

    let audience = new.audience.clone().or_else(|| old.audience.clone());

    let confidence = if old.confidence == IntentConfidence::High
        || new.confidence == IntentConfidence::High
    {
        IntentConfidence::High
    } else {
        new.confidence
    };

    let clarifying_question = if confidence == IntentConfidence::Low {
        new.clarifying_question.clone()
    } else {
        None
    };

    IntentProfile {
        user_goal,
        dietary_style,
        allergy_risks,
        audience,
        top_concerns,
        confidence,
        clarifying_question,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn profile(confidence: IntentConfidence) -> IntentProfile {
        IntentProfile {
            confidence,
            ..Default::default()
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn high_confidence_overwrites_goal_and_diet() {
        let mut old = profile(IntentConfidence::High);
        old.user_goal = Some("health_check".to_string());
        old.dietary_style = Some("vegetarian".to_string());

        let mut new = profile(IntentConfidence::High);
        new.user_goal = Some("allergy_safety".to_string());
        new.dietary_style = Some("vegan".to_string());

        let merged = merge(&old, &new);
        assert_eq!(merged.user_goal.as_deref(), Some("allergy_safety"));
        assert_eq!(merged.dietary_style.as_deref(), Some("vegan"));
    }

    #[test]
    fn medium_overwrites_only_low_confidence_holdover() {
        let mut old_low = profile(IntentConfidence::Low);
        old_low.user_goal = Some("curiosity".to_string());
        let mut new_medium = profile(IntentConfidence::Medium);
        new_medium.user_goal = Some("weight_loss".to_string());
        assert_eq!(
            merge(&old_low, &new_medium).user_goal.as_deref(),
            Some("weight_loss")
        );

        let mut old_medium = profile(IntentConfidence::Medium);
        old_medium.user_goal = Some("curiosity".to_string());
        assert_eq!(
            merge(&old_medium, &new_medium).user_goal.as_deref(),
            Some("curiosity")
        );
    }

    #[test]
    fn absent_new_goal_never_clears_old() {
        let mut old = profile(IntentConfidence::Low);
        old.user_goal = Some("health_check".to_string());
        let new = profile(IntentConfidence::High);

        assert_eq!(merge(&old, &new).user_goal.as_deref(), Some("health_check"));
    }

    #[test]
    fn allergy_risks_are_a_superset_of_both_sides() {
        let mut old = profile(IntentConfidence::Low);
        old.allergy_risks = set(&["peanuts"]);
        let mut new = profile(IntentConfidence::Medium);
        new.allergy_risks = set(&["dairy"]);

        let merged = merge(&old, &new);
        assert_eq!(merged.allergy_risks, set(&["peanuts", "dairy"]));
        // Neither side is high, so confidence follows the new profile.
        assert_eq!(merged.confidence, IntentConfidence::Medium);
    }

    #[test]
    fn allergy_risks_never_shrink_across_a_merge_sequence() {
        let mut acc = profile(IntentConfidence::Low);
        let mut all: BTreeSet<String> = BTreeSet::new();

        for (i, conf) in [
            IntentConfidence::Medium,
            IntentConfidence::Low,
            IntentConfidence::High,
            IntentConfidence::Low,
        ]
        .into_iter()
        .enumerate()
        {
            let mut new = profile(conf);
            new.allergy_risks = set(&[&format!("risk-{}", i)]);
            all.extend(new.allergy_risks.iter().cloned());
            acc = merge(&acc, &new);
            assert!(acc.allergy_risks.is_superset(&all));
        }
    }

    #[test]
    fn audience_newest_explicit_signal_wins() {
        let mut old = profile(IntentConfidence::High);
        old.audience = Some("self".to_string());
        let mut new = profile(IntentConfidence::Low);
        new.audience = Some("kid".to_string());
        assert_eq!(merge(&old, &new).audience.as_deref(), Some("kid"));

        new.audience = None;
        assert_eq!(merge(&old, &new).audience.as_deref(), Some("self"));
    }

    #[test]
    fn confidence_is_sticky_upward() {
        let old = profile(IntentConfidence::High);
        let new = profile(IntentConfidence::Low);
        assert_eq!(merge(&old, &new).confidence, IntentConfidence::High);

        let old = profile(IntentConfidence::Medium);
        let new = profile(IntentConfidence::Low);
        assert_eq!(merge(&old, &new).confidence, IntentConfidence::Low);
    }

    #[test]
    fn clarifying_question_suppressed_once_confident() {
        let old = profile(IntentConfidence::Low);
        let mut new = profile(IntentConfidence::Medium);
        new.clarifying_question = Some("Which diet do you follow?".to_string());
        assert!(merge(&old, &new).clarifying_question.is_none());

        let mut new_low = profile(IntentConfidence::Low);
        new_low.clarifying_question = Some("Which diet do you follow?".to_string());
        assert!(merge(&old, &new_low).clarifying_question.is_some());
    }
}
