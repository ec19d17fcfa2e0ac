//! Soft context inference and merging.
//!
//! "Soft" context is an explicitly uncertain, hedge-qualified read of what
//! the user likely cares about, as opposed to the structured intent profile.
//! Uncertainty is a valid steady state here: a failed or unparsable
//! inference yields the fallback context, never an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm::json_guard::extract_json;
use crate::llm::models::GenerateOptions;
use crate::llm::ReasoningProvider;
use crate::conversation::prompts;
use crate::session::ChatMessage;

/// Upper bound on accumulated soft concerns across any number of merges.
pub const SOFT_CONCERNS_CAP: usize = 3;

const GENERIC_HEDGE: &str = "I'm not fully sure, but this might be what you're looking for.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Uncertain,
    SomewhatSure,
    FairlyConfident,
}

impl Default for ConfidenceLevel {
    fn default() -> Self {
        Self::Uncertain
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftContext {
    #[serde(default)]
    pub likely_goal: Option<String>,
    #[serde(default)]
    pub possible_context: Option<String>,
    #[serde(default)]
    pub soft_concerns: Vec<String>,
    #[serde(default)]
    pub confidence_level: ConfidenceLevel,
    #[serde(default)]
    pub hedge_language: Option<String>,
    #[serde(default)]
    pub detected_language: Option<String>,
}

impl SoftContext {
    /// Well-defined default used whenever inference fails.
    pub fn fallback() -> Self {
        Self {
            likely_goal: Some("curiosity".to_string()),
            possible_context: None,
            soft_concerns: Vec::new(),
            confidence_level: ConfidenceLevel::Uncertain,
            hedge_language: Some(GENERIC_HEDGE.to_string()),
            detected_language: None,
        }
    }

    fn has_hedge(&self) -> bool {
        self.hedge_language
            .as_deref()
            .map(|h| !h.trim().is_empty())
            .unwrap_or(false)
    }

    /// Merge a new inference into the previously held one.
    ///
    /// A more confident read replaces the old one wholesale (with a hedge
    /// enforced — soft context is never presented unhedged). Anything else
    /// keeps the old read and only accumulates concerns, so a noisy
    /// low-confidence turn can never downgrade settled context.
    pub fn merge(old: &SoftContext, new: &SoftContext) -> SoftContext {
        if new.confidence_level > old.confidence_level {
            let mut merged = new.clone();
            if !merged.has_hedge() {
                merged.hedge_language = Some(GENERIC_HEDGE.to_string());
            }
            merged.soft_concerns.truncate(SOFT_CONCERNS_CAP);
            return merged;
        }

        let mut merged = old.clone();
        for concern in &new.soft_concerns {
            if merged.soft_concerns.len() >= SOFT_CONCERNS_CAP {
                break;
            }
            if !merged.soft_concerns.contains(concern) {
                merged.soft_concerns.push(concern.clone());
            }
        }
        merged
    }

    /// Flatten into the session's key-value context map for shallow merging.
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Read back from the session context map; missing or malformed fields
    /// collapse to defaults rather than failing.
    pub fn from_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        serde_json::from_value(serde_json::Value::Object(map.clone())).unwrap_or_default()
    }
}

/// Wraps the reasoning provider for soft context inference.
pub struct ContextInferencer {
    provider: Arc<dyn ReasoningProvider>,
}

impl ContextInferencer {
    pub fn new(provider: Arc<dyn ReasoningProvider>) -> Self {
        Self { provider }
    }

    pub async fn infer(
        &self,
        message: &str,
        recent_history: &[ChatMessage],
        existing_context: &serde_json::Map<String, serde_json::Value>,
    ) -> SoftContext {
        let recent = format_history(recent_history);
        let existing = if existing_context.is_empty() {
            "none".to_string()
        } else {
            serde_json::Value::Object(existing_context.clone()).to_string()
        };

        let prompt = prompts::soft_context_prompt(message, &recent, &existing);
        let options = GenerateOptions {
            system_instruction: Some(prompts::SOFT_CONTEXT_SYSTEM_PROMPT.to_string()),
            temperature: Some(0.3),
            ..Default::default()
        };

        let response = match self.provider.generate(&prompt, options).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Soft context inference failed, using fallback: {}", e);
                return SoftContext::fallback();
            }
        };

        match extract_json(&response.content)
            .ok()
            .and_then(|v| serde_json::from_value::<SoftContext>(v).ok())
        {
            Some(mut context) => {
                context.soft_concerns.truncate(SOFT_CONCERNS_CAP);
                if !context.has_hedge() {
                    context.hedge_language = Some(GENERIC_HEDGE.to_string());
                }
                context
            }
            None => {
                warn!("Soft context response unparsable, using fallback");
                SoftContext::fallback()
            }
        }
    }
}

pub fn format_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return "none".to_string();
    }
    history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(level: ConfidenceLevel, concerns: &[&str]) -> SoftContext {
        SoftContext {
            likely_goal: Some("health_check".to_string()),
            soft_concerns: concerns.iter().map(|s| s.to_string()).collect(),
            confidence_level: level,
            hedge_language: Some("maybe".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn higher_confidence_adopts_new() {
        let old = context(ConfidenceLevel::Uncertain, &["sugar"]);
        let mut new = context(ConfidenceLevel::FairlyConfident, &["sodium"]);
        new.likely_goal = Some("child_safety".to_string());

        let merged = SoftContext::merge(&old, &new);
        assert_eq!(merged.likely_goal.as_deref(), Some("child_safety"));
        assert_eq!(merged.confidence_level, ConfidenceLevel::FairlyConfident);
        assert_eq!(merged.soft_concerns, vec!["sodium"]);
    }

    #[test]
    fn adopted_context_is_never_unhedged() {
        let old = context(ConfidenceLevel::Uncertain, &[]);
        let mut new = context(ConfidenceLevel::SomewhatSure, &[]);
        new.hedge_language = Some("   ".to_string());

        let merged = SoftContext::merge(&old, &new);
        assert!(merged.hedge_language.as_deref().unwrap().trim().len() > 0);
    }

    #[test]
    fn lower_confidence_never_downgrades() {
        let old = context(ConfidenceLevel::FairlyConfident, &["sugar"]);
        let new = context(ConfidenceLevel::Uncertain, &["palm oil"]);

        let merged = SoftContext::merge(&old, &new);
        assert_eq!(merged.confidence_level, ConfidenceLevel::FairlyConfident);
        assert_eq!(merged.likely_goal, old.likely_goal);
        // Concerns still accumulate.
        assert_eq!(merged.soft_concerns, vec!["sugar", "palm oil"]);
    }

    #[test]
    fn merge_confidence_is_monotone() {
        let levels = [
            ConfidenceLevel::Uncertain,
            ConfidenceLevel::SomewhatSure,
            ConfidenceLevel::FairlyConfident,
        ];
        for &a in &levels {
            for &b in &levels {
                let merged = SoftContext::merge(&context(a, &[]), &context(b, &[]));
                assert!(merged.confidence_level >= a);
            }
        }
    }

    #[test]
    fn concerns_stay_bounded_across_merges() {
        let mut acc = context(ConfidenceLevel::FairlyConfident, &[]);
        for i in 0..10 {
            let new = context(ConfidenceLevel::Uncertain, &[&format!("concern-{}", i)]);
            acc = SoftContext::merge(&acc, &new);
            assert!(acc.soft_concerns.len() <= SOFT_CONCERNS_CAP);
        }
        assert_eq!(acc.soft_concerns.len(), SOFT_CONCERNS_CAP);
    }

    #[test]
    fn concern_union_deduplicates() {
        let old = context(ConfidenceLevel::SomewhatSure, &["sugar"]);
        let new = context(ConfidenceLevel::Uncertain, &["sugar", "sodium"]);
        let merged = SoftContext::merge(&old, &new);
        assert_eq!(merged.soft_concerns, vec!["sugar", "sodium"]);
    }

    #[test]
    fn fallback_is_uncertain_and_hedged() {
        let fallback = SoftContext::fallback();
        assert_eq!(fallback.likely_goal.as_deref(), Some("curiosity"));
        assert_eq!(fallback.confidence_level, ConfidenceLevel::Uncertain);
        assert!(fallback.soft_concerns.is_empty());
        assert!(fallback.has_hedge());
    }

    #[test]
    fn map_round_trip_preserves_fields() {
        let original = context(ConfidenceLevel::SomewhatSure, &["sugar"]);
        let restored = SoftContext::from_map(&original.to_map());
        assert_eq!(restored, original);
    }

    #[test]
    fn from_map_tolerates_foreign_keys_and_defaults() {
        let mut map = serde_json::Map::new();
        map.insert("unrelated".into(), serde_json::json!(42));
        let restored = SoftContext::from_map(&map);
        assert_eq!(restored.confidence_level, ConfidenceLevel::Uncertain);
    }
}
