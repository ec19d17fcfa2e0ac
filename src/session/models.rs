use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of the most recently analyzed food product in a session.
/// There is never more than one; a new image upload clears it before any
/// replacement is stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoodContext {
    pub product_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentConfidence {
    Low,
    Medium,
    High,
}

impl Default for IntentConfidence {
    fn default() -> Self {
        Self::Medium
    }
}

/// Structured (non-hedged) record of what the user is trying to decide.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentProfile {
    #[serde(default)]
    pub user_goal: Option<String>,
    #[serde(default)]
    pub dietary_style: Option<String>,
    #[serde(default)]
    pub allergy_risks: BTreeSet<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub top_concerns: BTreeSet<String>,
    #[serde(default)]
    pub confidence: IntentConfidence,
    #[serde(default)]
    pub clarifying_question: Option<String>,
}

/// Intent inference runs once per session. The tri-state keeps that policy
/// explicit: a future revalidation pass can flip `Inferred` to `Stale`
/// without touching the store API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "profile", rename_all = "snake_case")]
pub enum IntentState {
    #[default]
    NotInferred,
    Inferred(IntentProfile),
    Stale(IntentProfile),
}

impl IntentState {
    pub fn profile(&self) -> Option<&IntentProfile> {
        match self {
            Self::NotInferred => None,
            Self::Inferred(p) | Self::Stale(p) => Some(p),
        }
    }

    /// True when a fresh inference pass is warranted.
    pub fn needs_inference(&self) -> bool {
        !matches!(self, Self::Inferred(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
    pub context: serde_json::Map<String, serde_json::Value>,
    pub intent: IntentState,
    pub food_context: Option<FoodContext>,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_accessed: now,
            messages: Vec::new(),
            context: serde_json::Map::new(),
            intent: IntentState::NotInferred,
            food_context: None,
        }
    }
}
