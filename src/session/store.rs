use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::session::models::{ChatMessage, FoodContext, IntentState, Role, Session};

/// In-process source of truth for per-session conversational state.
///
/// Read paths on an unknown id return empty defaults and write paths
/// auto-create the session; no operation fails for a missing session. The
/// auto-create behavior is deliberate (conversational robustness over strict
/// validation) and is exposed through the named `get_or_create` so callers
/// opt in rather than depend on a hidden side effect.
///
/// The inner locks are held only for the duration of a single map operation,
/// never across an `.await`. Serialization of a whole conversational turn
/// (read-modify-write spanning provider calls) is the orchestrator's job via
/// `turn_lock`.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
    turn_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(id, Session::new(id));
        info!("Created session {}", id);
        id
    }

    /// Strict read: `None` when the session does not exist. Bumps
    /// `last_accessed` on hit.
    pub fn get(&self, id: Uuid) -> Option<Session> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(&id)?;
        session.last_accessed = Utc::now();
        Some(session.clone())
    }

    pub fn exists(&self, id: Uuid) -> bool {
        self.sessions.read().unwrap().contains_key(&id)
    }

    /// Get-or-create: the explicit auto-create entry point used by every
    /// write path.
    pub fn get_or_create(&self, id: Uuid) -> Uuid {
        let mut sessions = self.sessions.write().unwrap();
        sessions.entry(id).or_insert_with(|| {
            info!("Auto-created session {}", id);
            Session::new(id)
        });
        id
    }

    pub fn append_message(&self, id: Uuid, role: Role, content: &str) {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.entry(id).or_insert_with(|| Session::new(id));
        session.messages.push(ChatMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn history(&self, id: Uuid) -> Vec<ChatMessage> {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(&id) {
            Some(session) => {
                session.last_accessed = Utc::now();
                session.messages.clone()
            }
            None => Vec::new(),
        }
    }

    pub fn message_count(&self, id: Uuid) -> usize {
        let sessions = self.sessions.read().unwrap();
        sessions.get(&id).map(|s| s.messages.len()).unwrap_or(0)
    }

    /// Shallow merge: later keys overwrite, non-overlapping keys union.
    pub fn merge_context(&self, id: Uuid, partial: serde_json::Map<String, serde_json::Value>) {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.entry(id).or_insert_with(|| Session::new(id));
        for (key, value) in partial {
            session.context.insert(key, value);
        }
    }

    pub fn get_context(&self, id: Uuid) -> serde_json::Map<String, serde_json::Value> {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(&id) {
            Some(session) => {
                session.last_accessed = Utc::now();
                session.context.clone()
            }
            None => serde_json::Map::new(),
        }
    }

    pub fn get_intent(&self, id: Uuid) -> IntentState {
        let mut sessions = self.sessions.write().unwrap();
        match sessions.get_mut(&id) {
            Some(session) => {
                session.last_accessed = Utc::now();
                session.intent.clone()
            }
            None => IntentState::default(),
        }
    }

    pub fn set_intent(&self, id: Uuid, intent: IntentState) {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.entry(id).or_insert_with(|| Session::new(id));
        session.intent = intent;
    }

    pub fn get_food_context(&self, id: Uuid) -> Option<FoodContext> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(&id)?;
        session.last_accessed = Utc::now();
        session.food_context.clone()
    }

    pub fn set_food_context(&self, id: Uuid, food: FoodContext) {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.entry(id).or_insert_with(|| Session::new(id));
        session.food_context = Some(food);
    }

    pub fn clear_food_context(&self, id: Uuid) {
        let mut sessions = self.sessions.write().unwrap();
        if let Some(session) = sessions.get_mut(&id) {
            session.food_context = None;
        }
    }

    /// Per-session turn lock. The orchestrator holds it for the whole
    /// read-modify-write of a turn so two concurrent requests on the same
    /// session cannot interleave; different sessions proceed independently.
    pub fn turn_lock(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.turn_locks.lock().unwrap();
        locks
            .entry(id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
