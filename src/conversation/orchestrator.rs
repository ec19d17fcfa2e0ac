//! Per-turn conversation control flow.
//!
//! The orchestrator owns the ordering invariants of a turn:
//!
//! 1. resolve the session id,
//! 2. snapshot history/context/intent/food-context,
//! 3. clear stored food context when the turn carries a new image — before
//!    follow-up classification runs,
//! 4. classify follow-up and decide context reuse,
//! 5. soft-infer context and merge it into the store,
//! 6. infer intent only while the session has none,
//! 7. append the user message, then generate,
//! 8. append the assistant message,
//! 9. state from steps 5–6 is already persisted at that point, so a failed
//!    generation still leaves the session consistent.
//!
//! The history snapshot from step 2 (prior turns only, never the current
//! message) is the one context block every inference and generation call
//! sees; the current message always travels as its own prompt element.
//!
//! Each turn runs under the session's turn lock, serializing same-session
//! requests while leaving other sessions fully concurrent.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::config::ChatConfig;
use crate::conversation::context::{ContextInferencer, SoftContext};
use crate::conversation::followup::{self, FollowupSignal};
use crate::conversation::intent::{self, IntentService};
use crate::conversation::reasoning::{card_to_narrative, AnalysisInput, ReasoningEngine};
use crate::llm::models::InsightCard;
use crate::llm::ReasoningProvider;
use crate::session::{
    ChatMessage, FoodContext, IntentProfile, IntentState, Role, SessionStore,
};
use crate::tools::{extract, IngredientKb, OpenFoodFactsClient};

/// User-facing reply when generation cannot produce anything meaningful.
pub const FALLBACK_REPLY: &str =
    "I'm having trouble answering right now. Could you try asking again in a moment?";

/// Prior turns handed to soft-context and intent inference.
const INFERENCE_HISTORY_WINDOW: usize = 3;

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("image exceeds the allowed size or has an unsupported format")]
    InvalidImage,
}

#[derive(Debug)]
pub struct ChatOutcome {
    pub session_id: Uuid,
    pub reply: String,
    pub used_food_context: bool,
    pub followup: FollowupSignal,
    pub message_count: usize,
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub session_id: Uuid,
    pub card: InsightCard,
    pub ingredients: Vec<String>,
    pub extracted_text: Option<String>,
}

struct TurnState {
    session_id: Uuid,
    history: Vec<ChatMessage>,
    soft_context: SoftContext,
    intent: Option<IntentProfile>,
    food_context: Option<FoodContext>,
    followup: FollowupSignal,
    use_food_context: bool,
}

pub struct Orchestrator {
    store: Arc<SessionStore>,
    engine: ReasoningEngine,
    context: ContextInferencer,
    intent: IntentService,
    chat_config: ChatConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<dyn ReasoningProvider>,
        kb: Arc<IngredientKb>,
        off: Arc<OpenFoodFactsClient>,
        chat_config: ChatConfig,
    ) -> Self {
        Self {
            store,
            engine: ReasoningEngine::new(provider.clone(), kb, off),
            context: ContextInferencer::new(provider.clone()),
            intent: IntentService::new(provider),
            chat_config,
        }
    }

    fn resolve_session(&self, session_id: Option<Uuid>) -> Uuid {
        match session_id {
            Some(id) => self.store.get_or_create(id),
            None => self.store.create(),
        }
    }

    /// Steps 2–6. Runs with the turn lock already held by the caller.
    async fn prepare_turn(&self, session_id: Uuid, message: &str, has_new_image: bool) -> TurnState {
        if has_new_image {
            // Image-driven topic reset happens before classification sees
            // the context-presence flag.
            self.store.clear_food_context(session_id);
        }

        let history = self.store.history(session_id);
        let context_map = self.store.get_context(session_id);
        let food_context = self.store.get_food_context(session_id);

        let followup = followup::classify(message, has_new_image);
        let use_food_context =
            followup::should_use_context(message, food_context.is_some(), has_new_image);
        if use_food_context {
            info!(
                "Using stored food context: {} (confidence {:.2})",
                followup.reason, followup.confidence
            );
        } else {
            info!(
                "Not using stored food context: {} (confidence {:.2})",
                followup.reason, followup.confidence
            );
        }

        let recent = tail(&history, INFERENCE_HISTORY_WINDOW);
        let new_soft = self.context.infer(message, recent, &context_map).await;
        // First turn has no prior soft read to defend; adopt the inference
        // as-is. Afterwards the merge policy decides what survives.
        let merged_soft = if context_map.is_empty() {
            new_soft
        } else {
            SoftContext::merge(&SoftContext::from_map(&context_map), &new_soft)
        };
        self.store
            .merge_context(session_id, merged_soft.to_map());

        let intent_state = self.store.get_intent(session_id);
        let intent = if intent_state.needs_inference() {
            let inferred = self.intent.infer(message, &[], recent, &context_map).await;
            let merged = match intent_state.profile() {
                Some(old) => intent::merge(old, &inferred),
                None => inferred,
            };
            self.store
                .set_intent(session_id, IntentState::Inferred(merged.clone()));
            Some(merged)
        } else {
            intent_state.profile().cloned()
        };

        TurnState {
            session_id,
            history,
            soft_context: merged_soft,
            intent,
            food_context,
            followup,
            use_food_context,
        }
    }

    fn build_chat_prompt(&self, state: &TurnState, message: &str) -> String {
        let mut parts: Vec<String> = Vec::new();

        if state.use_food_context {
            if let Some(food) = &state.food_context {
                let mut food_lines = format!("Previously analyzed product: {}", food.product_name);
                if let Some(brand) = &food.brand {
                    food_lines.push_str(&format!(" by {}", brand));
                }
                if !food.ingredients.is_empty() {
                    let shown: Vec<&str> =
                        food.ingredients.iter().take(10).map(|s| s.as_str()).collect();
                    food_lines.push_str(&format!("\nIts ingredients: {}", shown.join(", ")));
                }
                if let Some(summary) = &food.summary {
                    food_lines.push_str(&format!("\nEarlier verdict: {}", summary));
                }
                parts.push(food_lines);
                parts.push(
                    "The user's question refers to this product unless they clearly say otherwise."
                        .to_string(),
                );
            }
        }

        if let Some(intent) = &state.intent {
            let mut summary: Vec<String> = Vec::new();
            if let Some(goal) = &intent.user_goal {
                summary.push(format!("goal {}", goal));
            }
            if let Some(diet) = &intent.dietary_style {
                summary.push(format!("diet {}", diet));
            }
            if !intent.allergy_risks.is_empty() {
                let risks: Vec<&str> =
                    intent.allergy_risks.iter().map(|s| s.as_str()).collect();
                summary.push(format!("allergies {}", risks.join("/")));
            }
            if !summary.is_empty() {
                parts.push(format!("What we know about the user: {}", summary.join(", ")));
            }
        }

        if let Some(hedge) = &state.soft_context.hedge_language {
            parts.push(format!("Soft read of the user (hedged): {}", hedge));
        }

        let window = tail(&state.history, self.chat_config.max_history_messages);
        if !window.is_empty() {
            let lines: Vec<String> = window
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect();
            parts.push(format!("Conversation history:\n{}", lines.join("\n")));
        }

        parts.push(format!("user: {}", message));
        parts.join("\n\n")
    }

    /// Non-streaming chat turn.
    pub async fn chat_turn(
        &self,
        session_id: Option<Uuid>,
        message: &str,
    ) -> Result<ChatOutcome, TurnError> {
        let message = valid_message(message)?;
        let session_id = self.resolve_session(session_id);
        let lock = self.store.turn_lock(session_id);
        let _guard = lock.lock().await;

        let state = self.prepare_turn(session_id, message, false).await;
        self.store.append_message(session_id, Role::User, message);

        let prompt = self.build_chat_prompt(&state, message);
        let reply = match self
            .engine
            .chat_reply(&prompt, self.chat_config.system_prompt.as_deref())
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Chat generation failed, serving fallback: {}", e);
                FALLBACK_REPLY.to_string()
            }
        };

        self.store.append_message(session_id, Role::Assistant, &reply);

        Ok(ChatOutcome {
            session_id,
            reply,
            used_food_context: state.use_food_context,
            followup: state.followup,
            message_count: self.store.message_count(session_id),
        })
    }

    /// Streaming chat turn. Chunks are forwarded in emission order; the full
    /// reply is accumulated and persisted even if the client stops
    /// listening mid-stream (sends to a closed receiver are ignored, the
    /// drain continues).
    pub async fn chat_turn_streaming(
        &self,
        session_id: Option<Uuid>,
        message: &str,
        client_tx: Sender<String>,
    ) -> Result<ChatOutcome, TurnError> {
        let message = valid_message(message)?;
        let session_id = self.resolve_session(session_id);
        let lock = self.store.turn_lock(session_id);
        let _guard = lock.lock().await;

        let state = self.prepare_turn(session_id, message, false).await;
        self.store.append_message(session_id, Role::User, message);

        let prompt = self.build_chat_prompt(&state, message);
        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(100);

        let system_prompt = self.chat_config.system_prompt.clone();
        let engine = &self.engine;
        let stream_task = engine.chat_reply_streaming(&prompt, system_prompt.as_deref(), tx);

        let mut full_reply = String::new();
        let drain_task = async {
            while let Some(chunk) = rx.recv().await {
                full_reply.push_str(&chunk);
                // A failed send means the client went away; keep draining so
                // the complete reply can still be persisted.
                let _ = client_tx.send(chunk).await;
            }
        };

        let (stream_result, _) = tokio::join!(stream_task, drain_task);
        if let Err(e) = stream_result {
            warn!("Streaming generation failed: {}", e);
        }
        if full_reply.is_empty() {
            full_reply = FALLBACK_REPLY.to_string();
            let _ = client_tx.send(full_reply.clone()).await;
        }

        self.store
            .append_message(session_id, Role::Assistant, &full_reply);

        Ok(ChatOutcome {
            session_id,
            reply: full_reply,
            used_food_context: state.use_food_context,
            followup: state.followup,
            message_count: self.store.message_count(session_id),
        })
    }

    /// Text analysis turn: extract ingredients, generate an insight card,
    /// remember the product for follow-ups.
    pub async fn analyze_text_turn(
        &self,
        session_id: Option<Uuid>,
        text: &str,
    ) -> Result<AnalysisOutcome, TurnError> {
        let text = valid_message(text)?;
        let session_id = self.resolve_session(session_id);
        let lock = self.store.turn_lock(session_id);
        let _guard = lock.lock().await;

        let state = self.prepare_turn(session_id, text, false).await;
        self.store.append_message(session_id, Role::User, text);

        let ingredients = extract::extract_ingredients(text);
        let recent = tail(&state.history, INFERENCE_HISTORY_WINDOW);
        let card = self
            .engine
            .analyze(AnalysisInput {
                user_input: text,
                ingredients: ingredients.clone(),
                barcode: None,
                intent: state.intent.as_ref(),
                soft_context: Some(&state.soft_context),
                recent_history: recent,
            })
            .await;

        if !card.is_fallback() {
            self.store.set_food_context(
                session_id,
                FoodContext {
                    product_name: card.ai_insight_title.clone(),
                    brand: None,
                    barcode: card.barcode.clone(),
                    ingredients: ingredients.clone(),
                    summary: Some(card.quick_verdict.clone()),
                },
            );
        }

        let narrative = card_to_narrative(&card);
        self.store
            .append_message(session_id, Role::Assistant, &narrative);

        Ok(AnalysisOutcome {
            session_id,
            card,
            ingredients,
            extracted_text: None,
        })
    }

    /// Image analysis turn. The stored food context is cleared before
    /// anything else so follow-up classification never sees the old product.
    pub async fn analyze_image_turn(
        &self,
        session_id: Option<Uuid>,
        image: &[u8],
        mime_type: &str,
        include_raw_text: bool,
    ) -> Result<AnalysisOutcome, TurnError> {
        let session_id = self.resolve_session(session_id);
        let lock = self.store.turn_lock(session_id);
        let _guard = lock.lock().await;

        let placeholder = "Shared a photo of a food product";
        self.prepare_turn(session_id, placeholder, true).await;
        self.store.append_message(session_id, Role::User, placeholder);

        let card = self.engine.analyze_image(image, mime_type).await;

        let (extracted_text, ingredients) = if include_raw_text {
            let raw = self.engine.transcribe_label(image, mime_type).await;
            let ingredients = extract::extract_ingredients(&raw);
            (Some(raw), ingredients)
        } else {
            (None, Vec::new())
        };

        if !card.is_fallback() {
            self.store.set_food_context(
                session_id,
                FoodContext {
                    product_name: card.ai_insight_title.clone(),
                    brand: None,
                    barcode: card.barcode.clone(),
                    ingredients: ingredients.clone(),
                    summary: Some(card.quick_verdict.clone()),
                },
            );
        }

        let narrative = card_to_narrative(&card);
        self.store
            .append_message(session_id, Role::Assistant, &narrative);

        Ok(AnalysisOutcome {
            session_id,
            card,
            ingredients,
            extracted_text,
        })
    }

    /// Explicit intent endpoint: always re-infers and merges, refreshing the
    /// stored slot (external reset path for the one-shot policy).
    pub async fn infer_intent(
        &self,
        session_id: Option<Uuid>,
        message: &str,
        ingredients: &[String],
    ) -> Result<(Uuid, IntentProfile), TurnError> {
        let message = valid_message(message)?;
        let session_id = self.resolve_session(session_id);
        let lock = self.store.turn_lock(session_id);
        let _guard = lock.lock().await;

        let history = self.store.history(session_id);
        let context_map = self.store.get_context(session_id);
        let recent = tail(&history, INFERENCE_HISTORY_WINDOW);

        let inferred = self
            .intent
            .infer(message, ingredients, recent, &context_map)
            .await;
        let merged = match self.store.get_intent(session_id).profile() {
            Some(old) => intent::merge(old, &inferred),
            None => inferred,
        };
        self.store
            .set_intent(session_id, IntentState::Inferred(merged.clone()));

        Ok((session_id, merged))
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

fn valid_message(message: &str) -> Result<&str, TurnError> {
    let trimmed = message.trim();
    if trimmed.is_empty() || !extract::validate_input(trimmed) {
        return Err(TurnError::EmptyMessage);
    }
    Ok(trimmed)
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}
