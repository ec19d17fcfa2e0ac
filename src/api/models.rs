use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::models::InsightCard;
use crate::session::IntentProfile;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub success: bool,
    pub session_id: Uuid,
    pub response: String,
    pub message_count: usize,
    pub used_food_context: bool,
}

#[derive(Debug, Deserialize)]
pub struct TextAnalysisRequest {
    pub text: String,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ImageAnalysisRequest {
    /// Base64-encoded image bytes.
    pub image_base64: String,
    pub mime_type: Option<String>,
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub include_raw_text: bool,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponseBody {
    pub success: bool,
    pub session_id: Uuid,
    pub analysis: InsightCard,
    pub ingredients: Vec<String>,
    pub ingredient_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IntentInferRequest {
    pub session_id: Option<Uuid>,
    pub message: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct IntentInferResponse {
    pub success: bool,
    pub session_id: Uuid,
    pub intent: IntentProfile,
}

#[derive(Debug, Deserialize)]
pub struct KbSearchQuery {
    pub q: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

fn default_search_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct SessionCreatedResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct WsClientMessage {
    pub r#type: String, // Expected: "message"
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct WsServerMessage {
    pub r#type: String, // Expected: "chunk", "done", "error"
    pub content: String,
}
