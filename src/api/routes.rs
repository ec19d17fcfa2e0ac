use actix_web::{get, post, web, HttpResponse, Result as WebResult};
use base64::Engine;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::models::{
    AnalysisResponseBody, ChatRequest, ChatResponseBody, ImageAnalysisRequest, IntentInferRequest,
    IntentInferResponse, KbSearchQuery, SessionCreatedResponse, TextAnalysisRequest,
};
use crate::config::AppConfig;
use crate::conversation::Orchestrator;
use crate::session::SessionStore;
use crate::tools::{IngredientKb, OpenFoodFactsClient};

// --- Health ---

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "nutrilens",
    }))
}

#[get("/health/llm")]
pub async fn health_llm(config: web::Data<AppConfig>) -> HttpResponse {
    let configured = match config.llm.provider.as_str() {
        "gemini" => config
            .llm
            .gemini
            .as_ref()
            .map(|c| !c.api_key.is_empty())
            .unwrap_or(false),
        "openai" => config
            .llm
            .openai
            .as_ref()
            .map(|c| !c.api_key.is_empty())
            .unwrap_or(false),
        _ => false,
    };

    if configured {
        HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "llm_service": "available",
            "provider": config.llm.provider,
        }))
    } else {
        HttpResponse::Ok().json(serde_json::json!({
            "status": "unhealthy",
            "llm_service": "unavailable",
            "provider": config.llm.provider,
        }))
    }
}

// --- Chat ---

#[post("/chat")]
pub async fn chat(
    orchestrator: web::Data<Arc<Orchestrator>>,
    req: web::Json<ChatRequest>,
) -> WebResult<HttpResponse, ApiError> {
    let req = req.into_inner();
    let outcome = orchestrator.chat_turn(req.session_id, &req.message).await?;

    Ok(HttpResponse::Ok().json(ChatResponseBody {
        success: true,
        session_id: outcome.session_id,
        response: outcome.reply,
        message_count: outcome.message_count,
        used_food_context: outcome.used_food_context,
    }))
}

// --- Analysis ---

#[post("/analyze/text")]
pub async fn analyze_text(
    orchestrator: web::Data<Arc<Orchestrator>>,
    req: web::Json<TextAnalysisRequest>,
) -> WebResult<HttpResponse, ApiError> {
    let req = req.into_inner();
    let outcome = orchestrator
        .analyze_text_turn(req.session_id, &req.text)
        .await?;

    Ok(HttpResponse::Ok().json(AnalysisResponseBody {
        success: true,
        session_id: outcome.session_id,
        ingredient_count: outcome.ingredients.len(),
        analysis: outcome.card,
        ingredients: outcome.ingredients,
        extracted_text: outcome.extracted_text,
    }))
}

#[post("/analyze/image")]
pub async fn analyze_image(
    orchestrator: web::Data<Arc<Orchestrator>>,
    config: web::Data<AppConfig>,
    req: web::Json<ImageAnalysisRequest>,
) -> WebResult<HttpResponse, ApiError> {
    let req = req.into_inner();

    let image = base64::engine::general_purpose::STANDARD
        .decode(req.image_base64.as_bytes())
        .map_err(|_| ApiError::InvalidImage("image_base64 is not valid base64".to_string()))?;

    if image.len() > config.upload.max_image_bytes {
        return Err(ApiError::InvalidImage(format!(
            "image exceeds maximum size of {} bytes",
            config.upload.max_image_bytes
        )));
    }

    let mime_type = match sniff_image_mime(&image) {
        Some(mime) => mime.to_string(),
        None => {
            return Err(ApiError::InvalidImage(
                "unsupported image format; JPEG, PNG and WebP are accepted".to_string(),
            ))
        }
    };
    if let Some(declared) = &req.mime_type {
        if declared != &mime_type {
            return Err(ApiError::InvalidImage(format!(
                "declared mime type {} does not match image content {}",
                declared, mime_type
            )));
        }
    }

    let outcome = orchestrator
        .analyze_image_turn(req.session_id, &image, &mime_type, req.include_raw_text)
        .await?;

    Ok(HttpResponse::Ok().json(AnalysisResponseBody {
        success: true,
        session_id: outcome.session_id,
        ingredient_count: outcome.ingredients.len(),
        analysis: outcome.card,
        ingredients: outcome.ingredients,
        extracted_text: outcome.extracted_text,
    }))
}

fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

// --- Intent ---

#[post("/intent/infer")]
pub async fn intent_infer(
    orchestrator: web::Data<Arc<Orchestrator>>,
    req: web::Json<IntentInferRequest>,
) -> WebResult<HttpResponse, ApiError> {
    let req = req.into_inner();
    let (session_id, intent) = orchestrator
        .infer_intent(req.session_id, &req.message, &req.ingredients)
        .await?;

    Ok(HttpResponse::Ok().json(IntentInferResponse {
        success: true,
        session_id,
        intent,
    }))
}

#[get("/intent/{session_id}")]
pub async fn get_intent(
    store: web::Data<Arc<SessionStore>>,
    session_id: web::Path<Uuid>,
) -> WebResult<HttpResponse, ApiError> {
    let id = session_id.into_inner();
    match store.get_intent(id).profile() {
        Some(profile) => Ok(HttpResponse::Ok().json(profile)),
        None => Err(ApiError::NotFound("No intent found for session".to_string())),
    }
}

// --- Knowledge base ---

#[get("/kb/search")]
pub async fn kb_search(
    kb: web::Data<Arc<IngredientKb>>,
    query: web::Query<KbSearchQuery>,
) -> HttpResponse {
    let limit = query.limit.clamp(1, 50);
    let results = kb.search(&query.q, limit);
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "query": query.q,
        "count": results.len(),
        "results": results,
    }))
}

#[get("/kb/lookup/{name}")]
pub async fn kb_lookup(kb: web::Data<Arc<IngredientKb>>, name: web::Path<String>) -> HttpResponse {
    let name = name.into_inner();
    match kb.lookup(&name) {
        Some(record) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "ingredient": name,
            "result": record,
        })),
        None => HttpResponse::Ok().json(serde_json::json!({
            "success": false,
            "ingredient": name,
            "result": null,
            "message": "Ingredient not found in KB",
        })),
    }
}

#[post("/kb/bulk-lookup")]
pub async fn kb_bulk_lookup(
    kb: web::Data<Arc<IngredientKb>>,
    ingredients: web::Json<Vec<String>>,
) -> HttpResponse {
    let ingredients = ingredients.into_inner();
    let results = kb.bulk_lookup(&ingredients);
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "input_count": ingredients.len(),
        "found_count": results.len(),
        "results": results,
    }))
}

#[get("/kb/stats")]
pub async fn kb_stats(kb: web::Data<Arc<IngredientKb>>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "stats": kb.stats(),
    }))
}

// --- Product lookup ---

#[get("/product/{barcode}")]
pub async fn product(
    off: web::Data<Arc<OpenFoodFactsClient>>,
    barcode: web::Path<String>,
) -> WebResult<HttpResponse, ApiError> {
    let barcode = barcode.into_inner();
    let record = off
        .fetch_by_barcode(&barcode)
        .await
        .map_err(|e| ApiError::RateLimited(e.to_string()))?;

    let ingredients = record.extract_ingredients();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "found": record.found,
        "barcode": record.barcode,
        "product_name": record.product_name,
        "brands": record.brands,
        "ingredients": ingredients,
        "allergens": record.allergens,
        "traces": record.traces,
        "nutriments": record.nutriments,
    })))
}

#[get("/product/{barcode}/ingredients")]
pub async fn product_ingredients(
    off: web::Data<Arc<OpenFoodFactsClient>>,
    barcode: web::Path<String>,
) -> WebResult<HttpResponse, ApiError> {
    let barcode = barcode.into_inner();
    let record = off
        .fetch_by_barcode(&barcode)
        .await
        .map_err(|e| ApiError::RateLimited(e.to_string()))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "found": record.found,
        "barcode": record.barcode,
        "product_name": record.product_name,
        "ingredients": record.extract_ingredients(),
    })))
}

// --- Sessions ---

#[post("/sessions")]
pub async fn create_session(store: web::Data<Arc<SessionStore>>) -> HttpResponse {
    let session_id = store.create();
    HttpResponse::Created().json(SessionCreatedResponse { session_id })
}

#[get("/sessions/{id}")]
pub async fn get_session(
    store: web::Data<Arc<SessionStore>>,
    id: web::Path<Uuid>,
) -> WebResult<HttpResponse, ApiError> {
    match store.get(id.into_inner()) {
        Some(session) => Ok(HttpResponse::Ok().json(session)),
        None => Err(ApiError::NotFound("Session not found".to_string())),
    }
}

#[get("/sessions/{id}/messages")]
pub async fn get_session_messages(
    store: web::Data<Arc<SessionStore>>,
    id: web::Path<Uuid>,
) -> WebResult<HttpResponse, ApiError> {
    let id = id.into_inner();
    if !store.exists(id) {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }
    Ok(HttpResponse::Ok().json(store.history(id)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(health_llm).service(
        web::scope("/api")
            .service(chat)
            .service(analyze_text)
            .service(analyze_image)
            .service(intent_infer)
            .service(get_intent)
            .service(kb_search)
            .service(kb_lookup)
            .service(kb_bulk_lookup)
            .service(kb_stats)
            .service(product)
            .service(product_ingredients)
            .service(create_session)
            .service(get_session)
            .service(get_session_messages),
    );
}
