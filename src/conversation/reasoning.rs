//! Insight generation: grounded context assembly, provider calls, and
//! defensive parsing into `InsightCard`s.

use std::sync::Arc;

use tracing::{info, warn};

use crate::conversation::context::SoftContext;
use crate::conversation::prompts;
use crate::llm::json_guard::extract_json;
use crate::llm::models::{GenerateOptions, InsightCard};
use crate::llm::{LlmError, ReasoningProvider};
use crate::session::{ChatMessage, IntentProfile};
use crate::tools::openfoodfacts::ProductRecord;
use crate::tools::{IngredientKb, OpenFoodFactsClient};

/// Ingredient-list length beyond which grounding is worth the extra calls.
const GROUNDING_INGREDIENT_THRESHOLD: usize = 5;
/// How many KB matches feed the prompt.
const KB_CONTEXT_LIMIT: usize = 5;
/// How many prior turns feed the prompt.
const RECENT_TURNS: usize = 2;

pub struct AnalysisInput<'a> {
    pub user_input: &'a str,
    pub ingredients: Vec<String>,
    pub barcode: Option<String>,
    pub intent: Option<&'a IntentProfile>,
    pub soft_context: Option<&'a SoftContext>,
    pub recent_history: &'a [ChatMessage],
}

pub struct ReasoningEngine {
    provider: Arc<dyn ReasoningProvider>,
    kb: Arc<IngredientKb>,
    off: Arc<OpenFoodFactsClient>,
}

impl ReasoningEngine {
    pub fn new(
        provider: Arc<dyn ReasoningProvider>,
        kb: Arc<IngredientKb>,
        off: Arc<OpenFoodFactsClient>,
    ) -> Self {
        Self { provider, kb, off }
    }

    /// Grounding costs tool calls; spend them when the stakes or the
    /// ingredient list justify it.
    fn should_ground(&self, input: &AnalysisInput<'_>) -> bool {
        if input.barcode.is_some() {
            return true;
        }
        if input.ingredients.len() > GROUNDING_INGREDIENT_THRESHOLD {
            return true;
        }
        if let Some(intent) = input.intent {
            if !intent.allergy_risks.is_empty() {
                return true;
            }
            if matches!(
                intent.user_goal.as_deref(),
                Some("allergy_safety") | Some("diabetic_management")
            ) {
                return true;
            }
        }
        false
    }

    /// Produce a structured insight card for analyzed text/ingredients.
    /// Total: every failure path ends in `InsightCard::fallback()`.
    pub async fn analyze(&self, input: AnalysisInput<'_>) -> InsightCard {
        let product = if self.should_ground(&input) {
            info!("Using grounded reasoning for this analysis");
            self.fetch_product(input.barcode.as_deref()).await
        } else {
            None
        };

        let context_block = self.build_context_block(&input, product.as_ref());
        let prompt = format!(
            "Analyze this food product for the user and answer as decision support.\n\n{}\n\nUser input: \"{}\"",
            context_block, input.user_input
        );

        self.generate_card(&prompt).await
    }

    /// Vision path: the image itself is the context.
    pub async fn analyze_image(&self, image: &[u8], mime_type: &str) -> InsightCard {
        let options = GenerateOptions {
            system_instruction: Some(prompts::REASONING_SYSTEM_PROMPT.to_string()),
            temperature: Some(0.3),
            ..Default::default()
        };

        let response = self
            .provider
            .generate_with_image(prompts::VISUAL_ANALYSIS_PROMPT, image, mime_type, options)
            .await;

        match response {
            Ok(r) => self.parse_card(&r.content).unwrap_or_else(|| {
                warn!("Visual analysis response unparsable, using fallback card");
                InsightCard::fallback()
            }),
            Err(e) => {
                warn!("Visual analysis failed: {}", e);
                InsightCard::fallback()
            }
        }
    }

    /// OCR-style label transcription through the vision provider. An empty
    /// string means "no ingredients found", never an error.
    pub async fn transcribe_label(&self, image: &[u8], mime_type: &str) -> String {
        let options = GenerateOptions {
            temperature: Some(0.0),
            ..Default::default()
        };
        match self
            .provider
            .generate_with_image(prompts::LABEL_TRANSCRIPTION_PROMPT, image, mime_type, options)
            .await
        {
            Ok(r) => r.content.trim().to_string(),
            Err(e) => {
                warn!("Label transcription failed, treating as empty: {}", e);
                String::new()
            }
        }
    }

    /// Free-form conversational reply. Unlike the card paths this surfaces
    /// the provider error so the orchestrator can substitute its own
    /// user-facing fallback while still persisting turn state.
    pub async fn chat_reply(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String, LlmError> {
        let options = GenerateOptions {
            system_instruction: Some(
                system_prompt
                    .unwrap_or(prompts::REASONING_SYSTEM_PROMPT)
                    .to_string(),
            ),
            temperature: Some(0.4),
            ..Default::default()
        };
        self.provider
            .generate(prompt, options)
            .await
            .map(|r| r.content)
    }

    pub async fn chat_reply_streaming(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        tx: tokio::sync::mpsc::Sender<String>,
    ) -> Result<(), LlmError> {
        let options = GenerateOptions {
            system_instruction: Some(
                system_prompt
                    .unwrap_or(prompts::REASONING_SYSTEM_PROMPT)
                    .to_string(),
            ),
            temperature: Some(0.4),
            ..Default::default()
        };
        self.provider.generate_streaming(prompt, options, tx).await
    }

    async fn fetch_product(&self, barcode: Option<&str>) -> Option<ProductRecord> {
        let barcode = barcode?;
        match self.off.fetch_by_barcode(barcode).await {
            Ok(record) if record.found => Some(record),
            Ok(_) => None,
            Err(e) => {
                warn!("Product fetch skipped: {}", e);
                None
            }
        }
    }

    fn build_context_block(
        &self,
        input: &AnalysisInput<'_>,
        product: Option<&ProductRecord>,
    ) -> String {
        let mut parts: Vec<String> = Vec::new();

        if !input.ingredients.is_empty() {
            let shown: Vec<&str> = input
                .ingredients
                .iter()
                .take(10)
                .map(|s| s.as_str())
                .collect();
            parts.push(format!(
                "Ingredients ({}): {}",
                input.ingredients.len(),
                shown.join(", ")
            ));

            let matches = self.kb.bulk_lookup(&input.ingredients[..input.ingredients.len().min(KB_CONTEXT_LIMIT)]);
            if !matches.is_empty() {
                let kb_info: Vec<String> = matches
                    .iter()
                    .map(|m| {
                        format!("{}: {} ({} confidence)", m.name, m.why_it_matters, m.confidence)
                    })
                    .collect();
                parts.push(format!("KB Knowledge: {}", kb_info.join(" | ")));
            }
        }

        if let Some(product) = product {
            parts.push(format!(
                "Product: {} by {}",
                product.product_name, product.brands
            ));
            if !product.allergens.is_empty() {
                parts.push(format!("Allergens: {}", product.allergens));
            }
            if !product.traces.is_empty() {
                parts.push(format!("Traces: {}", product.traces));
            }
        }

        if let Some(intent) = input.intent {
            let mut summary: Vec<String> = Vec::new();
            if let Some(goal) = &intent.user_goal {
                summary.push(format!("Goal: {}", goal));
            }
            if let Some(diet) = &intent.dietary_style {
                summary.push(format!("Diet: {}", diet));
            }
            if !intent.allergy_risks.is_empty() {
                let risks: Vec<&str> = intent.allergy_risks.iter().take(3).map(|s| s.as_str()).collect();
                summary.push(format!("Allergies: {}", risks.join(", ")));
            }
            if let Some(audience) = &intent.audience {
                summary.push(format!("For: {}", audience));
            }
            if !summary.is_empty() {
                parts.push(format!("User context: {}", summary.join(" | ")));
            }
        }

        if let Some(soft) = input.soft_context {
            if let Some(goal) = &soft.likely_goal {
                parts.push(format!(
                    "Soft read (uncertain): goal {} / concerns {}",
                    goal,
                    soft.soft_concerns.join(", ")
                ));
            }
        }

        if !input.recent_history.is_empty() {
            let recent: Vec<String> = input
                .recent_history
                .iter()
                .rev()
                .take(RECENT_TURNS)
                .rev()
                .map(|m| {
                    let content: String = m.content.chars().take(50).collect();
                    format!("{}: {}", m.role, content)
                })
                .collect();
            parts.push(format!("Recent: {}", recent.join(" | ")));
        }

        parts.join("\n")
    }

    async fn generate_card(&self, prompt: &str) -> InsightCard {
        let options = GenerateOptions {
            system_instruction: Some(prompts::REASONING_SYSTEM_PROMPT.to_string()),
            temperature: Some(0.3),
            ..Default::default()
        };

        match self.provider.generate(prompt, options.clone()).await {
            Ok(response) => {
                if let Some(card) = self.parse_card(&response.content) {
                    return card;
                }
                warn!("Insight response unparsable, retrying with stricter prompt");
            }
            Err(e) => {
                warn!("Insight generation failed, retrying once: {}", e);
            }
        }

        let strict = format!("{}{}", prompt, prompts::STRICT_JSON_SUFFIX);
        let retry_options = GenerateOptions {
            temperature: Some(0.1),
            ..options
        };
        match self.provider.generate(&strict, retry_options).await {
            Ok(response) => self.parse_card(&response.content).unwrap_or_else(|| {
                warn!("Insight retry unparsable, using fallback card");
                InsightCard::fallback()
            }),
            Err(e) => {
                warn!("Insight retry failed, using fallback card: {}", e);
                InsightCard::fallback()
            }
        }
    }

    fn parse_card(&self, content: &str) -> Option<InsightCard> {
        let value = extract_json(content).ok()?;
        serde_json::from_value(value).ok()
    }
}

/// Compact one-paragraph rendering of a card for chat history storage.
pub fn card_to_narrative(card: &InsightCard) -> String {
    let mut narrative = format!("{} {}", card.quick_verdict, card.ai_advice);
    if !card.uncertainty.is_empty() {
        narrative.push(' ');
        narrative.push_str(&card.uncertainty);
    }
    narrative.trim().to_string()
}
