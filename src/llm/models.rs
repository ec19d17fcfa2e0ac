use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeOffs {
    #[serde(default)]
    pub positives: Vec<String>,
    #[serde(default)]
    pub negatives: Vec<String>,
}

/// Structured decision-support card the reasoning engine asks the model for.
/// Field names are part of the wire contract with clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightCard {
    pub ai_insight_title: String,
    pub quick_verdict: String,
    #[serde(default)]
    pub why_this_matters: Vec<String>,
    #[serde(default)]
    pub trade_offs: TradeOffs,
    #[serde(default)]
    pub uncertainty: String,
    #[serde(default)]
    pub ai_advice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
}

const FALLBACK_TITLE: &str = "Analysis unavailable";

impl InsightCard {
    /// Total fallback when the model output cannot be recovered. Honest
    /// about being unavailable; never an error surface.
    pub fn fallback() -> Self {
        Self {
            ai_insight_title: FALLBACK_TITLE.to_string(),
            quick_verdict: "I couldn't complete a full analysis of this product right now."
                .to_string(),
            why_this_matters: vec![
                "The reasoning service did not return a usable answer for this request."
                    .to_string(),
            ],
            trade_offs: TradeOffs::default(),
            uncertainty: "This result is a placeholder, not an assessment of the product."
                .to_string(),
            ai_advice: "Please try again in a moment, or check the ingredient label manually."
                .to_string(),
            barcode: None,
        }
    }

    /// True for the placeholder card; callers avoid caching it as a
    /// product snapshot.
    pub fn is_fallback(&self) -> bool {
        self.ai_insight_title == FALLBACK_TITLE
    }
}
