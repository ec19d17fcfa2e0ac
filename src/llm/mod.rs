pub mod gemini;
pub mod json_guard;
pub mod models;
pub mod openai;

use gemini::GeminiProvider;
use openai::OpenAiProvider;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::Sender;

use crate::config::AppConfig;
use models::{GenerateOptions, GenerateResponse};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network Error: {0}")]
    Network(String),
    #[error("API Error: {0}")]
    Api(String),
    #[error("Invalid Request")]
    InvalidRequest,
    #[error("Rate Limited")]
    RateLimited,
}

/// External reasoning collaborator: prompt in, text out. Callers that need
/// structure run the output through `json_guard`. Failures here are expected
/// operating conditions; every caller converts them to a domain fallback.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<GenerateResponse, LlmError>;

    async fn generate_streaming(
        &self,
        prompt: &str,
        options: GenerateOptions,
        tx: Sender<String>,
    ) -> Result<(), LlmError>;

    /// Vision call used for both product analysis and label transcription.
    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
        options: GenerateOptions,
    ) -> Result<GenerateResponse, LlmError>;
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_default(config: &AppConfig) -> Option<Arc<dyn ReasoningProvider>> {
        match config.llm.provider.as_str() {
            "gemini" => {
                let cfg = config.llm.gemini.as_ref()?;
                Some(Arc::new(GeminiProvider::new(
                    cfg.api_key.clone(),
                    cfg.api_base.clone(),
                    cfg.default_model.clone(),
                )))
            }
            "openai" => {
                let cfg = config.llm.openai.as_ref()?;
                Some(Arc::new(OpenAiProvider::new(
                    cfg.api_key.clone(),
                    cfg.api_base.clone(),
                    cfg.default_model.clone(),
                )))
            }
            _ => None,
        }
    }
}
