use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc::Sender;

use crate::llm::{
    models::{GenerateOptions, GenerateResponse, Usage},
    LlmError, ReasoningProvider,
};

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: String, default_model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            default_model,
        }
    }

    fn request_body(parts: serde_json::Value, options: &GenerateOptions) -> serde_json::Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": options.temperature.unwrap_or(0.3),
                "maxOutputTokens": options.max_tokens.unwrap_or(2048),
            },
        });
        if let Some(system) = &options.system_instruction {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        body
    }

    fn extract_text(json: &serde_json::Value) -> Option<String> {
        json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
    }

    fn extract_usage(json: &serde_json::Value) -> Option<Usage> {
        json.get("usageMetadata").map(|u| Usage {
            input_tokens: u["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
        })
    }

    async fn post_generate(
        &self,
        model: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, LlmError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited);
            }
            return Err(LlmError::Api(format!("Gemini Error {}: {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))
    }
}

#[async_trait]
impl ReasoningProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<GenerateResponse, LlmError> {
        let model = options.model.clone().unwrap_or(self.default_model.clone());
        let body = Self::request_body(json!([{ "text": prompt }]), &options);

        let json = self.post_generate(&model, body).await?;
        let content = Self::extract_text(&json).ok_or(LlmError::InvalidRequest)?;

        Ok(GenerateResponse {
            content,
            model,
            usage: Self::extract_usage(&json),
        })
    }

    async fn generate_streaming(
        &self,
        prompt: &str,
        options: GenerateOptions,
        tx: Sender<String>,
    ) -> Result<(), LlmError> {
        let model = options.model.clone().unwrap_or(self.default_model.clone());
        let body = Self::request_body(json!([{ "text": prompt }]), &options);

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, model, self.api_key
        );

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::RateLimited);
            }
            return Err(LlmError::Api(format!(
                "Gemini Stream Error {}: {}",
                status, text
            )));
        }

        let mut stream = response.bytes_stream();
        use futures_util::StreamExt;

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            if let Ok(text) = String::from_utf8(bytes.to_vec()) {
                for line in text.lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
                            if let Some(content) = Self::extract_text(&json) {
                                let _ = tx.send(content).await;
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn generate_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
        options: GenerateOptions,
    ) -> Result<GenerateResponse, LlmError> {
        let model = options.model.clone().unwrap_or(self.default_model.clone());
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);

        let parts = json!([
            { "text": prompt },
            { "inlineData": { "mimeType": mime_type, "data": encoded } },
        ]);
        let body = Self::request_body(parts, &options);

        let json = self.post_generate(&model, body).await?;
        let content = Self::extract_text(&json).ok_or(LlmError::InvalidRequest)?;

        Ok(GenerateResponse {
            content,
            model,
            usage: Self::extract_usage(&json),
        })
    }
}
