use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc::Sender;

use crate::llm::{
    models::{GenerateOptions, GenerateResponse, Usage},
    LlmError, ReasoningProvider,
};

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, default_model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            default_model,
        }
    }

    fn messages(content: serde_json::Value, options: &GenerateOptions) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();
        if let Some(system) = &options.system_instruction {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": content }));
        messages
    }

    async fn post_chat(&self, body: serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
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
            return Err(LlmError::Api(format!("OpenAI Error {}: {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))
    }

    fn response_from(json: &serde_json::Value, model: String) -> Result<GenerateResponse, LlmError> {
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(LlmError::InvalidRequest)?
            .to_string();

        let usage = json.get("usage").map(|u| Usage {
            input_tokens: u["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: u["completion_tokens"].as_u64().unwrap_or(0) as u32,
        });

        Ok(GenerateResponse {
            content,
            model,
            usage,
        })
    }
}

#[async_trait]
impl ReasoningProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<GenerateResponse, LlmError> {
        let model = options.model.clone().unwrap_or(self.default_model.clone());
        let body = json!({
            "model": model,
            "messages": Self::messages(json!(prompt), &options),
            "temperature": options.temperature.unwrap_or(0.3),
            "max_tokens": options.max_tokens.unwrap_or(2048),
        });

        let json = self.post_chat(body).await?;
        Self::response_from(&json, model)
    }

    async fn generate_streaming(
        &self,
        prompt: &str,
        options: GenerateOptions,
        tx: Sender<String>,
    ) -> Result<(), LlmError> {
        let model = options.model.clone().unwrap_or(self.default_model.clone());
        let body = json!({
            "model": model,
            "messages": Self::messages(json!(prompt), &options),
            "stream": true,
            "temperature": options.temperature.unwrap_or(0.3),
            "max_tokens": options.max_tokens.unwrap_or(2048),
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
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
                "OpenAI Stream Error {}: {}",
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
                    if line.is_empty() || line == "data: [DONE]" {
                        continue;
                    }
                    if let Some(data) = line.strip_prefix("data: ") {
                        if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
                            if let Some(content) = json["choices"][0]["delta"]["content"].as_str() {
                                let _ = tx.send(content.to_string()).await;
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
        let data_url = format!("data:{};base64,{}", mime_type, encoded);

        let content = json!([
            { "type": "text", "text": prompt },
            { "type": "image_url", "image_url": { "url": data_url } },
        ]);
        let body = json!({
            "model": model,
            "messages": Self::messages(content, &options),
            "temperature": options.temperature.unwrap_or(0.3),
            "max_tokens": options.max_tokens.unwrap_or(2048),
        });

        let json = self.post_chat(body).await?;
        Self::response_from(&json, model)
    }
}
