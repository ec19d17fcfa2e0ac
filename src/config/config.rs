use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub api_keys: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub default_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub gemini: Option<GeminiConfig>,
    pub openai: Option<OpenAiConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub max_history_messages: usize,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenFoodFactsConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub rate_limit_per_minute: u32,
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub max_image_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    pub chat: ChatConfig,
    pub openfoodfacts: OpenFoodFactsConfig,
    pub upload: UploadConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("NUTRILENS").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${GEMINI_API_KEY}
        if let Some(ref mut gemini) = app_config.llm.gemini {
            gemini.api_key = expand_env(&gemini.api_key);
        }
        if let Some(ref mut openai) = app_config.llm.openai {
            openai.api_key = expand_env(&openai.api_key);
        }

        Ok(app_config)
    }
}

fn expand_env(val: &str) -> String {
    if val.starts_with("${") && val.ends_with('}') {
        let var_name = &val[2..val.len() - 1];
        std::env::var(var_name).unwrap_or_else(|_| "".to_string())
    } else {
        val.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_passes_plain_values_through() {
        assert_eq!(expand_env("literal-key"), "literal-key");
    }

    #[test]
    fn expand_env_resolves_placeholders() {
        std::env::set_var("NUTRILENS_TEST_SECRET", "s3cret");
        assert_eq!(expand_env("${NUTRILENS_TEST_SECRET}"), "s3cret");
    }

    #[test]
    fn expand_env_missing_var_becomes_empty() {
        assert_eq!(expand_env("${NUTRILENS_TEST_UNSET_VAR}"), "");
    }
}
