use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("could not extract valid JSON from model output: {snippet}")]
pub struct JsonGuardError {
    pub snippet: String,
}

static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json)?\s*").unwrap());
static TRAILING_COMMA_OBJ: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\}").unwrap());
static TRAILING_COMMA_ARR: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\]").unwrap());

/// Recover a JSON object from model text. Models wrap JSON in code fences,
/// prepend prose, or leave trailing commas; each repair is tried in turn
/// before giving up.
pub fn extract_json(text: &str) -> Result<serde_json::Value, JsonGuardError> {
    let cleaned = FENCE_OPEN.replace_all(text, "");
    let cleaned = cleaned.trim().trim_end_matches("```").trim();

    if let Ok(value) = serde_json::from_str(cleaned) {
        return Ok(value);
    }

    // Slice from the first '{' to the last '}' to drop surrounding prose.
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if end > start {
            let candidate = &cleaned[start..=end];
            if let Ok(value) = serde_json::from_str(candidate) {
                return Ok(value);
            }

            let repaired = TRAILING_COMMA_OBJ.replace_all(candidate, "}");
            let repaired = TRAILING_COMMA_ARR.replace_all(&repaired, "]");
            if let Ok(value) = serde_json::from_str(&repaired) {
                return Ok(value);
            }
        }
    }

    Err(JsonGuardError {
        snippet: text.chars().take(200).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_clean_json() {
        let value = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn strips_markdown_fences() {
        let text = "```json\n{\"quick_verdict\": \"fine\"}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["quick_verdict"], "fine");
    }

    #[test]
    fn recovers_json_embedded_in_prose() {
        let text = "Here is the analysis you asked for:\n{\"a\": [1, 2]}\nHope that helps!";
        let value = extract_json(text).unwrap();
        assert_eq!(value["a"], json!([1, 2]));
    }

    #[test]
    fn repairs_trailing_commas() {
        let text = r#"{"items": ["x", "y",], "done": true,}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["items"], json!(["x", "y"]));
        assert_eq!(value["done"], json!(true));
    }

    #[test]
    fn errors_on_hopeless_input() {
        assert!(extract_json("no json here at all").is_err());
    }
}
