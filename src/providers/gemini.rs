//! Google Gemini provider over the `generateContent` REST API.
//!
//! The key is taken from `ai.api_key`; environment fallbacks are resolved by
//! the config loader.

use crate::providers::traits::{AiError, Provider};
use crate::session::{ChatRole, ChatTurn};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_OUTPUT_TOKENS: u32 = 2048;

pub struct GeminiProvider {
    api_key: Option<String>,
    api_base: String,
    client: Client,
}

// ══════════════════════════════════════════════════════════════════════════════
// API REQUEST/RESPONSE TYPES
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl Content {
    fn text(role: &'static str, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }
}

impl GeminiProvider {
    pub fn new(api_key: Option<&str>, timeout: Duration) -> Self {
        let resolved_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from);

        Self {
            api_key: resolved_key,
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Point the provider at a different endpoint root (proxies, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn build_request(history: &[ChatTurn], message: &str, temperature: f64) -> GenerateContentRequest {
        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                };
                Content::text(role, turn.content.clone())
            })
            .collect();
        contents.push(Content::text("user", message));

        GenerateContentRequest {
            contents,
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        }
    }
}

/// `gemini-1.5-pro` → `models/gemini-1.5-pro`; already-prefixed names pass through.
fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn chat_with_history(
        &self,
        history: &[ChatTurn],
        message: &str,
        model: &str,
        temperature: f64,
    ) -> Result<String, AiError> {
        let api_key = self.api_key.as_deref().ok_or(AiError::MissingApiKey)?;

        let request = Self::build_request(history, message, temperature);
        let url = format!("{}/{}:generateContent", self.api_base, model_path(model));

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status { status, body });
        }

        let result: GenerateContentResponse = response.json().await?;

        if let Some(err) = result.error {
            return Err(AiError::Api(err.message));
        }

        // No candidate, or one blocked before producing content. A candidate
        // whose parts are empty is a valid (empty) answer.
        let content = result
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .ok_or(AiError::EmptyResponse)?;

        Ok(content.parts.into_iter().filter_map(|p| p.text).collect())
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_creates_with_key() {
        let provider = GeminiProvider::new(Some("test-api-key"), Duration::from_secs(5));
        assert_eq!(provider.api_key.as_deref(), Some("test-api-key"));
    }

    #[test]
    fn blank_key_is_treated_as_missing() {
        let provider = GeminiProvider::new(Some("   "), Duration::from_secs(5));
        assert!(provider.api_key.is_none());
        assert!(GeminiProvider::new(None, Duration::from_secs(5)).api_key.is_none());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let provider = GeminiProvider::new(None, Duration::from_secs(5))
            .with_api_base("http://127.0.0.1:9");
        let err = provider.chat("hi", "gemini-1.5-pro", 0.7).await.unwrap_err();
        assert!(matches!(err, AiError::MissingApiKey));
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let provider =
            GeminiProvider::new(Some("k"), Duration::from_secs(5)).with_api_base("http://localhost:9/");
        assert_eq!(provider.api_base, "http://localhost:9");
    }

    #[test]
    fn model_name_formatting() {
        assert_eq!(model_path("gemini-1.5-pro"), "models/gemini-1.5-pro");
        assert_eq!(model_path("models/gemini-1.5-pro"), "models/gemini-1.5-pro");
    }

    #[test]
    fn history_maps_assistant_turns_to_model_role() {
        let history = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")];
        let request = GeminiProvider::build_request(&history, "where to?", 0.7);
        let json = serde_json::to_value(&request).unwrap();
        let contents = json["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "where to?");
        assert_eq!(json["generationConfig"]["temperature"], 0.7);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn response_deserialization() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [{"text": "Hello "}, {"text": "there!"}]
                }
            }]
        }"#;

        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        let parts = response
            .candidates
            .unwrap()
            .into_iter()
            .next()
            .unwrap()
            .content
            .unwrap()
            .parts;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].text.as_deref(), Some("there!"));
    }

    #[test]
    fn blocked_candidate_without_content_parses() {
        let json = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert!(response.candidates.unwrap()[0].content.is_none());
    }

    #[test]
    fn error_response_deserialization() {
        let json = r#"{"error": {"message": "Invalid API key"}}"#;
        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.error.unwrap().message, "Invalid API key");
    }
}
