//! Google Gemini provider binding.
//!
//! Uses the `generateContent` REST endpoint:
//! - API key passed as the `key` query parameter
//! - Persona as the top-level `systemInstruction`
//! - Single-turn: the user text is the only content entry; no history

use async_trait::async_trait;
use kitbot_core::{GeneratorError, GeneratorReply, ResponseGenerator};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::SYSTEM_PERSONA;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const MAX_OUTPUT_TOKENS: u32 = 1000;

/// Per-call timeout, independent of the chain's own deadline.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini generateContent provider.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider. The chain builder guarantees the key is
    /// present; absence of credentials means this is never constructed.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a single-turn completion for the user text.
    ///
    /// A response with no text content is `Ok("")`, which the chain treats
    /// as "no opinion".
    pub async fn generate(&self, text: &str) -> Result<String, GeneratorError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = serde_json::json!({
            "systemInstruction": {
                "parts": [ { "text": SYSTEM_PERSONA } ]
            },
            "contents": [
                { "role": "user", "parts": [ { "text": text } ] }
            ],
            "generationConfig": {
                "temperature": 0.7,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        });

        debug!(model = %self.model, "Sending Gemini completion request");

        let request = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&body)
            .send();

        let response = tokio::time::timeout(CALL_TIMEOUT, request)
            .await
            .map_err(|_| {
                GeneratorError::Timeout(format!(
                    "Gemini call exceeded {}s",
                    CALL_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| GeneratorError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(GeneratorError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(GeneratorError::AuthFailed("Invalid Gemini API key".into()));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini API error");
            return Err(GeneratorError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: GenerateContentResponse =
            tokio::time::timeout(CALL_TIMEOUT, response.json())
                .await
                .map_err(|_| {
                    GeneratorError::Timeout(format!(
                        "Gemini call exceeded {}s",
                        CALL_TIMEOUT.as_secs()
                    ))
                })?
                .map_err(|e| GeneratorError::Api {
                    status_code: 200,
                    message: format!("Failed to parse Gemini response: {e}"),
                })?;

        Ok(api_resp.first_text())
    }
}

#[async_trait]
impl ResponseGenerator for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn respond(&self, text: &str) -> Result<GeneratorReply, GeneratorError> {
        Ok(GeneratorReply::reply(self.generate(text).await?))
    }
}

// --- Gemini API types ---

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// The first text part of the first candidate, or empty.
    fn first_text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|content| content.parts.first())
            .and_then(|part| part.text.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor() {
        let provider = GeminiProvider::new("gm-test", DEFAULT_MODEL);
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.model(), DEFAULT_MODEL);
    }

    #[test]
    fn constructor_with_base_url() {
        let provider =
            GeminiProvider::new("gm-test", DEFAULT_MODEL).with_base_url("http://localhost:9090/");
        assert_eq!(provider.base_url, "http://localhost:9090");
    }

    #[test]
    fn parse_text_response() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [
                    {
                        "content": {
                            "parts": [{"text": "Hello from Gemini!"}],
                            "role": "model"
                        },
                        "finishReason": "STOP"
                    }
                ],
                "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 5}
            }"#,
        )
        .unwrap();
        assert_eq!(resp.first_text(), "Hello from Gemini!");
    }

    #[test]
    fn no_candidates_yields_empty() {
        let resp: GenerateContentResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert_eq!(resp.first_text(), "");
    }

    #[test]
    fn candidate_without_text_part_yields_empty() {
        let resp: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [
                    { "content": { "parts": [{"inlineData": {"mimeType": "image/png"}}] } }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(resp.first_text(), "");
    }

    #[test]
    fn missing_candidates_field_tolerated() {
        let resp: GenerateContentResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(resp.first_text(), "");
    }
}
