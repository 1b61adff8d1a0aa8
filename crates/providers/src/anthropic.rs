//! Anthropic (Claude) provider binding.
//!
//! Uses the Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - Persona as the top-level `system` field
//! - Single-turn: the user text is the only message; no history is sent

use async_trait::async_trait;
use kitbot_core::{GeneratorError, GeneratorReply, ResponseGenerator};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::SYSTEM_PERSONA;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const MAX_TOKENS: u32 = 1000;

/// Per-call timeout, independent of the chain's own deadline.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Claude Messages API provider.
pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Claude provider. The caller (chain builder) guarantees
    /// the key is present; absence of credentials means this is never
    /// constructed at all.
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
        let url = format!("{}/v1/messages", self.base_url);

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": SYSTEM_PERSONA,
            "messages": [
                { "role": "user", "content": text }
            ],
        });

        debug!(model = %self.model, "Sending Claude completion request");

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send();

        let response = tokio::time::timeout(CALL_TIMEOUT, request)
            .await
            .map_err(|_| {
                GeneratorError::Timeout(format!(
                    "Claude call exceeded {}s",
                    CALL_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| GeneratorError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(GeneratorError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(GeneratorError::AuthFailed("Invalid Anthropic API key".into()));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(GeneratorError::Api {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: MessagesResponse = tokio::time::timeout(CALL_TIMEOUT, response.json())
            .await
            .map_err(|_| {
                GeneratorError::Timeout(format!(
                    "Claude call exceeded {}s",
                    CALL_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| GeneratorError::Api {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;

        Ok(api_resp.first_text())
    }
}

#[async_trait]
impl ResponseGenerator for AnthropicProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn respond(&self, text: &str) -> Result<GeneratorReply, GeneratorError> {
        // An empty completion still counts as produced; the chain's
        // usability check turns it into deferral.
        Ok(GeneratorReply::reply(self.generate(text).await?))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    /// The first text content block, or empty if the response has none.
    fn first_text(&self) -> String {
        self.content
            .iter()
            .find_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text.clone()),
                ResponseContentBlock::Other => None,
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test", DEFAULT_MODEL);
        assert_eq!(provider.name(), "claude");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.model(), DEFAULT_MODEL);
    }

    #[test]
    fn constructor_with_base_url() {
        let provider = AnthropicProvider::new("sk-ant-test", DEFAULT_MODEL)
            .with_base_url("https://custom.proxy.com/");
        assert_eq!(provider.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn parse_text_response() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "id": "msg_01",
                "model": "claude-3-5-haiku-latest",
                "content": [{"type": "text", "text": "Hello!"}],
                "usage": {"input_tokens": 10, "output_tokens": 5},
                "stop_reason": "end_turn"
            }"#,
        )
        .unwrap();
        assert_eq!(resp.first_text(), "Hello!");
    }

    #[test]
    fn parse_takes_first_text_block() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "content": [
                    {"type": "text", "text": "first"},
                    {"type": "text", "text": "second"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(resp.first_text(), "first");
    }

    #[test]
    fn non_text_blocks_yield_empty() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "calc", "input": {}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(resp.first_text(), "");
    }

    #[test]
    fn empty_content_yields_empty() {
        let resp: MessagesResponse = serde_json::from_str(r#"{"content": []}"#).unwrap();
        assert_eq!(resp.first_text(), "");
    }
}
