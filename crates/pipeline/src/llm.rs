//! Chat-completion client for extracting book metadata.
//!
//! Talks to an OpenRouter-compatible `/chat/completions` endpoint using
//! [`reqwest`]. Configuration comes from environment variables; a missing
//! `OPENROUTER_API_KEY` does not prevent construction, every call then fails
//! with [`LlmError::MissingApiKey`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default model used for metadata extraction.
pub const DEFAULT_MODEL: &str = "mistralai/ministral-3b";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default cap on completion tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 1_500;

/// Default `HTTP-Referer` sent to OpenRouter.
pub const DEFAULT_REFERER: &str = "http://localhost:3001";

/// Default request timeout.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors from the language model layer.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("OPENROUTER_API_KEY not configured")]
    MissingApiKey,

    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("AI request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status code.
    #[error("AI API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The API answered without any message content.
    #[error("AI response contained no message content")]
    EmptyResponse,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Token accounting reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Capability to turn a prompt into a text completion.
#[async_trait]
pub trait MetadataModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError>;
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for [`OpenRouterClient`].
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub referer: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            referer: DEFAULT_REFERER.to_string(),
            timeout: DEFAULT_LLM_TIMEOUT,
        }
    }
}

impl LlmConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                | Default                        |
    /// |-------------------------|--------------------------------|
    /// | `OPENROUTER_API_KEY`    | unset                          |
    /// | `OPENROUTER_MODEL`      | `mistralai/ministral-3b`       |
    /// | `OPENROUTER_BASE_URL`   | `https://openrouter.ai/api/v1` |
    /// | `OPENROUTER_MAX_TOKENS` | `1500`                         |
    /// | `OPENROUTER_REFERER`    | `http://localhost:3001`        |
    /// | `LLM_TIMEOUT_SECS`      | `60`                           |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("OPENROUTER_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            model: std::env::var("OPENROUTER_MODEL").unwrap_or(defaults.model),
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            max_tokens: std::env::var("OPENROUTER_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tokens),
            referer: std::env::var("OPENROUTER_REFERER").unwrap_or(defaults.referer),
            timeout: std::env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(defaults.timeout, Duration::from_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenRouterClient
// ---------------------------------------------------------------------------

/// HTTP client for an OpenRouter-compatible chat completion API.
pub struct OpenRouterClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenRouterClient {
    pub fn new(config: LlmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Turn a non-2xx response into [`LlmError::Api`], preferring the
    /// API's own error message over the raw body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
            .unwrap_or(body);
        Err(LlmError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl MetadataModel for OpenRouterClient {
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        let api_key = self.config.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.referer)
            .json(&request)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let body: ChatResponse = response.json().await?;

        completion_from(body)
    }
}

fn completion_from(body: ChatResponse) -> Result<Completion, LlmError> {
    let text = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or(LlmError::EmptyResponse)?;
    if let Some(usage) = &body.usage {
        tracing::debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Model completion received"
        );
    }
    Ok(Completion {
        text,
        usage: body.usage,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn request_body_shape() {
        let request = ChatRequest {
            model: DEFAULT_MODEL,
            messages: [ChatMessage {
                role: "user",
                content: "hello",
            }],
            max_tokens: 1500,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "mistralai/ministral-3b");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
        assert_eq!(json["max_tokens"], 1500);
    }

    #[test]
    fn completion_takes_first_choice_and_usage() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"title\":\"x\"}" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        }))
        .unwrap();
        let completion = completion_from(body).unwrap();
        assert_eq!(completion.text, "{\"title\":\"x\"}");
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn completion_without_choices_is_empty_response() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({ "choices": [] })).unwrap();
        assert_matches!(completion_from(body), Err(LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = OpenRouterClient::new(LlmConfig::default()).unwrap();
        assert_matches!(client.complete("prompt").await, Err(LlmError::MissingApiKey));
    }
}
