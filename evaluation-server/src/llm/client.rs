// Generation client for the two providers.
//
// Both backends are wrapped behind one `generate` call: CDAC speaks the
// OpenAI chat-completions shape, Gemini speaks generateContent. Responses
// are non-streaming; the callers are short extraction prompts.

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::config::{LlmConfig, LlmProvider};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM provider not configured")]
    NotConfigured,

    #[error("{provider} API is temporarily overloaded")]
    Overloaded { provider: &'static str },

    #[error("{provider} API error (status {status}): {detail}")]
    Api {
        provider: &'static str,
        status: u16,
        detail: String,
    },

    #[error("network error: {0}")]
    Transport(String),

    #[error("malformed {provider} response: {detail}")]
    MalformedResponse {
        provider: &'static str,
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

/// High-level generation client: either bound to a configured provider or
/// disabled when no usable credential exists.
pub enum LlmClient {
    Active {
        http: reqwest::Client,
        config: LlmConfig,
    },
    Disabled,
}

impl LlmClient {
    /// Bind a provider config to an existing HTTP client. Returns `Disabled`
    /// when the active provider has no key.
    pub fn from_config(config: &LlmConfig, http: reqwest::Client) -> Self {
        if !config.is_configured() {
            return LlmClient::Disabled;
        }
        LlmClient::Active {
            http,
            config: config.clone(),
        }
    }

    /// Send one prompt to the active provider and return the generated text.
    pub async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let (http, config) = match self {
            LlmClient::Active { http, config } => (http, config),
            LlmClient::Disabled => return Err(LlmError::NotConfigured),
        };

        let endpoint = config.provider.endpoint();
        debug!(provider = config.provider.name(), "sending generation request");

        match config.provider {
            LlmProvider::Cdac => {
                request_cdac(http, endpoint, config.current_key(), prompt, max_tokens).await
            }
            LlmProvider::Gemini => {
                request_gemini(http, endpoint, config.current_key(), prompt, max_tokens).await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Provider requests
// ---------------------------------------------------------------------------

// The endpoint is a parameter (rather than resolved inside) so tests can
// point these at a local mock server.

pub(crate) async fn request_cdac(
    http: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    prompt: &str,
    max_tokens: u32,
) -> Result<String, LlmError> {
    let body = json!({
        "messages": [{ "role": "user", "content": prompt }],
        "max_tokens": max_tokens,
        "stream": false,
    });

    let response = http
        .post(endpoint)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&body)
        .send()
        .await
        .map_err(|e| LlmError::Transport(e.to_string()))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| LlmError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(upstream_error("cdac", status.as_u16(), &text));
    }

    parse_chat_completion_text(&text).ok_or_else(|| LlmError::MalformedResponse {
        provider: "cdac",
        detail: "no choices[0].message.content in response".to_string(),
    })
}

pub(crate) async fn request_gemini(
    http: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    prompt: &str,
    max_tokens: u32,
) -> Result<String, LlmError> {
    let body = json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": { "maxOutputTokens": max_tokens },
    });

    let response = http
        .post(endpoint)
        .query(&[("key", api_key)])
        .json(&body)
        .send()
        .await
        .map_err(|e| LlmError::Transport(e.to_string()))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| LlmError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(upstream_error("gemini", status.as_u16(), &text));
    }

    parse_gemini_text(&text).ok_or_else(|| LlmError::MalformedResponse {
        provider: "gemini",
        detail: "no candidates[0].content.parts[0].text in response".to_string(),
    })
}

fn upstream_error(provider: &'static str, status: u16, body: &str) -> LlmError {
    // 503 from either backend (and Gemini's 429) means "try again shortly".
    if status == 503 || status == 429 {
        warn!(provider, status, "upstream overloaded");
        return LlmError::Overloaded { provider };
    }
    LlmError::Api {
        provider,
        status,
        detail: extract_error_detail(body),
    }
}

// ---------------------------------------------------------------------------
// Response parsing helpers
// ---------------------------------------------------------------------------

/// Extract the generated text from an OpenAI-style chat-completions body.
///
/// Expected shape: `{ "choices": [{ "message": { "content": "..." } }] }`
pub(crate) fn parse_chat_completion_text(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/// Extract the generated text from a Gemini generateContent body.
///
/// Expected shape: `{ "candidates": [{ "content": { "parts": [{ "text": "..." }] } }] }`
pub(crate) fn parse_gemini_text(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

/// Pull a human-readable detail out of an upstream error body. Both
/// backends nest a message under `error.message`; FastAPI-style backends
/// use `detail`. Falls back to a truncated raw body.
pub(crate) fn extract_error_detail(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = v.get("error").and_then(|e| e.get("message")).and_then(|m| m.as_str()) {
            return msg.to_string();
        }
        if let Some(detail) = v.get("detail").and_then(|d| d.as_str()) {
            return detail.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error detail provided".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
