use crate::constants::AI_REQUEST_TIMEOUT_SECONDS;
use crate::error::AppError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure classes that drive the retry / fallback policy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// The model id is decommissioned, unknown, or blocked for this key
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Request rejected: {0}")]
    Fatal(String),
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        AppError::AiService(e.to_string())
    }
}

const MODEL_UNAVAILABLE_MARKERS: &[&str] = &[
    "decommissioned",
    "model_not_found",
    "does not exist",
    "not found",
    "blocked",
    "invalid model",
    "model_terms_required",
    "not available",
];

/// Map an HTTP failure from the provider to an error class.
pub fn classify_http_error(status: StatusCode, body: &str) -> LlmError {
    let detail = format!("HTTP {}: {}", status, truncate(body, 300));
    let lower = body.to_lowercase();

    match status.as_u16() {
        // JSON mode output that failed validation; another sample may pass
        400 if lower.contains("json_validate_failed") => LlmError::Transient(detail),
        400 | 403 | 404
            if lower.contains("model")
                && MODEL_UNAVAILABLE_MARKERS.iter().any(|m| lower.contains(m)) =>
        {
            LlmError::ModelUnavailable(detail)
        }
        429 => LlmError::RateLimited(detail),
        408 | 500..=599 => LlmError::Transient(detail),
        _ => LlmError::Fatal(detail),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider to constrain output to a JSON object
    pub json_mode: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError>;
}

// OpenAI-compatible wire format

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionResponse {
    fn into_completion(self, requested_model: &str) -> Result<ChatCompletion, LlmError> {
        let content = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::Fatal("Response has no choices".to_string()))?;

        Ok(ChatCompletion {
            content,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            usage: self.usage,
        })
    }
}

/// Client for Groq's OpenAI-compatible chat completions endpoint.
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl GroqClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        GroqClient {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(AI_REQUEST_TIMEOUT_SECONDS),
        }
    }
}

#[async_trait]
impl LlmClient for GroqClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionBody {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Transient("Request timed out".to_string())
                } else {
                    LlmError::Transient(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status, &error_text));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transient(format!("Failed to parse response: {}", e)))?;

        let completion = parsed.into_completion(&request.model)?;
        if let Some(ref usage) = completion.usage {
            tracing::debug!(
                model = %completion.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Model call completed"
            );
        }
        Ok(completion)
    }
}
