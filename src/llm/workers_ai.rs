//! Workers AI completion client.
//!
//! Performs exactly one completion attempt per call; all retry discipline
//! lives in the worker loop. The response is decoded in two stages: a typed
//! outer envelope carrying the raw model text, then the text itself parsed as
//! JSON to extract the `answer` field.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::LlmError;

/// Default request timeout for completion calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A message in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One successfully parsed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The non-empty `answer` extracted from the model's JSON payload.
    pub answer: String,
}

/// Trait for completion providers the worker pool can call.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run one completion attempt for `prompt` against `model`.
    async fn complete(&self, model: &str, prompt: &str) -> Result<Completion, LlmError>;
}

/// Client for Workers-AI-compatible completion endpoints.
pub struct WorkersAiClient {
    /// Base URL the model name is appended to.
    api_base: String,
    /// Bearer token for authentication.
    api_token: String,
    /// HTTP client for making API requests.
    http_client: Client,
}

/// Internal request body: the prompt is sent as both the system and the user
/// message, mirroring the upstream dataset-generation convention.
#[derive(Debug, Serialize)]
struct ApiRequest {
    messages: Vec<Message>,
}

/// Outer envelope returned by the API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    result: ApiResult,
}

/// Result object inside the envelope.
#[derive(Debug, Deserialize)]
struct ApiResult {
    /// Raw model output; expected to be a JSON object with an `answer` field.
    response: String,
}

impl WorkersAiClient {
    /// Create a new client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Endpoint prefix the model ID is appended to
    /// * `api_token` - Bearer token for the `Authorization` header
    pub fn new(api_base: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_token: api_token.into(),
            http_client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

}

#[async_trait]
impl CompletionProvider for WorkersAiClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<Completion, LlmError> {
        let api_request = ApiRequest {
            messages: vec![Message::system(prompt), Message::user(prompt)],
        };

        let url = format!("{}{}", self.api_base, model);

        let http_response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let message = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(LlmError::ApiError {
                code: status.as_u16(),
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::EnvelopeError(e.to_string()))?;

        parse_answer(&api_response.result.response)
    }
}

/// Parses the model's raw text as a JSON object and extracts its `answer`
/// field, with distinct errors for invalid JSON, a missing field, a
/// wrong-typed field, and an empty answer.
pub(crate) fn parse_answer(raw: &str) -> Result<Completion, LlmError> {
    let payload: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| LlmError::NestedPayloadError(e.to_string()))?;

    match payload.get("answer") {
        None => Err(LlmError::AnswerMissing),
        Some(serde_json::Value::String(answer)) if answer.is_empty() => Err(LlmError::EmptyAnswer),
        Some(serde_json::Value::String(answer)) => Ok(Completion {
            answer: answer.clone(),
        }),
        Some(other) => Err(LlmError::AnswerWrongType(json_type_name(other))),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
