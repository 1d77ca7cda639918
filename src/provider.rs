//! Hosted chat-completion client used by the enhancement function.
//!
//! The function talks to an OpenAI-compatible `chat/completions` endpoint
//! (the Hugging Face inference router by default). The request is a single
//! synchronous call: one system instruction, one user message, no retries
//! and no streaming.
//!
//! # Configuration
//!
//! The credential comes from `HF_TOKEN`. A missing credential is reported
//! as [`ProviderError::MissingCredential`] before any network traffic so the
//! caller can surface it as a server-side failure.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default OpenAI-compatible router base URL.
pub const DEFAULT_PROVIDER_URL: &str = "https://router.huggingface.co/v1";
/// Default model identifier.
pub const DEFAULT_MODEL: &str = "openai/gpt-oss-120b";
/// Default inference provider behind the router.
pub const DEFAULT_INFERENCE_PROVIDER: &str = "groq";

pub const ENHANCE_TEMPERATURE: f32 = 0.7;
pub const ENHANCE_MAX_TOKENS: u32 = 400;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

// Prompt template loaded at compile time
const ENHANCE_SYSTEM: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/enhance_system.md"
));

/// Failures talking to the inference provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HF_TOKEN environment variable is not set")]
    MissingCredential,
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("provider response malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Body of a `chat/completions` request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Anything that can answer a chat-completion request with plain text.
pub trait ChatCompletion {
    fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError>;
}

/// Build the enhancement request for `text`.
///
/// `model` is the router model reference, e.g. `openai/gpt-oss-120b:groq`.
pub fn enhancement_request(model: &str, text: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system",
                content: ENHANCE_SYSTEM.trim().to_string(),
            },
            ChatMessage {
                role: "user",
                content: text.to_string(),
            },
        ],
        max_tokens: ENHANCE_MAX_TOKENS,
        temperature: ENHANCE_TEMPERATURE,
    }
}

/// Router model reference: `<model>:<provider>`, or the bare model when no
/// provider is pinned.
pub fn router_model(model: &str, provider: Option<&str>) -> String {
    match provider.map(str::trim).filter(|p| !p.is_empty()) {
        Some(provider) => format!("{model}:{provider}"),
        None => model.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking client for an OpenAI-compatible chat-completion endpoint.
pub struct RouterClient {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl RouterClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(PROVIDER_TIMEOUT))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl ChatCompletion for RouterClient {
    fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let token = self
            .token
            .as_deref()
            .ok_or(ProviderError::MissingCredential)?;

        let start = Instant::now();
        let mut response = self
            .agent
            .post(&self.completions_url())
            .header("Authorization", &format!("Bearer {token}"))
            .send_json(request)
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        let elapsed_ms = start.elapsed().as_millis();

        tracing::info!(
            elapsed_ms,
            status,
            model = %request.model,
            response_bytes = body.len(),
            "provider completion finished"
        );

        if !(200..300).contains(&status) {
            return Err(ProviderError::Status {
                status,
                message: provider_error_message(&body),
            });
        }
        parse_completion(&body)
    }
}

/// Extract the first choice's message content from a completion body.
fn parse_completion(body: &str) -> Result<String, ProviderError> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::Malformed(format!("parse completion JSON: {err}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::Malformed("completion has no message content".to_string()))
}

/// Pull a human-readable message out of a provider error body.
fn provider_error_message(body: &str) -> String {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return body.trim().to_string(),
    };
    let error = &value["error"];
    error["message"]
        .as_str()
        .or_else(|| error.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}
