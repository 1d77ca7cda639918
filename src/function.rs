//! The enhancement function: `{text}` in, `{enhancedText, originalText}` out.
//!
//! This is the only server-side logic of the application. The execution
//! platform hands the handler the parsed JSON request body and relays the
//! returned status and body to the caller.

use crate::provider::{enhancement_request, ChatCompletion, ProviderError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Successful enhancement payload, shared by the function and its clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementResult {
    pub original_text: String,
    pub enhanced_text: String,
}

/// Lenient view of a function response body as clients receive it.
///
/// Either the success fields or `error` may be present; clients decide which
/// shape they got.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    #[serde(default)]
    pub enhanced_text: Option<String>,
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Status and JSON body produced by one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub status_code: u16,
    pub body: Value,
}

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("Text parameter is required")]
    MissingText,
    #[error("Function error: Enhancement failed: {0}")]
    Enhancement(#[from] ProviderError),
    /// The provider answered, but with an `Error:` reply instead of text.
    #[error("{0}")]
    ProviderReply(String),
}

impl FunctionError {
    pub fn status_code(&self) -> u16 {
        match self {
            FunctionError::MissingText => 400,
            FunctionError::Enhancement(_) | FunctionError::ProviderReply(_) => 500,
        }
    }
}

impl From<Result<EnhancementResult, FunctionError>> for FunctionResponse {
    fn from(result: Result<EnhancementResult, FunctionError>) -> Self {
        match result {
            Ok(result) => FunctionResponse {
                status_code: 200,
                body: json!({
                    "enhancedText": result.enhanced_text,
                    "originalText": result.original_text,
                }),
            },
            Err(err) => FunctionResponse {
                status_code: err.status_code(),
                body: json!({ "error": err.to_string() }),
            },
        }
    }
}

/// The enhancement function bound to a provider and model.
pub struct EnhanceFunction<'a> {
    provider: &'a dyn ChatCompletion,
    model: String,
}

impl<'a> EnhanceFunction<'a> {
    pub fn new(provider: &'a dyn ChatCompletion, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Handle one invocation. `body` is the parsed request JSON, if any.
    pub fn handle(&self, body: Option<&Value>) -> FunctionResponse {
        let result = self.run(body);
        match &result {
            Ok(_) => tracing::info!("enhancement succeeded"),
            Err(err) => tracing::warn!(status = err.status_code(), error = %err, "enhancement rejected"),
        }
        FunctionResponse::from(result)
    }

    fn run(&self, body: Option<&Value>) -> Result<EnhancementResult, FunctionError> {
        let text = request_text(body).ok_or(FunctionError::MissingText)?;
        tracing::debug!(text_chars = text.chars().count(), "received text for enhancement");

        let request = enhancement_request(&self.model, text);
        let enhanced = self.provider.complete(&request)?;
        if enhanced.starts_with("Error:") {
            return Err(FunctionError::ProviderReply(enhanced));
        }
        Ok(EnhancementResult {
            original_text: text.to_string(),
            enhanced_text: enhanced,
        })
    }
}

/// Non-empty string `text` field of the request body.
fn request_text(body: Option<&Value>) -> Option<&str> {
    body?
        .get("text")?
        .as_str()
        .filter(|text| !text.is_empty())
}

/// Parse a raw request body the way the platform does: empty or invalid JSON
/// counts as no body.
pub fn parse_request_body(raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }
    serde_json::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatRequest;
    use std::cell::{Cell, RefCell};

    struct FakeProvider {
        reply: Result<String, fn() -> ProviderError>,
        calls: Cell<usize>,
        last_request: RefCell<Option<ChatRequest>>,
    }

    impl FakeProvider {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: Cell::new(0),
                last_request: RefCell::new(None),
            }
        }

        fn failing(make: fn() -> ProviderError) -> Self {
            Self {
                reply: Err(make),
                calls: Cell::new(0),
                last_request: RefCell::new(None),
            }
        }
    }

    impl ChatCompletion for FakeProvider {
        fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
            self.calls.set(self.calls.get() + 1);
            *self.last_request.borrow_mut() = Some(request.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    #[test]
    fn missing_text_is_rejected_without_calling_provider() {
        let provider = FakeProvider::replying("unused");
        let function = EnhanceFunction::new(&provider, "m");

        let bodies = [
            None,
            Some(json!({})),
            Some(json!({ "text": "" })),
            Some(json!({ "text": 42 })),
            Some(json!({ "other": "value" })),
            Some(json!("just a string")),
        ];
        for body in &bodies {
            let response = function.handle(body.as_ref());
            assert_eq!(response.status_code, 400, "body {body:?}");
            assert_eq!(response.body["error"], "Text parameter is required");
        }
        assert_eq!(provider.calls.get(), 0);
    }

    #[test]
    fn success_echoes_original_text() {
        let provider = FakeProvider::replying("A golden afternoon by the lake.");
        let function = EnhanceFunction::new(&provider, "openai/gpt-oss-120b:groq");

        let response = function.handle(Some(&json!({ "text": "lake day" })));

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body["enhancedText"], "A golden afternoon by the lake.");
        assert_eq!(response.body["originalText"], "lake day");
        assert_eq!(provider.calls.get(), 1);

        let request = provider.last_request.borrow().clone().unwrap();
        assert_eq!(request.model, "openai/gpt-oss-120b:groq");
        assert_eq!(request.messages[1].content, "lake day");
    }

    #[test]
    fn provider_failure_maps_to_500_with_passthrough_message() {
        let provider = FakeProvider::failing(|| ProviderError::Status {
            status: 429,
            message: "rate limited".to_string(),
        });
        let function = EnhanceFunction::new(&provider, "m");

        let response = function.handle(Some(&json!({ "text": "hello" })));

        assert_eq!(response.status_code, 500);
        assert_eq!(
            response.body["error"],
            "Function error: Enhancement failed: provider returned status 429: rate limited"
        );
    }

    #[test]
    fn missing_credential_is_a_server_error() {
        let provider = FakeProvider::failing(|| ProviderError::MissingCredential);
        let function = EnhanceFunction::new(&provider, "m");

        let response = function.handle(Some(&json!({ "text": "hello" })));

        assert_eq!(response.status_code, 500);
        assert_eq!(
            response.body["error"],
            "Function error: Enhancement failed: HF_TOKEN environment variable is not set"
        );
    }

    #[test]
    fn error_prefixed_reply_is_returned_as_error() {
        let provider = FakeProvider::replying("Error: model overloaded");
        let function = EnhanceFunction::new(&provider, "m");

        let response = function.handle(Some(&json!({ "text": "hello" })));

        assert_eq!(response.status_code, 500);
        assert_eq!(response.body["error"], "Error: model overloaded");
        assert!(response.body.get("enhancedText").is_none());
    }

    #[test]
    fn parse_request_body_treats_blank_and_invalid_as_absent() {
        assert!(parse_request_body("").is_none());
        assert!(parse_request_body("  \n").is_none());
        assert!(parse_request_body("{not json").is_none());
        assert_eq!(
            parse_request_body(r#"{"text":"hi"}"#),
            Some(json!({ "text": "hi" }))
        );
    }
}
