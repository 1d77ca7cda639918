//! The `enhanceContent` form action and its response envelope.
//!
//! The browser posts form-encoded `text` to the page's action endpoint. The
//! action runs the enhancement function synchronously on the platform and
//! answers with an envelope whose `data` field is itself a JSON string: a
//! flattened array whose first slot holds the function's raw response body
//! (JSON again) or, for failures, an object pointing at later slots. Clients
//! therefore decode three layers; [`decode_envelope`] does that with a
//! distinct error for every layer that can go wrong.

use crate::platform::FunctionExecutor;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Query path of the enhancement action on the capsule creation page.
pub const ENHANCE_ACTION_PATH: &str = "?/enhanceContent";

const ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of running the action server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Raw function response body, passed through untouched.
    Success(String),
    Failure { status: u16, error: String },
}

impl ActionOutcome {
    /// Serialize into the envelope the browser receives.
    pub fn to_envelope(&self) -> String {
        let envelope = match self {
            ActionOutcome::Success(body) => json!({
                "type": "success",
                "status": 200,
                "data": json!([body]).to_string(),
            }),
            ActionOutcome::Failure { status, error } => json!({
                "type": "failure",
                "status": status,
                "data": json!([{ "error": 1 }, error]).to_string(),
            }),
        };
        envelope.to_string()
    }
}

/// Run the `enhanceContent` action for a submitted form.
pub fn enhance_content_action(
    text: Option<&str>,
    executor: &dyn FunctionExecutor,
    function_id: &str,
) -> ActionOutcome {
    let Some(text) = text.filter(|text| !text.is_empty()) else {
        return ActionOutcome::Failure {
            status: 400,
            error: "Text is required".to_string(),
        };
    };

    let body = json!({ "text": text }).to_string();
    let execution = match executor.create_execution(function_id, &body, false) {
        Ok(execution) => execution,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "enhancement execution failed");
            return generic_failure();
        }
    };

    match serde_json::from_str::<Value>(&execution.response_body) {
        Ok(parsed) => match parsed.get("error").and_then(Value::as_str) {
            Some(error) => ActionOutcome::Failure {
                status: 500,
                error: error.to_string(),
            },
            None => ActionOutcome::Success(execution.response_body),
        },
        Err(err) => {
            tracing::error!(
                execution_id = %execution.id,
                error = %err,
                "enhancement response body is not JSON"
            );
            generic_failure()
        }
    }
}

fn generic_failure() -> ActionOutcome {
    ActionOutcome::Failure {
        status: 500,
        error: "Failed to enhance content".to_string(),
    }
}

/// Why an envelope could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("envelope is not JSON: {0}")]
    NotJson(String),
    #[error("envelope has no string `data` field")]
    MissingData,
    #[error("envelope data is not a JSON array")]
    DataNotArray,
    #[error("envelope data has no response body")]
    MissingBody,
    #[error("response body is not JSON: {0}")]
    BodyNotJson(String),
    #[error("unsupported envelope type {0:?}")]
    UnsupportedType(String),
}

/// What a decoded envelope carried.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    /// The function response body, parsed.
    Body(Value),
    /// The action failed with this status and message.
    Failure { status: u16, error: String },
}

/// Decode an action envelope down to the function body it wraps.
pub fn decode_envelope(raw: &str) -> Result<ActionPayload, EnvelopeError> {
    let envelope: Value =
        serde_json::from_str(raw).map_err(|err| EnvelopeError::NotJson(err.to_string()))?;

    if let Some(error) = envelope.get("error").and_then(Value::as_str) {
        return Ok(ActionPayload::Failure {
            status: status_of(&envelope, 500),
            error: error.to_string(),
        });
    }

    let kind = envelope
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("success");
    let data = envelope
        .get("data")
        .and_then(Value::as_str)
        .ok_or(EnvelopeError::MissingData)?;
    let slots: Vec<Value> =
        serde_json::from_str(data).map_err(|_| EnvelopeError::DataNotArray)?;

    match kind {
        "success" => {
            let body = slots
                .first()
                .and_then(Value::as_str)
                .ok_or(EnvelopeError::MissingBody)?;
            let parsed = serde_json::from_str(body)
                .map_err(|err| EnvelopeError::BodyNotJson(err.to_string()))?;
            Ok(ActionPayload::Body(parsed))
        }
        "failure" => Ok(ActionPayload::Failure {
            status: status_of(&envelope, 500),
            error: failure_message(&slots).ok_or(EnvelopeError::MissingBody)?,
        }),
        other => Err(EnvelopeError::UnsupportedType(other.to_string())),
    }
}

fn status_of(envelope: &Value, fallback: u16) -> u16 {
    envelope
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|status| u16::try_from(status).ok())
        .unwrap_or(fallback)
}

/// Resolve `slots[0].error`, which holds the index of the message slot.
fn failure_message(slots: &[Value]) -> Option<String> {
    let index = slots.first()?.get("error")?.as_u64()?;
    let index = usize::try_from(index).ok()?;
    slots.get(index)?.as_str().map(str::to_string)
}

/// Raw HTTP answer from the action endpoint.
#[derive(Debug, Clone)]
pub struct ActionHttpResponse {
    pub status: u16,
    pub body: String,
}

/// Posts form fields to the enhancement action.
pub trait ActionTransport {
    fn post_form(&self, fields: &[(&str, &str)]) -> Result<ActionHttpResponse>;
}

/// Posts to a deployed web app over HTTP.
pub struct HttpActionTransport {
    agent: ureq::Agent,
    url: String,
}

impl HttpActionTransport {
    /// `page_url` is the page hosting the action, e.g. `https://host/create`.
    pub fn new(page_url: &str) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(ACTION_TIMEOUT))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            url: format!("{}{}", page_url.trim_end_matches('/'), ENHANCE_ACTION_PATH),
        }
    }
}

impl ActionTransport for HttpActionTransport {
    fn post_form(&self, fields: &[(&str, &str)]) -> Result<ActionHttpResponse> {
        let mut response = self
            .agent
            .post(&self.url)
            .header("Accept", "application/json")
            .header("x-sveltekit-action", "true")
            .send_form(fields.iter().copied())
            .with_context(|| format!("post form to {}", self.url))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .context("read action response")?;
        Ok(ActionHttpResponse { status, body })
    }
}

/// Runs the action in-process against the platform, without a web server.
pub struct InProcessAction {
    executor: Arc<dyn FunctionExecutor>,
    function_id: String,
}

impl InProcessAction {
    pub fn new(executor: Arc<dyn FunctionExecutor>, function_id: &str) -> Self {
        Self {
            executor,
            function_id: function_id.to_string(),
        }
    }
}

impl ActionTransport for InProcessAction {
    fn post_form(&self, fields: &[(&str, &str)]) -> Result<ActionHttpResponse> {
        let text = fields
            .iter()
            .find(|(name, _)| *name == "text")
            .map(|(_, value)| *value);
        let outcome = enhance_content_action(text, self.executor.as_ref(), &self.function_id);
        Ok(ActionHttpResponse {
            status: 200,
            body: outcome.to_envelope(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Execution, ExecutionStatus};
    use anyhow::anyhow;
    use std::sync::Mutex;

    struct FakeExecutor {
        response: Result<String, String>,
        calls: Mutex<Vec<(String, String, bool)>>,
    }

    impl FakeExecutor {
        fn responding(body: &str) -> Self {
            Self {
                response: Ok(body.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn erroring(message: &str) -> Self {
            Self {
                response: Err(message.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl FunctionExecutor for FakeExecutor {
        fn create_execution(
            &self,
            function_id: &str,
            body: &str,
            asynchronous: bool,
        ) -> Result<Execution> {
            self.calls.lock().unwrap().push((
                function_id.to_string(),
                body.to_string(),
                asynchronous,
            ));
            match &self.response {
                Ok(body) => Ok(Execution {
                    id: "exec-1".to_string(),
                    status: ExecutionStatus::Completed,
                    response_body: body.clone(),
                    response_status_code: 200,
                }),
                Err(message) => Err(anyhow!("{message}")),
            }
        }

        fn get_execution(&self, _: &str, _: &str) -> Result<Execution> {
            Err(anyhow!("not used"))
        }
    }

    const OK_BODY: &str = r#"{"enhancedText":"A bright memory.","originalText":"memory"}"#;

    #[test]
    fn action_requires_text() {
        let executor = FakeExecutor::responding(OK_BODY);
        for text in [None, Some("")] {
            assert_eq!(
                enhance_content_action(text, &executor, "fn"),
                ActionOutcome::Failure {
                    status: 400,
                    error: "Text is required".to_string()
                }
            );
        }
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn action_runs_synchronous_execution_and_passes_body_through() {
        let executor = FakeExecutor::responding(OK_BODY);

        let outcome = enhance_content_action(Some("memory"), &executor, "enhance-fn");

        assert_eq!(outcome, ActionOutcome::Success(OK_BODY.to_string()));
        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "enhance-fn");
        assert_eq!(calls[0].1, r#"{"text":"memory"}"#);
        assert!(!calls[0].2, "action must wait for the function");
    }

    #[test]
    fn action_surfaces_function_error() {
        let executor = FakeExecutor::responding(r#"{"error":"Text parameter is required"}"#);
        assert_eq!(
            enhance_content_action(Some("x"), &executor, "fn"),
            ActionOutcome::Failure {
                status: 500,
                error: "Text parameter is required".to_string()
            }
        );
    }

    #[test]
    fn action_hides_platform_and_parse_errors() {
        let generic = ActionOutcome::Failure {
            status: 500,
            error: "Failed to enhance content".to_string(),
        };
        let down = FakeExecutor::erroring("connection refused");
        assert_eq!(enhance_content_action(Some("x"), &down, "fn"), generic);

        let garbled = FakeExecutor::responding("<html>502</html>");
        assert_eq!(enhance_content_action(Some("x"), &garbled, "fn"), generic);
    }

    #[test]
    fn success_envelope_double_encodes_body() {
        let raw = ActionOutcome::Success(OK_BODY.to_string()).to_envelope();
        let envelope: Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(envelope["type"], "success");
        assert_eq!(envelope["status"], 200);
        let data = envelope["data"].as_str().unwrap();
        let slots: Vec<Value> = serde_json::from_str(data).unwrap();
        assert_eq!(slots[0].as_str(), Some(OK_BODY));

        assert_eq!(
            decode_envelope(&raw).unwrap(),
            ActionPayload::Body(serde_json::from_str(OK_BODY).unwrap())
        );
    }

    #[test]
    fn failure_envelope_decodes_to_message() {
        let raw = ActionOutcome::Failure {
            status: 400,
            error: "Text is required".to_string(),
        }
        .to_envelope();
        assert_eq!(
            serde_json::from_str::<Value>(&raw).unwrap(),
            json!({
                "type": "failure",
                "status": 400,
                "data": r#"[{"error":1},"Text is required"]"#,
            })
        );
        assert_eq!(
            decode_envelope(&raw).unwrap(),
            ActionPayload::Failure {
                status: 400,
                error: "Text is required".to_string()
            }
        );
    }

    #[test]
    fn top_level_error_field_is_a_failure() {
        assert_eq!(
            decode_envelope(r#"{"error":"Unauthorized","status":401}"#).unwrap(),
            ActionPayload::Failure {
                status: 401,
                error: "Unauthorized".to_string()
            }
        );
    }

    #[test]
    fn malformed_envelopes_are_classified() {
        assert!(matches!(
            decode_envelope("<!doctype html>"),
            Err(EnvelopeError::NotJson(_))
        ));
        assert_eq!(
            decode_envelope(r#"{"type":"success","status":200}"#),
            Err(EnvelopeError::MissingData)
        );
        assert_eq!(
            decode_envelope(r#"{"type":"success","data":"{\"a\":1}"}"#),
            Err(EnvelopeError::DataNotArray)
        );
        assert_eq!(
            decode_envelope(r#"{"type":"success","data":"[]"}"#),
            Err(EnvelopeError::MissingBody)
        );
        assert!(matches!(
            decode_envelope(r#"{"type":"success","data":"[\"not json\"]"}"#),
            Err(EnvelopeError::BodyNotJson(_))
        ));
        assert_eq!(
            decode_envelope(r#"{"type":"redirect","status":303,"data":"[]"}"#),
            Err(EnvelopeError::UnsupportedType("redirect".to_string()))
        );
    }

    #[test]
    fn in_process_action_wraps_outcome_in_envelope() {
        let executor = Arc::new(FakeExecutor::responding(OK_BODY));
        let action = InProcessAction::new(executor, "fn");

        let response = action.post_form(&[("text", "memory")]).unwrap();

        assert_eq!(response.status, 200);
        assert!(matches!(
            decode_envelope(&response.body),
            Ok(ActionPayload::Body(_))
        ));
    }
}
