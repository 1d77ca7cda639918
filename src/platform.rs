//! REST adapter for the hosted backend platform.
//!
//! Only the calls the application consumes are modelled: function
//! executions (create + fetch) and listing table rows. Authentication is by
//! project id plus an optional server API key.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const PLATFORM_TIMEOUT: Duration = Duration::from_secs(45);

/// Remote execution status as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Waiting,
    Scheduled,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// One function execution record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(rename = "$id")]
    pub id: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub response_body: String,
    #[serde(default)]
    pub response_status_code: u16,
}

/// A page of rows from a table listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RowList<T> {
    #[serde(default)]
    pub total: u64,
    pub rows: Vec<T>,
}

/// Creates and inspects executions of serverless functions.
pub trait FunctionExecutor: Send + Sync {
    /// Start an execution with `body` as the request body. When
    /// `asynchronous` is false the call blocks until the function returns.
    fn create_execution(&self, function_id: &str, body: &str, asynchronous: bool)
        -> Result<Execution>;

    fn get_execution(&self, function_id: &str, execution_id: &str) -> Result<Execution>;
}

/// Reads rows from a table with platform query strings.
pub trait RowStore {
    fn list_rows_json(
        &self,
        database_id: &str,
        table_id: &str,
        queries: &[String],
    ) -> Result<RowList<serde_json::Value>>;
}

/// Connection settings for the platform.
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub endpoint: String,
    pub project_id: String,
    pub api_key: Option<String>,
}

/// Blocking REST client for the platform.
pub struct PlatformClient {
    agent: ureq::Agent,
    settings: PlatformSettings,
}

impl PlatformClient {
    pub fn new(settings: PlatformSettings) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(PLATFORM_TIMEOUT))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            settings: PlatformSettings {
                endpoint: settings.endpoint.trim_end_matches('/').to_string(),
                ..settings
            },
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.endpoint, path)
    }

    fn authorize<B>(&self, request: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let request = request
            .header("X-Appwrite-Project", &self.settings.project_id)
            .header("Accept", "application/json");
        match self.settings.api_key.as_deref() {
            Some(key) => request.header("X-Appwrite-Key", key),
            None => request,
        }
    }
}

/// Start an asynchronous enhancement execution; returns its id.
pub fn start_enhancement(
    executor: &dyn FunctionExecutor,
    function_id: &str,
    text: &str,
) -> Result<String> {
    let body = json!({ "text": text }).to_string();
    let execution = executor.create_execution(function_id, &body, true)?;
    tracing::info!(execution_id = %execution.id, "started async enhancement");
    Ok(execution.id)
}

/// Request sent to create an execution.
fn execution_payload(body: &str, asynchronous: bool) -> serde_json::Value {
    json!({
        "body": body,
        "async": asynchronous,
        "path": "/",
        "method": "POST",
        "headers": { "content-type": "application/json" },
    })
}

impl FunctionExecutor for PlatformClient {
    fn create_execution(
        &self,
        function_id: &str,
        body: &str,
        asynchronous: bool,
    ) -> Result<Execution> {
        let url = self.url(&format!("/functions/{function_id}/executions"));
        let payload = execution_payload(body, asynchronous);
        let response = self
            .authorize(self.agent.post(&url))
            .send_json(&payload)
            .with_context(|| format!("create execution for function {function_id}"))?;
        read_json(response, "create execution")
    }

    fn get_execution(&self, function_id: &str, execution_id: &str) -> Result<Execution> {
        let url = self.url(&format!(
            "/functions/{function_id}/executions/{execution_id}"
        ));
        let response = self
            .authorize(self.agent.get(&url))
            .call()
            .with_context(|| format!("fetch execution {execution_id}"))?;
        read_json(response, "get execution")
    }
}

impl RowStore for PlatformClient {
    fn list_rows_json(
        &self,
        database_id: &str,
        table_id: &str,
        queries: &[String],
    ) -> Result<RowList<serde_json::Value>> {
        let url = self.url(&format!("/tablesdb/{database_id}/tables/{table_id}/rows"));
        let mut request = self.authorize(self.agent.get(&url));
        for query in queries {
            request = request.query("queries[]", query);
        }
        let response = request
            .call()
            .with_context(|| format!("list rows of {database_id}/{table_id}"))?;
        read_json(response, "list rows")
    }
}

/// Decode a JSON response, turning non-2xx statuses into errors carrying the
/// platform's message.
fn read_json<T: DeserializeOwned>(
    mut response: ureq::http::Response<ureq::Body>,
    what: &str,
) -> Result<T> {
    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .with_context(|| format!("read {what} response"))?;
    if !(200..300).contains(&status) {
        return Err(anyhow!("{what} failed with status {status}: {}", platform_message(&text)));
    }
    serde_json::from_str(&text).with_context(|| format!("parse {what} response JSON"))
}

fn platform_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
