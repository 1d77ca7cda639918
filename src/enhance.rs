//! Client-side enhancement service and its progress model.
//!
//! Two ways to get an enhancement:
//!
//! - [`EnhancementService::enhance_text`] posts the form action, which runs
//!   the function synchronously and answers with a double-encoded envelope.
//! - [`EnhancementService::enhance_text_with_realtime`] follows an execution
//!   that was already started asynchronously, by subscribing to its
//!   realtime channel until a terminal status arrives or the timeout fires.
//!
//! Every call reports exactly one terminal progress (`completed` or
//! `failed`) through the callback and returns the matching `Result`.

use crate::action::{decode_envelope, ActionPayload, ActionTransport, EnvelopeError};
use crate::function::{EnhancementResult, ResponseBody};
use crate::platform::ExecutionStatus;
use crate::realtime::{execution_channel, RealtimeSource};
use serde::Serialize;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long the realtime path waits for a terminal status.
pub const DEFAULT_REALTIME_TIMEOUT: Duration = Duration::from_secs(30);

/// Reply prefix some provider routes leak from their reasoning channel.
const REASONING_ARTIFACT_PREFIX: &str = "analysisWe";

const PROCESSING_MESSAGE: &str = "AI is working on your content...";
const COMPLETED_MESSAGE: &str = "Enhancement completed successfully!";

#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("HTTP error! status: {status}")]
    Http { status: u16 },
    #[error("{0}")]
    Transport(String),
    #[error("Enhancement failed - unexpected response format")]
    Envelope(#[source] EnvelopeError),
    #[error("Enhancement failed - unexpected response format")]
    UnexpectedFormat,
    /// The function or the action reported this error.
    #[error("{0}")]
    Rejected(String),
    #[error("AI enhancement failed. Please try again.")]
    RemoteFailed,
    #[error("Failed to parse enhancement result")]
    ResultParse,
    #[error("Enhancement timed out. Please try again.")]
    TimedOut,
    #[error("Realtime connection closed before the enhancement finished")]
    Disconnected,
    #[error("Failed to start AI enhancement")]
    SubscribeFailed,
}

/// Progress of one enhancement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EnhancementProgress {
    Processing {
        message: String,
    },
    Completed {
        message: String,
        result: EnhancementResult,
    },
    Failed {
        message: String,
        error: String,
    },
}

impl EnhancementProgress {
    pub fn processing() -> Self {
        EnhancementProgress::Processing {
            message: PROCESSING_MESSAGE.to_string(),
        }
    }

    pub fn completed(result: EnhancementResult) -> Self {
        EnhancementProgress::Completed {
            message: COMPLETED_MESSAGE.to_string(),
            result,
        }
    }

    pub fn failed(error: &EnhanceError) -> Self {
        let message = error.to_string();
        EnhancementProgress::Failed {
            error: message.clone(),
            message,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            EnhancementProgress::Processing { message }
            | EnhancementProgress::Completed { message, .. }
            | EnhancementProgress::Failed { message, .. } => message,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            EnhancementProgress::Processing { .. } => "processing",
            EnhancementProgress::Completed { .. } => "completed",
            EnhancementProgress::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EnhancementProgress::Processing { .. })
    }
}

/// Enhancement client wired to its transports.
pub struct EnhancementService {
    action: Box<dyn ActionTransport>,
    realtime: Box<dyn RealtimeSource>,
    timeout: Duration,
}

impl EnhancementService {
    pub fn new(action: Box<dyn ActionTransport>, realtime: Box<dyn RealtimeSource>) -> Self {
        Self {
            action,
            realtime,
            timeout: DEFAULT_REALTIME_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enhance `text` through the form action.
    pub fn enhance_text(
        &self,
        text: &str,
        on_progress: &mut dyn FnMut(&EnhancementProgress),
    ) -> Result<EnhancementResult, EnhanceError> {
        settle(self.request_enhancement(text.trim()), on_progress)
    }

    fn request_enhancement(&self, text: &str) -> Result<EnhancementResult, EnhanceError> {
        let response = self
            .action
            .post_form(&[("text", text)])
            .map_err(|err| EnhanceError::Transport(format!("{err:#}")))?;
        if !(200..300).contains(&response.status) {
            return Err(EnhanceError::Http {
                status: response.status,
            });
        }

        match decode_envelope(&response.body) {
            Ok(ActionPayload::Body(body)) => {
                let body: ResponseBody =
                    serde_json::from_value(body).map_err(|_| EnhanceError::UnexpectedFormat)?;
                interpret_body(body)
            }
            Ok(ActionPayload::Failure { status, error }) => {
                tracing::debug!(status, error = %error, "enhancement action failed");
                Err(EnhanceError::Rejected(error))
            }
            Err(err) => {
                tracing::warn!(error = %err, "undecodable enhancement envelope");
                Err(EnhanceError::Envelope(err))
            }
        }
    }

    /// Follow an asynchronous execution until it settles or times out.
    pub fn enhance_text_with_realtime(
        &self,
        execution_id: &str,
        on_progress: &mut dyn FnMut(&EnhancementProgress),
    ) -> Result<EnhancementResult, EnhanceError> {
        let channel = execution_channel(execution_id);
        let mut subscription = match self.realtime.subscribe(&channel) {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::warn!(channel = %channel, error = %format!("{err:#}"), "subscribe failed");
                return settle(Err(EnhanceError::SubscribeFailed), on_progress);
            }
        };

        let deadline = Instant::now() + self.timeout;
        let outcome = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match subscription.recv_timeout(remaining) {
                Ok(event) => match event.status {
                    ExecutionStatus::Processing => on_progress(&EnhancementProgress::processing()),
                    ExecutionStatus::Completed => {
                        break parse_completed_body(event.response_body.as_deref())
                    }
                    ExecutionStatus::Failed => break Err(EnhanceError::RemoteFailed),
                    other => tracing::debug!(status = ?other, "ignoring execution status"),
                },
                Err(RecvTimeoutError::Timeout) => break Err(EnhanceError::TimedOut),
                Err(RecvTimeoutError::Disconnected) => break Err(EnhanceError::Disconnected),
            }
        };
        subscription.unsubscribe();

        settle(outcome, on_progress)
    }
}

/// Report the terminal progress for `outcome` and hand it back.
fn settle(
    outcome: Result<EnhancementResult, EnhanceError>,
    on_progress: &mut dyn FnMut(&EnhancementProgress),
) -> Result<EnhancementResult, EnhanceError> {
    match &outcome {
        Ok(result) => on_progress(&EnhancementProgress::completed(result.clone())),
        Err(err) => on_progress(&EnhancementProgress::failed(err)),
    }
    outcome
}

fn interpret_body(body: ResponseBody) -> Result<EnhancementResult, EnhanceError> {
    if body
        .enhanced_text
        .as_deref()
        .is_some_and(|text| text.starts_with(REASONING_ARTIFACT_PREFIX))
    {
        return Err(EnhanceError::UnexpectedFormat);
    }
    match body {
        ResponseBody {
            enhanced_text: Some(enhanced_text),
            original_text: Some(original_text),
            ..
        } if !enhanced_text.is_empty() && !original_text.is_empty() => Ok(EnhancementResult {
            original_text,
            enhanced_text,
        }),
        ResponseBody {
            error: Some(error), ..
        } => Err(EnhanceError::Rejected(error)),
        _ => Err(EnhanceError::UnexpectedFormat),
    }
}

fn parse_completed_body(raw: Option<&str>) -> Result<EnhancementResult, EnhanceError> {
    let body: ResponseBody = raw
        .and_then(|raw| serde_json::from_str(raw).ok())
        .ok_or(EnhanceError::ResultParse)?;
    if let Some(error) = body.error {
        return Err(EnhanceError::Rejected(error));
    }
    match (body.enhanced_text, body.original_text) {
        (Some(enhanced_text), Some(original_text)) => Ok(EnhancementResult {
            original_text,
            enhanced_text,
        }),
        _ => Err(EnhanceError::ResultParse),
    }
}

#[cfg(test)]
#[path = "enhance_tests.rs"]
mod tests;
