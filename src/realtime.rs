//! Realtime execution-status channels.
//!
//! A [`RealtimeSource`] hands out a [`Subscription`] per channel. Events are
//! delivered through a std channel so a consumer can wait on them with a
//! deadline. Tearing a subscription down is idempotent: the unsubscribe hook
//! runs at most once, either explicitly or on drop.

use crate::platform::{Execution, ExecutionStatus, FunctionExecutor};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const EXECUTION_CHANNEL_PREFIX: &str = "executions.";

/// Channel name for status updates of one execution.
pub fn execution_channel(execution_id: &str) -> String {
    format!("{EXECUTION_CHANNEL_PREFIX}{execution_id}")
}

/// Payload pushed on an execution channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionEvent {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub response_body: Option<String>,
}

impl ExecutionEvent {
    pub fn new(status: ExecutionStatus) -> Self {
        Self {
            status,
            response_body: None,
        }
    }

    pub fn completed(response_body: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            response_body: Some(response_body.into()),
        }
    }
}

impl From<&Execution> for ExecutionEvent {
    fn from(execution: &Execution) -> Self {
        Self {
            status: execution.status,
            response_body: Some(execution.response_body.clone()),
        }
    }
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Live subscription to one channel.
pub struct Subscription {
    events: Receiver<ExecutionEvent>,
    unsubscribe: Option<Unsubscribe>,
}

impl Subscription {
    pub fn new(events: Receiver<ExecutionEvent>, unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            events,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ExecutionEvent, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Stop delivery. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Source of realtime subscriptions.
pub trait RealtimeSource {
    fn subscribe(&self, channel: &str) -> Result<Subscription>;
}

/// Realtime source backed by polling the platform's execution endpoint.
///
/// Each subscription runs one background thread that publishes an event
/// whenever the observed status changes, and exits on a terminal status,
/// on unsubscribe, or once the receiving side is gone.
pub struct PollingRealtime {
    executor: Arc<dyn FunctionExecutor>,
    function_id: String,
    interval: Duration,
}

impl PollingRealtime {
    pub fn new(executor: Arc<dyn FunctionExecutor>, function_id: &str, interval: Duration) -> Self {
        Self {
            executor,
            function_id: function_id.to_string(),
            interval,
        }
    }
}

impl RealtimeSource for PollingRealtime {
    fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let execution_id = channel
            .strip_prefix(EXECUTION_CHANNEL_PREFIX)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("unsupported realtime channel {channel:?}"))?
            .to_string();

        let (sender, receiver) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let poller = Poller {
            executor: Arc::clone(&self.executor),
            function_id: self.function_id.clone(),
            execution_id: execution_id.clone(),
            interval: self.interval,
            stop: Arc::clone(&stop),
        };
        thread::Builder::new()
            .name(format!("realtime-{execution_id}"))
            .spawn(move || poller.run(sender))
            .context("spawn realtime poller")?;

        tracing::debug!(channel, "subscribed");
        Ok(Subscription::new(receiver, move || {
            stop.store(true, Ordering::SeqCst);
        }))
    }
}

struct Poller {
    executor: Arc<dyn FunctionExecutor>,
    function_id: String,
    execution_id: String,
    interval: Duration,
    stop: Arc<AtomicBool>,
}

impl Poller {
    fn run(self, sender: Sender<ExecutionEvent>) {
        let mut last_status = None;
        while !self.stop.load(Ordering::SeqCst) {
            match self
                .executor
                .get_execution(&self.function_id, &self.execution_id)
            {
                Ok(execution) => {
                    if last_status != Some(execution.status) {
                        last_status = Some(execution.status);
                        if sender.send(ExecutionEvent::from(&execution)).is_err() {
                            return;
                        }
                    }
                    if execution.status.is_terminal() {
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!(execution_id = %self.execution_id, error = %err, "poll execution failed");
                }
            }
            thread::sleep(self.interval);
        }
        tracing::debug!(execution_id = %self.execution_id, "poller stopped");
    }
}
