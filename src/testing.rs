//! Deterministic collaborators for tests and examples.
//!
//! Nothing here talks to a real model or tracker. [`ScriptedModel`] replays
//! queued responses and keeps every request it received so tests can assert
//! on prompts, history, and correction feedback.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::agent::{ModelStep, StepRequest};
use crate::extraction::Violation;
use crate::publish::{IssuePublisher, PublishOutcome};
use crate::tools::remote::{RemoteToolInfo, RemoteToolProvider};
use crate::tools::{ExecutionContext, SchemaTool, Tool};
use crate::types::{Proposal, RawArguments, StepResponse, ToolResult, Usage};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Model step that replays a fixed script. An exhausted script fails with
/// [`crate::Error::Model`].
#[derive(Debug, Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<StepResponse, String>>>,
    requests: Mutex<Vec<StepRequest>>,
    usage: Option<Usage>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, response: impl Into<StepResponse>) -> Self {
        lock(&self.script).push_back(Ok(response.into()));
        self
    }

    pub fn then_select(self, name: &str, arguments: impl Into<RawArguments>) -> Self {
        self.then(Proposal::select(name, arguments))
    }

    pub fn then_text(self, text: &str) -> Self {
        self.then(Proposal::text(text))
    }

    pub fn then_error(self, message: &str) -> Self {
        lock(&self.script).push_back(Err(message.to_string()));
        self
    }

    /// Usage attached to every response that does not carry its own.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Sleeps before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<StepRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl ModelStep for ScriptedModel {
    async fn propose(&self, request: StepRequest) -> crate::Result<StepResponse> {
        lock(&self.requests).push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = lock(&self.script).pop_front();
        match next {
            Some(Ok(mut response)) => {
                if response.usage.is_none() {
                    response.usage = self.usage;
                }
                Ok(response)
            }
            Some(Err(message)) => Err(crate::Error::Model(message)),
            None => Err(crate::Error::Model("script exhausted".into())),
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HoursInput {
    /// What the time was spent on
    pub task: String,
    /// Hours spent, strictly positive
    pub hours: f64,
}

/// Timesheet capability with one correctness check (`hours > 0`) and one
/// policy check (at most 8 hours).
#[derive(Debug, Clone, Copy, Default)]
pub struct HoursTool;

pub const DAILY_HOURS_CEILING: f64 = 8.0;

#[async_trait]
impl SchemaTool for HoursTool {
    type Input = HoursInput;
    const NAME: &'static str = "log_hours";
    const DESCRIPTION: &'static str = "Log hours spent on a task.";
    const KIND: Option<&'static str> = Some("timesheet");

    fn validate(&self, input: &HoursInput) -> Vec<Violation> {
        if input.hours <= 0.0 {
            return vec![Violation::correctness(
                "hours",
                format!("must be positive, got {}", input.hours),
            )];
        }
        if input.hours > DAILY_HOURS_CEILING {
            return vec![Violation::policy(
                "hours",
                format!(
                    "must not exceed {} per entry, got {}",
                    DAILY_HOURS_CEILING, input.hours
                ),
            )];
        }
        Vec::new()
    }

    async fn handle(&self, input: HoursInput, _context: &ExecutionContext) -> ToolResult {
        ToolResult::success(format!("Logged {} hours for {}", input.hours, input.task))
            .with_payload(json!({"task": input.task, "hours": input.hours}))
    }
}

/// Accepts any object and echoes its `text` field.
#[derive(Debug, Clone)]
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echo the given text."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"text": {"type": "string"}}
        })
    }

    async fn execute(&self, input: Value, _context: &ExecutionContext) -> ToolResult {
        let text = input.get("text").and_then(Value::as_str).unwrap_or("ok");
        ToolResult::success(text)
    }
}

/// Executor that panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    fn name(&self) -> &str {
        "panic"
    }

    fn description(&self) -> &str {
        "Always panics."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, _context: &ExecutionContext) -> ToolResult {
        panic!("executor bug")
    }
}

/// Executor that sleeps before succeeding.
#[derive(Debug, Clone, Copy)]
pub struct SlowTool {
    delay: Duration,
}

impl SlowTool {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Sleeps, then succeeds."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, _context: &ExecutionContext) -> ToolResult {
        tokio::time::sleep(self.delay).await;
        ToolResult::success("finished")
    }
}

/// Publisher that records every call and returns a fixed outcome.
#[derive(Debug)]
pub struct RecordingPublisher {
    outcome: PublishOutcome,
    published: tokio::sync::Mutex<Vec<(String, Value)>>,
}

impl RecordingPublisher {
    pub fn succeeding(url: impl Into<String>) -> Self {
        let url = url.into();
        let id = url.rsplit('/').next().unwrap_or_default().to_string();
        Self::with_outcome(PublishOutcome::published(id, url))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_outcome(PublishOutcome::failed(message))
    }

    pub fn with_outcome(outcome: PublishOutcome) -> Self {
        Self {
            outcome,
            published: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl IssuePublisher for RecordingPublisher {
    async fn publish(&self, content_type: &str, record: &Value) -> PublishOutcome {
        self.published
            .lock()
            .await
            .push((content_type.to_string(), record.clone()));
        self.outcome.clone()
    }
}

/// Remote tool set with canned replies. Unknown tools fail.
#[derive(Debug, Default)]
pub struct StaticRemoteTools {
    replies: Vec<(RemoteToolInfo, String)>,
    calls: tokio::sync::Mutex<Vec<(String, Value)>>,
}

impl StaticRemoteTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, name: &str, reply: &str) -> Self {
        self.replies.push((
            RemoteToolInfo::new(name, format!("Remote {}", name)),
            reply.to_string(),
        ));
        self
    }

    pub async fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl RemoteToolProvider for StaticRemoteTools {
    async fn list_tools(&self) -> crate::Result<Vec<RemoteToolInfo>> {
        Ok(self.replies.iter().map(|(info, _)| info.clone()).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> crate::Result<String> {
        self.calls.lock().await.push((name.to_string(), arguments));
        self.replies
            .iter()
            .find(|(info, _)| info.name == name)
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| crate::Error::Tool(crate::types::ToolError::unknown_tool(name)))
    }
}
