//! Resolve, extract, execute, record.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::model::{Focus, ModelStep, StepRequest};
use crate::extraction::{CandidateSource, Extracted, ExtractionEngine};
use crate::tools::{ExecutionContext, Tool, ToolRegistry};
use crate::types::{
    CallId, CapabilitySelection, Exchange, Proposal, RawArguments, ToolDefinition, ToolError,
    ToolResult, Usage,
};

/// Outcome of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub call_id: CallId,
    pub tool: String,
    /// Validated input, absent when extraction was abandoned
    pub input: Option<Value>,
    pub retries_used: u32,
    pub result: ToolResult,
    /// Whether the executor ran and the result entered the result log
    pub executed: bool,
    pub duration_ms: u64,
    /// Tokens spent on correction rounds
    pub usage: Usage,
}

/// The request a dispatch happens inside of. Correction rounds repeat it so
/// the model still sees the source text and run facts while fixing arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Conversation<'a> {
    pub instructions: &'a str,
    pub prompt: &'a str,
}

impl<'a> Conversation<'a> {
    pub fn new(instructions: &'a str, prompt: &'a str) -> Self {
        Self {
            instructions,
            prompt,
        }
    }
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ModelStep>,
    engine: ExtractionEngine,
    executor_timeout: Option<Duration>,
    instructions: String,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        model: Arc<dyn ModelStep>,
        engine: ExtractionEngine,
    ) -> Self {
        Self {
            registry,
            model,
            engine,
            executor_timeout: None,
            instructions: String::new(),
        }
    }

    pub fn with_executor_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.executor_timeout = timeout;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs one capability selection to completion, correcting arguments
    /// against the dispatcher's own instructions only.
    pub async fn dispatch(
        &self,
        context: &ExecutionContext,
        name: &str,
        arguments: RawArguments,
    ) -> crate::Result<Dispatched> {
        let conversation = Conversation::new(&self.instructions, "");
        self.dispatch_in(context, conversation, name, arguments)
            .await
    }

    /// Runs one capability selection made inside `conversation`.
    ///
    /// Fails only when `name` is not registered. Every other failure,
    /// including abandoned extraction, comes back as an error result.
    #[instrument(skip(self, context, conversation, arguments), fields(tool = %name))]
    pub async fn dispatch_in(
        &self,
        context: &ExecutionContext,
        conversation: Conversation<'_>,
        name: &str,
        arguments: RawArguments,
    ) -> crate::Result<Dispatched> {
        let tool = self.registry.resolve(name)?;
        let call_id = CallId::new();
        let start = Instant::now();

        let source = ModelCandidates::new(self, context, conversation);
        let extracted = self.engine.extract(tool.as_ref(), &arguments, &source).await;

        let (input, retries_used, result, executed) = match extracted {
            Ok(Extracted {
                value,
                retries_used,
            }) => {
                // No await between execution and bookkeeping, so a cancelled
                // pass cannot drop an executed result.
                let result = self.execute(tool.as_ref(), value.clone(), context).await;
                context.record_result(result.clone());
                (Some(value), retries_used, result, true)
            }
            Err(failed) => {
                let mut result = ToolResult::error(failed.to_string())
                    .with_payload(serde_json::json!({"errors": failed.last_errors}));
                if let Some(kind) = tool.kind() {
                    result = result.with_kind(kind);
                }
                (None, failed.attempts.saturating_sub(1), result, false)
            }
        };

        let logged_arguments = input
            .clone()
            .map(RawArguments::Structured)
            .unwrap_or(arguments);
        context.record_exchanges([
            Exchange::call(call_id.clone(), name, logged_arguments),
            Exchange::result(call_id.clone(), name, result.clone()),
        ]);

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            call_id = %call_id,
            status = %result.status,
            retries_used,
            duration_ms,
            "Capability dispatched"
        );

        Ok(Dispatched {
            call_id,
            tool: name.to_string(),
            input,
            retries_used,
            result,
            executed,
            duration_ms,
            usage: source.usage(),
        })
    }

    /// Dispatches several selections concurrently within one run.
    ///
    /// Results come back in selection order; the result log receives them in
    /// completion order.
    pub async fn dispatch_all(
        &self,
        context: &ExecutionContext,
        selections: Vec<CapabilitySelection>,
    ) -> Vec<crate::Result<Dispatched>> {
        let futures = selections
            .into_iter()
            .map(|selection| async move {
                self.dispatch(context, &selection.name, selection.arguments)
                    .await
            });
        futures::future::join_all(futures).await
    }

    async fn execute(&self, tool: &dyn Tool, input: Value, context: &ExecutionContext) -> ToolResult {
        let run = AssertUnwindSafe(tool.execute(input, context)).catch_unwind();
        let outcome = match self.executor_timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(tool = %tool.name(), timeout_ms = limit.as_millis() as u64, "Executor timed out");
                    return ToolResult::from(ToolError::timeout(limit.as_millis() as u64));
                }
            },
            None => run.await,
        };

        match outcome {
            Ok(result) => result.ensure_message(),
            Err(_) => {
                warn!(tool = %tool.name(), "Executor panicked");
                ToolResult::from(ToolError::execution_failed(format!(
                    "{} panicked during execution",
                    tool.name()
                )))
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("engine", &self.engine)
            .field("executor_timeout", &self.executor_timeout)
            .finish_non_exhaustive()
    }
}

/// Asks the model step for corrected arguments, one focused request per round.
struct ModelCandidates<'a> {
    dispatcher: &'a Dispatcher,
    context: &'a ExecutionContext,
    conversation: Conversation<'a>,
    input_tokens: AtomicU32,
    output_tokens: AtomicU32,
}

impl<'a> ModelCandidates<'a> {
    fn new(
        dispatcher: &'a Dispatcher,
        context: &'a ExecutionContext,
        conversation: Conversation<'a>,
    ) -> Self {
        Self {
            dispatcher,
            context,
            conversation,
            input_tokens: AtomicU32::new(0),
            output_tokens: AtomicU32::new(0),
        }
    }

    fn usage(&self) -> Usage {
        Usage::new(
            self.input_tokens.load(Ordering::Relaxed),
            self.output_tokens.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
impl CandidateSource for ModelCandidates<'_> {
    async fn propose(
        &self,
        tool: &ToolDefinition,
        feedback: &[String],
        attempt: u32,
    ) -> crate::Result<Option<RawArguments>> {
        let mut request =
            StepRequest::new(self.conversation.instructions, self.conversation.prompt)
                .with_tools(vec![tool.clone()])
                .with_history(self.context.exchanges())
                .with_focus(Focus {
                    tool: tool.name.clone(),
                    feedback: feedback.to_vec(),
                    attempt,
                });
        if let Some(feedback) = request.feedback_message() {
            request.prompt = if request.prompt.is_empty() {
                feedback
            } else {
                format!("{}\n\n{}", request.prompt, feedback)
            };
        }

        let response = self.dispatcher.model.propose(request).await?;
        if let Some(usage) = &response.usage {
            self.input_tokens
                .fetch_add(usage.input_tokens, Ordering::Relaxed);
            self.output_tokens
                .fetch_add(usage.output_tokens, Ordering::Relaxed);
        }

        let text = match &response.proposal {
            Proposal::PlainText { text } => Some(text.clone()),
            Proposal::Selection(_) => None,
        };
        self.context.record_exchange(Exchange::ModelStep {
            text,
            usage: response.usage,
        });

        match response.proposal {
            Proposal::Selection(selection) if selection.name == tool.name => {
                debug!(tool = %tool.name, attempt, "Received corrected arguments");
                Ok(Some(selection.arguments))
            }
            Proposal::Selection(selection) => {
                warn!(
                    expected = %tool.name,
                    selected = %selection.name,
                    "Correction round selected a different capability"
                );
                Ok(None)
            }
            Proposal::PlainText { .. } => Ok(None),
        }
    }
}
