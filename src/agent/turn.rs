//! One pass: ask the model, dispatch what it selects, repeat until it answers.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::dispatcher::{Conversation, Dispatched, Dispatcher};
use super::model::{ModelStep, StepRequest};
use super::state::RunMetrics;
use crate::tools::ExecutionContext;
use crate::types::{CallId, Exchange, Proposal, RawArguments, StepResponse, ToolResult};

/// Why a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassEnd {
    /// The model replied with plain text.
    Answered,
    /// The stop condition held after a dispatch.
    Stopped,
    /// The per-pass turn cap was reached.
    TurnLimit,
}

#[derive(Debug, Clone)]
pub struct PassReport {
    pub end: PassEnd,
    pub turns: u32,
    pub final_text: Option<String>,
    pub dispatched: Vec<Dispatched>,
}

pub(crate) struct PassDriver<'a> {
    pub dispatcher: &'a Dispatcher,
    pub model: &'a dyn ModelStep,
    pub instructions: &'a str,
    pub step_timeout: Option<Duration>,
    pub max_turns: u32,
}

impl PassDriver<'_> {
    /// Runs turns until the model answers in text, `should_stop` holds, or the
    /// turn cap is hit. Model failures and step timeouts end the pass with an
    /// error; capability failures never do.
    pub async fn run(
        &self,
        context: &ExecutionContext,
        prompt: &str,
        metrics: &mut RunMetrics,
        should_stop: impl Fn() -> bool,
    ) -> crate::Result<PassReport> {
        let tools = self.dispatcher.registry().definitions();
        let mut dispatched = Vec::new();
        let mut turns = 0;

        while turns < self.max_turns {
            turns += 1;
            debug!(turn = turns, "Starting turn");

            let request = StepRequest::new(self.instructions, prompt)
                .with_tools(tools.clone())
                .with_history(context.exchanges());

            let response = match self.step(request).await {
                Ok(response) => response,
                Err(e) => {
                    metrics.record_model_error();
                    return Err(e);
                }
            };
            metrics.record_model_step(response.usage.as_ref());
            if let Some(usage) = &response.usage {
                debug!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Model step usage"
                );
            }

            match response.proposal {
                Proposal::PlainText { text } => {
                    context.record_exchange(Exchange::ModelStep {
                        text: Some(text.clone()),
                        usage: response.usage,
                    });
                    debug!("No capability selected, ending pass");
                    return Ok(PassReport {
                        end: PassEnd::Answered,
                        turns,
                        final_text: Some(text),
                        dispatched,
                    });
                }
                Proposal::Selection(selection) => {
                    context.record_exchange(Exchange::ModelStep {
                        text: None,
                        usage: response.usage,
                    });

                    let conversation = Conversation::new(self.instructions, prompt);
                    match self
                        .dispatcher
                        .dispatch_in(
                            context,
                            conversation,
                            &selection.name,
                            selection.arguments.clone(),
                        )
                        .await
                    {
                        Ok(outcome) => {
                            metrics.add_usage(&outcome.usage);
                            metrics.record_tool(
                                &outcome.tool,
                                outcome.duration_ms,
                                outcome.result.is_error(),
                                outcome.retries_used,
                            );
                            dispatched.push(outcome);
                        }
                        Err(crate::Error::UnknownTool { name }) => {
                            warn!(tool = %name, "Model selected an unregistered capability");
                            self.reject_unknown(context, &name, selection.arguments);
                            metrics.record_tool(&name, 0, true, 0);
                        }
                        Err(e) => return Err(e),
                    }

                    if should_stop() {
                        debug!("Stop condition met, ending pass");
                        return Ok(PassReport {
                            end: PassEnd::Stopped,
                            turns,
                            final_text: None,
                            dispatched,
                        });
                    }
                }
            }
        }

        warn!(max_turns = self.max_turns, "Turn limit reached");
        Ok(PassReport {
            end: PassEnd::TurnLimit,
            turns,
            final_text: None,
            dispatched,
        })
    }

    async fn step(&self, request: StepRequest) -> crate::Result<StepResponse> {
        let start = Instant::now();
        let call = self.model.propose(request);
        let response = match self.step_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| crate::Error::Timeout(limit))?,
            None => call.await,
        };
        debug!(
            step_time_ms = start.elapsed().as_millis() as u64,
            ok = response.is_ok(),
            "Model step completed"
        );
        response
    }

    /// Feeds an unknown-capability error back to the model so it can choose again.
    fn reject_unknown(&self, context: &ExecutionContext, name: &str, arguments: RawArguments) {
        let call_id = CallId::new();
        let available = self.dispatcher.registry().names().join(", ");
        let result = ToolResult::error(format!(
            "Unknown capability `{}`. Available capabilities: {}",
            name, available
        ));
        info!(call_id = %call_id, tool = %name, "Rejected unknown capability");
        context.record_exchanges([
            Exchange::call(call_id.clone(), name, arguments),
            Exchange::result(call_id, name, result),
        ]);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::agent::reconcile;
    use crate::extraction::ExtractionEngine;
    use crate::testing::{EchoTool, ScriptedModel};
    use crate::tools::ToolRegistry;

    fn driver_parts(model: Arc<ScriptedModel>) -> Dispatcher {
        let registry = ToolRegistry::new().with_tool(EchoTool::new("echo")).unwrap();
        Dispatcher::new(Arc::new(registry), model, ExtractionEngine::default())
    }

    #[tokio::test]
    async fn test_pass_ends_on_text() {
        let model = Arc::new(
            ScriptedModel::new()
                .then_select("echo", json!({"text": "hi"}))
                .then_text("All done"),
        );
        let dispatcher = driver_parts(model.clone());
        let driver = PassDriver {
            dispatcher: &dispatcher,
            model: model.as_ref(),
            instructions: "",
            step_timeout: None,
            max_turns: 5,
        };
        let context = ExecutionContext::default();
        let mut metrics = RunMetrics::default();

        let report = driver
            .run(&context, "go", &mut metrics, || false)
            .await
            .unwrap();
        assert_eq!(report.end, PassEnd::Answered);
        assert_eq!(report.turns, 2);
        assert_eq!(report.final_text.as_deref(), Some("All done"));
        assert_eq!(report.dispatched.len(), 1);
        assert_eq!(metrics.model_steps, 2);
        assert_eq!(metrics.tool_calls, 1);

        // second request sees the first exchange pair
        let requests = model.requests();
        assert_eq!(requests[1].history.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_capability_is_fed_back() {
        let model = Arc::new(
            ScriptedModel::new()
                .then_select("teleport", json!({}))
                .then_text("Sorry"),
        );
        let dispatcher = driver_parts(model.clone());
        let driver = PassDriver {
            dispatcher: &dispatcher,
            model: model.as_ref(),
            instructions: "",
            step_timeout: None,
            max_turns: 5,
        };
        let context = ExecutionContext::default();
        let mut metrics = RunMetrics::default();

        let report = driver
            .run(&context, "go", &mut metrics, || false)
            .await
            .unwrap();
        assert!(report.dispatched.is_empty());
        assert_eq!(context.result_count(), 0);

        let reconciled = reconcile(&context.exchanges()).unwrap();
        assert_eq!(reconciled.results.len(), 1);
        assert!(reconciled.results[0].message.contains("echo"));
    }

    #[tokio::test]
    async fn test_turn_limit_and_model_errors() {
        let model = Arc::new(
            ScriptedModel::new()
                .then_select("echo", json!({"text": "1"}))
                .then_select("echo", json!({"text": "2"})),
        );
        let dispatcher = driver_parts(model.clone());
        let driver = PassDriver {
            dispatcher: &dispatcher,
            model: model.as_ref(),
            instructions: "",
            step_timeout: None,
            max_turns: 2,
        };
        let context = ExecutionContext::default();
        let mut metrics = RunMetrics::default();

        let report = driver
            .run(&context, "go", &mut metrics, || false)
            .await
            .unwrap();
        assert_eq!(report.end, PassEnd::TurnLimit);

        // script exhausted
        let err = driver
            .run(&context, "go", &mut metrics, || false)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::Model(_)));
        assert_eq!(metrics.model_errors, 1);
    }
}
