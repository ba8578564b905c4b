//! Bounded self-directed loop for review sessions.
//!
//! Each pass hands the model the registered capabilities and lets it act until
//! it answers in text or requests completion through `finish_review`. A finish
//! request is committed only when its pass ends cleanly; a pass that errors or
//! times out after the request leaves the session open. The loop never runs
//! more than `max_iterations` passes, and failed passes count toward the cap.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::config::LoopConfig;
use super::dispatcher::Dispatcher;
use super::model::ModelStep;
use super::state::RunMetrics;
use super::turn::PassDriver;
use crate::tools::remote::{RemoteToolInfo, RemoteToolProvider};
use crate::tools::review::{FINISH_REQUESTS, FINISH_TOOL_NAME, ReviewSession};
use crate::tools::ExecutionContext;
use crate::types::ToolDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Running,
    Complete,
    Exhausted,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// What the review is about and which remote capabilities it can reach.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewTask {
    pub objective: String,
    pub remote_tools: Vec<RemoteToolInfo>,
}

impl ReviewTask {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            remote_tools: Vec::new(),
        }
    }

    pub fn with_remote_tools(mut self, tools: Vec<RemoteToolInfo>) -> Self {
        self.remote_tools = tools;
        self
    }

    /// Builds a task from whatever the provider currently exposes.
    pub async fn discover(
        objective: impl Into<String>,
        provider: &dyn RemoteToolProvider,
    ) -> crate::Result<Self> {
        let tools = provider.list_tools().await?;
        info!(count = tools.len(), "Discovered remote tools");
        Ok(Self::new(objective).with_remote_tools(tools))
    }

    pub fn initial_prompt(&self, capabilities: &[ToolDefinition]) -> String {
        let mut prompt = self.objective.clone();

        prompt.push_str("\n\nCapabilities you can call:\n");
        for capability in capabilities {
            prompt.push_str(&format!(
                "- `{}`: {}\n  input schema: {}\n",
                capability.name, capability.description, capability.input_schema
            ));
        }

        if !self.remote_tools.is_empty() {
            prompt.push_str("\nRemote tools reachable through `execute_remote_tool`:\n");
            for tool in &self.remote_tools {
                prompt.push_str(&format!("- `{}`: {}\n", tool.name, tool.description));
            }
        }

        prompt.push_str(&format!(
            "\nCall `record_item_reviewed` after each item. Call `{}` once every item has been handled.",
            FINISH_TOOL_NAME
        ));
        prompt
    }

    pub fn continuation_prompt(&self, reviewed: usize) -> String {
        format!(
            "Continue your review session.\n\n\
             Progress so far: {} item(s) reviewed.\n\n\
             If you have processed every item, call `{}`.\n\
             Otherwise, continue finding and reviewing items.",
            reviewed, FINISH_TOOL_NAME
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopOutcome {
    pub state: LoopState,
    pub iterations: u32,
    pub failed_passes: u32,
    pub last_error: Option<String>,
    pub metrics: RunMetrics,
}

pub struct AutonomousLoop<'a> {
    dispatcher: &'a Dispatcher,
    model: &'a dyn ModelStep,
    config: LoopConfig,
    instructions: String,
    step_timeout: Option<Duration>,
}

impl<'a> AutonomousLoop<'a> {
    pub fn new(dispatcher: &'a Dispatcher, model: &'a dyn ModelStep, config: LoopConfig) -> Self {
        Self {
            dispatcher,
            model,
            config,
            instructions: String::new(),
            step_timeout: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    #[instrument(skip_all, fields(run_id = %context.run_id(), max_iterations = self.config.max_iterations))]
    pub async fn run(
        &self,
        context: &ExecutionContext,
        session: &ReviewSession,
        task: &ReviewTask,
    ) -> LoopOutcome {
        let start = Instant::now();
        let driver = PassDriver {
            dispatcher: self.dispatcher,
            model: self.model,
            instructions: &self.instructions,
            step_timeout: self.step_timeout,
            max_turns: self.config.max_turns_per_pass,
        };
        let capabilities = self.dispatcher.registry().definitions();

        let mut metrics = RunMetrics::default();
        let mut state = LoopState::Running;
        let mut failed_passes = 0;
        let mut last_error = None;

        info!(remote_tools = task.remote_tools.len(), "Starting autonomous review");

        while !state.is_terminal() {
            if session.is_complete() {
                state = LoopState::Complete;
                break;
            }
            if session.iterations() >= self.config.max_iterations {
                state = LoopState::Exhausted;
                break;
            }

            let iteration = session.begin_iteration();
            let prompt = if iteration == 1 {
                task.initial_prompt(&capabilities)
            } else {
                task.continuation_prompt(session.reviewed_count().await)
            };
            debug!(iteration, "Starting pass");

            let requests_before = context.counter(FINISH_REQUESTS);
            let finish_requested = || context.counter(FINISH_REQUESTS) > requests_before;

            let pass = driver.run(context, &prompt, &mut metrics, &finish_requested);
            let outcome = match self.config.pass_timeout {
                Some(limit) => match tokio::time::timeout(limit, pass).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(crate::Error::Timeout(limit)),
                },
                None => pass.await,
            };

            match outcome {
                Ok(report) => {
                    debug!(
                        iteration,
                        turns = report.turns,
                        end = ?report.end,
                        dispatched = report.dispatched.len(),
                        "Pass finished"
                    );
                    if finish_requested() {
                        session.commit_finish().await;
                        state = LoopState::Complete;
                    }
                }
                Err(e) => {
                    failed_passes += 1;
                    if finish_requested() {
                        warn!(iteration, "Discarding finish request from a failed pass");
                    }
                    warn!(iteration, error = %e, "Pass failed, continuing with next iteration");
                    last_error = Some(e.to_string());
                }
            }
        }

        metrics.execution_time_ms = start.elapsed().as_millis() as u64;
        let iterations = session.iterations();
        let reviewed = session.reviewed_count().await;

        match state {
            LoopState::Complete => info!(
                iterations,
                reviewed,
                tool_calls = metrics.tool_calls,
                total_tokens = metrics.total_tokens(),
                "Review session complete"
            ),
            _ => warn!(
                iterations,
                reviewed,
                "Hit iteration limit before the review signalled completion"
            ),
        }

        LoopOutcome {
            state,
            iterations,
            failed_passes,
            last_error,
            metrics,
        }
    }
}
