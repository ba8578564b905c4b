//! Engine instance and builder.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::autonomous::{AutonomousLoop, LoopState, ReviewTask};
use super::config::EngineConfig;
use super::dispatcher::Dispatcher;
use super::model::ModelStep;
use super::pipeline::{DEFAULT_INSTRUCTIONS, ProcessOutcome, TranscriptProcessor};
use super::state::RunMetrics;
use crate::config::ConfigProvider;
use crate::extraction::ExtractionEngine;
use crate::tools::meeting::{MeetingServices, meeting_tools};
use crate::tools::remote::RemoteToolBridge;
use crate::tools::review::{FINISH_TOOL_NAME, ReviewSession, ReviewedItem};
use crate::tools::{
    ContextFacts, ExecutionContext, FinishReviewTool, RecordItemReviewedTool, Tool, ToolRegistry,
};

pub const DEFAULT_REVIEW_INSTRUCTIONS: &str = "\
You are an autonomous reviewer working through tracked items one at a time.

Find the items that need attention, inspect each one, and take whatever action it needs. \
After finishing an item, call record_item_reviewed. When no items remain, call finish_review \
with a summary of the whole session. Do not stop early and do not review the same item twice.";

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub success: bool,
    pub reviewed_items: Vec<ReviewedItem>,
    pub completed: bool,
    pub state: LoopState,
    pub iterations: u32,
    pub tool_calls: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metrics: RunMetrics,
}

impl ReviewOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            reviewed_items: Vec::new(),
            completed: false,
            state: LoopState::Exhausted,
            iterations: 0,
            tool_calls: 0,
            final_summary: None,
            error: Some(error.into()),
            metrics: RunMetrics::default(),
        }
    }
}

/// Explicit orchestration engine. Build one per process (or per test) and
/// share it by reference; every run gets its own [`ExecutionContext`].
pub struct Engine {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ModelStep>,
    config: EngineConfig,
    review_instructions: String,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn dispatcher(&self, instructions: &str) -> Dispatcher {
        let engine = ExtractionEngine::new(self.config.extraction.clone())
            .with_step_timeout(self.config.step_timeout);
        Dispatcher::new(Arc::clone(&self.registry), Arc::clone(&self.model), engine)
            .with_executor_timeout(self.config.executor_timeout)
            .with_instructions(instructions)
    }

    fn instructions(&self) -> &str {
        self.config
            .instructions
            .as_deref()
            .unwrap_or(DEFAULT_INSTRUCTIONS)
    }

    pub async fn process(&self, transcript: &str) -> ProcessOutcome {
        self.process_with_facts(transcript, ContextFacts::now()).await
    }

    pub async fn process_with_facts(&self, transcript: &str, facts: ContextFacts) -> ProcessOutcome {
        let dispatcher = self.dispatcher(self.instructions());
        TranscriptProcessor::new(&dispatcher, self.model.as_ref())
            .with_instructions(self.instructions())
            .with_step_timeout(self.config.step_timeout)
            .with_max_turns(self.config.looping.max_turns_per_pass)
            .process(transcript, facts)
            .await
    }

    /// Runs an autonomous review session to completion or to the iteration cap.
    pub async fn review(&self, task: &ReviewTask) -> ReviewOutcome {
        self.review_with_facts(task, ContextFacts::now()).await
    }

    pub async fn review_with_facts(&self, task: &ReviewTask, facts: ContextFacts) -> ReviewOutcome {
        if !self.registry.contains(FINISH_TOOL_NAME) {
            warn!("Review requested without review capabilities registered");
            return ReviewOutcome::failed(format!(
                "`{}` is not registered; build the engine with review_tools()",
                FINISH_TOOL_NAME
            ));
        }

        let instructions = format!("{}\n\n{}", self.review_instructions, facts.render());
        let session = Arc::new(ReviewSession::new());
        let context = ExecutionContext::new(facts).with_extension(Arc::clone(&session));
        let dispatcher = self.dispatcher(&instructions);

        let outcome = AutonomousLoop::new(&dispatcher, self.model.as_ref(), self.config.looping.clone())
            .with_instructions(instructions.as_str())
            .with_step_timeout(self.config.step_timeout)
            .run(&context, &session, task)
            .await;

        let completed = outcome.state == LoopState::Complete;
        ReviewOutcome {
            success: true,
            reviewed_items: session.reviewed_items().await,
            completed,
            state: outcome.state,
            iterations: outcome.iterations,
            tool_calls: outcome.metrics.tool_calls,
            final_summary: session.final_summary().await,
            error: if completed { None } else { outcome.last_error },
            metrics: outcome.metrics,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    model: Option<Arc<dyn ModelStep>>,
    tools: Vec<Arc<dyn Tool>>,
    review_instructions: Option<String>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the configuration with the defaults overlaid by `provider`.
    pub async fn load_config(mut self, provider: &dyn ConfigProvider) -> crate::Result<Self> {
        let instructions = self.config.instructions.take();
        self.config = EngineConfig::load(provider).await?;
        self.config.instructions = instructions;
        Ok(self)
    }

    pub fn model(self, model: impl ModelStep + 'static) -> Self {
        self.model_arc(Arc::new(model))
    }

    pub fn model_arc(mut self, model: Arc<dyn ModelStep>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Registers the calendar, incident and decision capabilities.
    pub fn meeting_tools(mut self, services: MeetingServices) -> Self {
        self.tools.extend(meeting_tools(services));
        self
    }

    /// Registers `record_item_reviewed` and `finish_review`.
    pub fn review_tools(self) -> Self {
        self.tool(RecordItemReviewedTool).tool(FinishReviewTool)
    }

    pub fn remote_bridge(self, bridge: RemoteToolBridge) -> Self {
        self.tool(bridge)
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    pub fn review_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.review_instructions = Some(instructions.into());
        self
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.config.extraction.max_retries = max;
        self
    }

    pub fn max_iterations(mut self, max: u32) -> Self {
        self.config.looping.max_iterations = max;
        self
    }

    pub fn build(self) -> crate::Result<Engine> {
        let model = self
            .model
            .ok_or_else(|| crate::Error::Config("a model step is required".into()))?;

        let mut registry = ToolRegistry::new();
        for tool in self.tools {
            registry.register(tool)?;
        }
        info!(tools = registry.len(), "Engine built");

        Ok(Engine {
            registry: Arc::new(registry),
            model,
            config: self.config,
            review_instructions: self
                .review_instructions
                .unwrap_or_else(|| DEFAULT_REVIEW_INSTRUCTIONS.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::MemoryConfigProvider;
    use crate::testing::{EchoTool, ScriptedModel};

    #[test]
    fn test_build_requires_model() {
        let err = Engine::builder().tool(EchoTool::new("echo")).build().unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let err = Engine::builder()
            .model(ScriptedModel::new())
            .tool(EchoTool::new("echo"))
            .tool(EchoTool::new("echo"))
            .build()
            .unwrap_err();
        assert!(matches!(err, crate::Error::DuplicateTool { .. }));
    }

    #[test]
    fn test_meeting_tools_registered_in_order() {
        let engine = Engine::builder()
            .model(ScriptedModel::new())
            .meeting_tools(MeetingServices::default())
            .review_tools()
            .build()
            .unwrap();
        assert_eq!(
            engine.registry().names(),
            vec![
                "create_calendar_reminder",
                "generate_incident_report",
                "create_decision_record",
                "record_item_reviewed",
                "finish_review",
            ]
        );
    }

    #[tokio::test]
    async fn test_load_config_keeps_instructions() {
        let provider = MemoryConfigProvider::new().value("loop.max_iterations", "4");
        let engine = Engine::builder()
            .instructions("custom")
            .load_config(&provider)
            .await
            .unwrap()
            .model(ScriptedModel::new())
            .build()
            .unwrap();
        assert_eq!(engine.config().looping.max_iterations, 4);
        assert_eq!(engine.config().instructions.as_deref(), Some("custom"));
    }

    #[tokio::test]
    async fn test_review_without_review_tools() {
        let engine = Engine::builder()
            .model(ScriptedModel::new())
            .build()
            .unwrap();
        let outcome = engine.review(&ReviewTask::new("Review")).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("finish_review"));
    }

    #[tokio::test]
    async fn test_review_collects_items() {
        let model = ScriptedModel::new()
            .then_select(
                "record_item_reviewed",
                json!({"item_id": "7", "action_taken": "labeled", "summary": "added severity"}),
            )
            .then_select("finish_review", json!({"final_summary": "one item"}));
        let engine = Engine::builder()
            .model(model)
            .review_tools()
            .build()
            .unwrap();

        let outcome = engine.review(&ReviewTask::new("Review")).await;
        assert!(outcome.success);
        assert!(outcome.completed);
        assert_eq!(outcome.reviewed_items.len(), 1);
        assert_eq!(outcome.tool_calls, 2);
        assert_eq!(outcome.final_summary.as_deref(), Some("one item"));
    }
}
