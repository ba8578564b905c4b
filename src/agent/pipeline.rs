//! Transcript in, validated records out.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::dispatcher::Dispatcher;
use super::model::ModelStep;
use super::reconcile::{CallEntry, Diagnostic, reconcile};
use super::state::RunMetrics;
use super::turn::{PassDriver, PassEnd};
use crate::tools::{ContextFacts, ExecutionContext};
use crate::types::ToolResult;

pub const DEFAULT_INSTRUCTIONS: &str = "\
You are a meeting assistant that processes transcripts and extracts structured information.

Analyze the transcript and call the single most appropriate capability:
- Production incidents, outages, emergencies: generate_incident_report
- Architecture or strategic decisions: create_decision_record
- Regular meetings with action items: create_calendar_reminder

Only call ONE capability per transcript. Each one creates a comprehensive record including action items, so no additional calls are needed. If the transcript contains nothing worth recording, call nothing.

For calendar reminders: if the transcript mentions specific deadlines, set reminder_date 1-2 days before the earliest deadline. Otherwise use one week from today. Always use YYYY-MM-DD format.

After processing, reply with a concise Markdown summary: one opening sentence about what you found, a bulleted list of actions taken, a link to any created issue, and next steps. Do not use emojis or excited openings.";

const PREVIEW_CHARS: usize = 150;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub success: bool,
    pub calls: Vec<CallEntry>,
    /// Executor outputs in completion order
    pub results: Vec<ToolResult>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    pub metrics: RunMetrics,
}

impl ProcessOutcome {
    fn empty(summary: impl Into<String>) -> Self {
        Self {
            success: true,
            calls: Vec::new(),
            results: Vec::new(),
            summary: summary.into(),
            error: None,
            diagnostics: Vec::new(),
            metrics: RunMetrics::default(),
        }
    }

    fn failed(error: &crate::Error, metrics: RunMetrics) -> Self {
        Self {
            success: false,
            calls: Vec::new(),
            results: Vec::new(),
            summary: format!("Error processing transcript: {}", error),
            error: Some(error.to_string()),
            diagnostics: Vec::new(),
            metrics,
        }
    }
}

/// Runs one transcript through a single pass of the model.
pub struct TranscriptProcessor<'a> {
    dispatcher: &'a Dispatcher,
    model: &'a dyn ModelStep,
    instructions: &'a str,
    step_timeout: Option<Duration>,
    max_turns: u32,
}

impl<'a> TranscriptProcessor<'a> {
    pub fn new(dispatcher: &'a Dispatcher, model: &'a dyn ModelStep) -> Self {
        Self {
            dispatcher,
            model,
            instructions: DEFAULT_INSTRUCTIONS,
            step_timeout: None,
            max_turns: super::config::LoopConfig::default().max_turns_per_pass,
        }
    }

    pub fn with_instructions(mut self, instructions: &'a str) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Never fails: every error is folded into the outcome.
    #[instrument(skip_all, fields(transcript_len = transcript.len()))]
    pub async fn process(&self, transcript: &str, facts: ContextFacts) -> ProcessOutcome {
        if transcript.trim().is_empty() {
            return ProcessOutcome::empty("No transcript provided.");
        }

        let start = Instant::now();
        info!(preview = %preview(transcript), "Processing transcript");

        let instructions = format!("{}\n\n{}", self.instructions, facts.render());
        let context = ExecutionContext::new(facts);
        let driver = PassDriver {
            dispatcher: self.dispatcher,
            model: self.model,
            instructions: &instructions,
            step_timeout: self.step_timeout,
            max_turns: self.max_turns,
        };

        let prompt = format!("Process this meeting transcript:\n\n{}", transcript);
        let mut metrics = RunMetrics::default();
        let report = driver.run(&context, &prompt, &mut metrics, || false).await;
        metrics.execution_time_ms = start.elapsed().as_millis() as u64;

        let report = match report {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Transcript processing failed");
                return ProcessOutcome::failed(&e, metrics);
            }
        };

        let reconciled = match reconcile(&context.exchanges()) {
            Ok(reconciled) => reconciled,
            Err(e) => {
                warn!(error = %e, "Exchange history failed reconciliation");
                return ProcessOutcome::failed(&e, metrics);
            }
        };

        let summary = match (report.end, report.final_text) {
            (_, Some(text)) => text,
            (PassEnd::TurnLimit, None) => format!(
                "Stopped after {} turns without a final answer.",
                report.turns
            ),
            (_, None) => String::new(),
        };

        let results = context.results();
        info!(
            calls = reconciled.calls.len(),
            results = results.len(),
            total_tokens = metrics.total_tokens(),
            execution_time_ms = metrics.execution_time_ms,
            "Processing complete"
        );

        ProcessOutcome {
            success: true,
            calls: reconciled.calls,
            results,
            summary,
            error: None,
            diagnostics: reconciled.diagnostics,
            metrics,
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use serde_json::json;

    use super::*;
    use crate::extraction::ExtractionEngine;
    use crate::testing::{HoursTool, ScriptedModel};
    use crate::tools::ToolRegistry;

    fn facts() -> ContextFacts {
        ContextFacts::for_date(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap())
    }

    fn dispatcher(model: Arc<ScriptedModel>) -> Dispatcher {
        let registry = ToolRegistry::new().with_tool(HoursTool).unwrap();
        Dispatcher::new(Arc::new(registry), model, ExtractionEngine::default())
    }

    #[tokio::test]
    async fn test_empty_transcript() {
        let model = Arc::new(ScriptedModel::new());
        let dispatcher = dispatcher(model.clone());
        let outcome = TranscriptProcessor::new(&dispatcher, model.as_ref())
            .process("   ", facts())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.summary, "No transcript provided.");
        assert_eq!(model.request_count(), 0);
    }

    #[tokio::test]
    async fn test_instructions_carry_date_facts() {
        let model = Arc::new(
            ScriptedModel::new()
                .then_select("log_hours", json!({"task": "standup", "hours": 1}))
                .then_text("Logged one hour."),
        );
        let dispatcher = dispatcher(model.clone());
        let outcome = TranscriptProcessor::new(&dispatcher, model.as_ref())
            .process("We spent an hour on standup.", facts())
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.calls.len(), 1);
        assert_eq!(outcome.calls[0].input["hours"], 1);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.summary, "Logged one hour.");

        let request = &model.requests()[0];
        assert!(request.instructions.contains("Today is Sunday, 2026-10-18"));
        assert!(request.prompt.starts_with("Process this meeting transcript:"));
    }

    #[tokio::test]
    async fn test_model_failure_is_reported() {
        let model = Arc::new(ScriptedModel::new().then_error("connection reset"));
        let dispatcher = dispatcher(model.clone());
        let outcome = TranscriptProcessor::new(&dispatcher, model.as_ref())
            .process("Anything", facts())
            .await;
        assert!(!outcome.success);
        assert!(outcome.summary.starts_with("Error processing transcript:"));
        assert!(outcome.error.unwrap().contains("connection reset"));
        assert_eq!(outcome.metrics.model_errors, 1);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let cut = preview(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
