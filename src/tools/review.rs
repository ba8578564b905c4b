//! Review-session state and the progress/completion capabilities used by the
//! autonomous loop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::SchemaTool;
use super::context::ExecutionContext;
use crate::extraction::Violation;
use crate::types::ToolResult;

pub const RECORD_TOOL_NAME: &str = "record_item_reviewed";
pub const FINISH_TOOL_NAME: &str = "finish_review";

/// Context counter bumped by every `finish_review` call. The loop commits the
/// request only once the pass that made it ends without error.
pub const FINISH_REQUESTS: &str = "finish_requests";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Commented,
    Labeled,
    Closed,
    Updated,
    NoActionNeeded,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commented => "commented",
            Self::Labeled => "labeled",
            Self::Closed => "closed",
            Self::Updated => "updated",
            Self::NoActionNeeded => "no_action_needed",
        }
    }
}

impl std::fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewedItem {
    pub item_id: String,
    pub action_taken: ReviewAction,
    pub summary: String,
}

/// Progress of one autonomous review session.
///
/// `is_complete` only ever moves from `false` to `true`. A `finish_review`
/// call only stages its summary; completion is committed by the loop.
#[derive(Debug, Default)]
pub struct ReviewSession {
    items: Mutex<Vec<ReviewedItem>>,
    complete: AtomicBool,
    iterations: AtomicU32,
    requested_summary: Mutex<Option<String>>,
    final_summary: Mutex<Option<String>>,
}

impl ReviewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, item: ReviewedItem) -> usize {
        let mut items = self.items.lock().await;
        items.push(item);
        items.len()
    }

    pub async fn reviewed_items(&self) -> Vec<ReviewedItem> {
        self.items.lock().await.clone()
    }

    pub async fn reviewed_count(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Returns `true` if this call performed the transition.
    pub async fn mark_complete(&self, summary: impl Into<String>) -> bool {
        let first = !self.complete.swap(true, Ordering::SeqCst);
        if first {
            *self.final_summary.lock().await = Some(summary.into());
        }
        first
    }

    pub(crate) async fn request_finish(&self, summary: String) {
        *self.requested_summary.lock().await = Some(summary);
    }

    /// Completes the session with the latest staged summary.
    pub(crate) async fn commit_finish(&self) -> bool {
        let summary = self.requested_summary.lock().await.take();
        self.mark_complete(summary.unwrap_or_default()).await
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    pub async fn final_summary(&self) -> Option<String> {
        self.final_summary.lock().await.clone()
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_iteration(&self) -> u32 {
        self.iterations.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn missing_session() -> ToolResult {
    ToolResult::error("No review session is attached to this run")
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RecordItemReviewedInput {
    /// Identifier of the item just reviewed, such as an issue number
    pub item_id: String,
    /// What was done to the item
    pub action_taken: ReviewAction,
    /// Brief summary of what was done
    pub summary: String,
}

/// Records that one item has been fully handled. Does not end the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordItemReviewedTool;

#[async_trait]
impl SchemaTool for RecordItemReviewedTool {
    type Input = RecordItemReviewedInput;
    const NAME: &'static str = RECORD_TOOL_NAME;
    const DESCRIPTION: &'static str = "Record that you've finished reviewing an item. Call this after \
        you've taken all necessary actions on a single item. This tracks your progress but does \
        NOT end the overall review session.";

    fn validate(&self, input: &Self::Input) -> Vec<Violation> {
        let mut violations = Vec::new();
        if input.item_id.trim().is_empty() {
            violations.push(Violation::correctness(
                "item_id",
                "must identify the reviewed item (e.g. \"42\"), got an empty string",
            ));
        }
        if input.summary.trim().is_empty() {
            violations.push(Violation::correctness(
                "summary",
                "must describe what was done (e.g. \"Added triage comment\"), got an empty string",
            ));
        }
        violations
    }

    async fn handle(&self, input: Self::Input, context: &ExecutionContext) -> ToolResult {
        let Some(session) = context.extension::<ReviewSession>() else {
            return missing_session();
        };

        let item = ReviewedItem {
            item_id: input.item_id,
            action_taken: input.action_taken,
            summary: input.summary,
        };
        tracing::info!(
            item = %item.item_id,
            action = %item.action_taken,
            "Item reviewed"
        );
        let payload = serde_json::to_value(&item).unwrap_or_default();
        let item_id = item.item_id.clone();
        let total = session.record(item).await;

        ToolResult::success(format!(
            "Recorded item #{}. Total reviewed: {}. Continue reviewing or call {} when done.",
            item_id, total, FINISH_TOOL_NAME
        ))
        .with_payload(serde_json::json!({"item": payload, "total_reviewed": total}))
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FinishReviewInput {
    /// Summary of the entire review session
    pub final_summary: String,
}

/// Signals that every item has been reviewed. The autonomous loop stops after
/// the current pass and commits completion if that pass succeeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinishReviewTool;

#[async_trait]
impl SchemaTool for FinishReviewTool {
    type Input = FinishReviewInput;
    const NAME: &'static str = FINISH_TOOL_NAME;
    const DESCRIPTION: &'static str = "Signal that you have finished reviewing ALL items. Call this \
        ONLY when you have searched for every item in scope, reviewed each one (or determined no \
        action is needed), and are confident there is nothing left to process.";

    async fn handle(&self, input: Self::Input, context: &ExecutionContext) -> ToolResult {
        let Some(session) = context.extension::<ReviewSession>() else {
            return missing_session();
        };

        session.request_finish(input.final_summary).await;
        let requests = context.increment(FINISH_REQUESTS);
        let reviewed = session.reviewed_count().await;
        tracing::info!(reviewed, requests, "Review finish requested");

        ToolResult::success(format!(
            "Review session complete. Reviewed {} item(s).",
            reviewed
        ))
        .with_payload(serde_json::json!({"reviewed": reviewed}))
    }
}
