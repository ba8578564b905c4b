//! Issue-publishing collaborator interface.
//!
//! The tracker API itself lives outside this crate. Capabilities hand a
//! content type and the validated record to an [`IssuePublisher`]; the
//! publisher reports `skipped` rather than failing when it is not configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ToolStatus;

/// Label added to every published issue so the review mode can find them.
pub const TRACKING_LABEL: &str = "transcript-app";

pub const CONTENT_MEETING_SUMMARY: &str = "meeting_summary";
pub const CONTENT_INCIDENT_REPORT: &str = "incident_report";
pub const CONTENT_DECISION_RECORD: &str = "decision_record";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PublishOutcome {
    pub fn published(external_id: impl Into<String>, external_url: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            external_id: Some(external_id.into()),
            external_url: Some(external_url.into()),
            message: None,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Skipped,
            external_id: None,
            external_url: None,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            external_id: None,
            external_url: None,
            message: Some(message.into()),
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

#[async_trait]
pub trait IssuePublisher: Send + Sync {
    /// Publishes one record. Failures are reported in the outcome, never raised.
    async fn publish(&self, content_type: &str, record: &Value) -> PublishOutcome;
}

/// Publisher used when no tracker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPublisher;

#[async_trait]
impl IssuePublisher for DisabledPublisher {
    async fn publish(&self, content_type: &str, _record: &Value) -> PublishOutcome {
        tracing::debug!(content_type, "Issue tracker not configured; skipping publish");
        PublishOutcome::skipped("issue tracker not configured")
    }
}

/// Title and labels for a record, derived per content type.
///
/// Body rendering is left to the publisher implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueDraft {
    pub content_type: String,
    pub title: String,
    pub labels: Vec<String>,
}

impl IssueDraft {
    pub fn from_record(content_type: &str, record: &Value) -> Self {
        let field = |key: &str| record.get(key).and_then(Value::as_str);

        let (title, labels) = match content_type {
            CONTENT_INCIDENT_REPORT => {
                let severity = field("severity").unwrap_or("medium");
                (
                    format!(
                        "[Incident] {}",
                        field("incident_title").or(field("title")).unwrap_or("Untitled")
                    ),
                    vec!["incident".to_string(), severity.to_string()],
                )
            }
            CONTENT_DECISION_RECORD => (
                format!(
                    "[ADR] {}",
                    field("decision_title")
                        .or(field("title"))
                        .unwrap_or("Untitled Decision")
                ),
                vec!["adr".to_string(), "decision".to_string()],
            ),
            CONTENT_MEETING_SUMMARY => {
                let meeting_type = field("meeting_type");
                (
                    format!(
                        "[{}] {}",
                        title_case(meeting_type.unwrap_or("meeting")),
                        field("meeting_title").unwrap_or("Untitled Meeting")
                    ),
                    vec![
                        "meeting".to_string(),
                        meeting_type.unwrap_or("general").to_string(),
                    ],
                )
            }
            other => (
                format!(
                    "[{}] {}",
                    title_case(other),
                    field("title").unwrap_or("Untitled")
                ),
                vec![other.replace('_', "-")],
            ),
        };

        let mut draft = Self {
            content_type: content_type.to_string(),
            title,
            labels: Vec::new(),
        };
        for label in labels.into_iter().chain([TRACKING_LABEL.to_string()]) {
            if !draft.labels.contains(&label) {
                draft.labels.push(label);
            }
        }
        draft
    }
}

fn title_case(raw: &str) -> String {
    raw.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
