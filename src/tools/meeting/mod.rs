//! Meeting-record capabilities: calendar reminders, incident reports and
//! decision records.
//!
//! Each capability validates its typed input, asks the optional
//! [`ArtifactRenderer`] for a file body, publishes the record through the
//! configured [`IssuePublisher`] and reports one [`ToolResult`].

mod calendar;
mod decision;
mod incident;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use calendar::{
    ActionItem, Blocker, CalendarReminderInput, CalendarReminderTool, MeetingType, UrgentIssue,
};
pub use decision::{
    Consequences, DecisionOption, DecisionRecordInput, DecisionRecordTool, DecisionStatus,
};
pub use incident::{
    BusinessImpact, FollowUpAction, IncidentReportInput, IncidentReportTool, Severity,
    TimelineEvent,
};

use super::Tool;
use crate::extraction::Violation;
use crate::publish::{
    CONTENT_DECISION_RECORD, CONTENT_INCIDENT_REPORT, CONTENT_MEETING_SUMMARY, DisabledPublisher,
    IssuePublisher,
};
use crate::types::ToolResult;

const FILENAME_TITLE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Calendar,
    Incident,
    Decision,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Incident => "incident",
            Self::Decision => "decision",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Calendar => CONTENT_MEETING_SUMMARY,
            Self::Incident => CONTENT_INCIDENT_REPORT,
            Self::Decision => CONTENT_DECISION_RECORD,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Calendar => "ics",
            Self::Incident | Self::Decision => "md",
        }
    }

    fn failure_prefix(&self) -> &'static str {
        match self {
            Self::Calendar => "Failed to create calendar reminder",
            Self::Incident => "Failed to generate incident report",
            Self::Decision => "Failed to create decision record",
        }
    }
}

/// Produces the file body for a record (calendar or Markdown syntax).
#[async_trait]
pub trait ArtifactRenderer: Send + Sync {
    async fn render(&self, kind: RecordKind, record: &Value) -> crate::Result<String>;
}

/// Collaborators shared by the meeting capabilities.
#[derive(Clone)]
pub struct MeetingServices {
    pub publisher: Arc<dyn IssuePublisher>,
    pub renderer: Option<Arc<dyn ArtifactRenderer>>,
}

impl MeetingServices {
    pub fn new(publisher: Arc<dyn IssuePublisher>) -> Self {
        Self {
            publisher,
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ArtifactRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Render, publish and assemble the result shared by all meeting records.
    pub(crate) async fn complete(
        &self,
        kind: RecordKind,
        title: &str,
        record: Value,
        mut payload: Map<String, Value>,
        mut message: String,
    ) -> ToolResult {
        payload.insert("type".into(), Value::from(kind.as_str()));
        payload.insert(
            "filename".into(),
            Value::from(record_filename(
                title,
                kind.extension(),
                Utc::now().naive_utc(),
            )),
        );

        if let Some(renderer) = &self.renderer {
            match renderer.render(kind, &record).await {
                Ok(content) => {
                    payload.insert("content".into(), Value::from(content));
                }
                Err(e) => {
                    tracing::warn!(kind = kind.as_str(), error = %e, "Artifact rendering failed");
                    return ToolResult::error(format!("{}: {}", kind.failure_prefix(), e))
                        .with_kind(kind.as_str())
                        .with_payload(serde_json::json!({"data": record}));
                }
            }
        }

        let outcome = self.publisher.publish(kind.content_type(), &record).await;
        if outcome.is_published()
            && let Some(url) = &outcome.external_url
        {
            message.push_str(&format!(" Issue created: {}", url));
        }
        tracing::debug!(
            kind = kind.as_str(),
            publish_status = %outcome.status,
            "Record published"
        );
        payload.insert(
            "issue".into(),
            serde_json::to_value(&outcome).unwrap_or_default(),
        );
        payload.insert("data".into(), record);

        ToolResult::success(message)
            .with_payload(Value::Object(payload))
            .with_kind(kind.as_str())
    }
}

impl Default for MeetingServices {
    fn default() -> Self {
        Self::new(Arc::new(DisabledPublisher))
    }
}

impl std::fmt::Debug for MeetingServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeetingServices")
            .field("renderer", &self.renderer.is_some())
            .finish_non_exhaustive()
    }
}

/// All three meeting capabilities in their presentation order.
pub fn meeting_tools(services: MeetingServices) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(CalendarReminderTool::new(services.clone())),
        Arc::new(IncidentReportTool::new(services.clone())),
        Arc::new(DecisionRecordTool::new(services)),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// `<YYYYmmdd_HHMMSS>_<sanitized title>.<ext>`
pub fn record_filename(title: &str, extension: &str, at: NaiveDateTime) -> String {
    let safe: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe: String = safe
        .trim()
        .replace(' ', "_")
        .chars()
        .take(FILENAME_TITLE_LIMIT)
        .collect();
    format!("{}_{}.{}", at.format("%Y%m%d_%H%M%S"), safe, extension)
}

pub(crate) fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

pub(crate) fn check_date(path: &str, value: &str, out: &mut Vec<Violation>) {
    if parse_date(value).is_none() {
        out.push(Violation::correctness(
            path,
            format!(
                "must be a real calendar date in YYYY-MM-DD format (e.g. 2026-10-25), got {:?}",
                value
            ),
        ));
    }
}

pub(crate) fn check_not_blank(path: &str, value: &str, example: &str, out: &mut Vec<Violation>) {
    if value.trim().is_empty() {
        out.push(Violation::correctness(
            path,
            format!("must not be empty (e.g. {:?})", example),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_filename() {
        let at = NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap();
        assert_eq!(
            record_filename("  Q4 Planning: Budget & Hiring!  ", "ics", at),
            "20261018_140509_Q4_Planning_Budget__Hiring.ics"
        );

        let long = "x".repeat(80);
        let name = record_filename(&long, "md", at);
        assert_eq!(name, format!("20261018_140509_{}.md", "x".repeat(50)));
    }

    #[test]
    fn test_check_date() {
        let mut violations = Vec::new();
        check_date("reminder_date", "2026-10-25", &mut violations);
        assert!(violations.is_empty());
        check_date("reminder_date", "2026-13-01", &mut violations);
        check_date("reminder_date", "next Friday", &mut violations);
        assert_eq!(violations.len(), 2);
        assert!(violations[1].message.contains("\"next Friday\""));
    }

    #[test]
    fn test_record_kinds() {
        assert_eq!(RecordKind::Calendar.content_type(), CONTENT_MEETING_SUMMARY);
        assert_eq!(RecordKind::Incident.extension(), "md");
        assert_eq!(RecordKind::Decision.as_str(), "decision");
    }

    #[test]
    fn test_meeting_tools_order() {
        let names: Vec<_> = meeting_tools(MeetingServices::default())
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "create_calendar_reminder",
                "generate_incident_report",
                "create_decision_record"
            ]
        );
    }
}
