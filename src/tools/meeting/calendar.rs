use async_trait::async_trait;
use chrono::{Duration, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::{MeetingServices, Priority, RecordKind, check_date, check_not_blank, parse_date};
use crate::extraction::Violation;
use crate::tools::{ExecutionContext, SchemaTool};
use crate::types::ToolResult;

const REMINDER_HOUR: u32 = 9;
const REMINDER_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MeetingType {
    Standup,
    Planning,
    Brainstorm,
    Review,
    ClientCall,
    Interview,
    StatusUpdate,
    Retrospective,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionItem {
    /// The action item or task
    pub task: String,
    /// Person responsible
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// When it's due (e.g. "end of week", "Dec 10")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Estimated effort in hours; must be positive when given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Blocker {
    pub blocker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_person: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UrgentIssue {
    pub issue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalendarReminderInput {
    /// Title or topic of the meeting
    pub meeting_title: String,
    pub meeting_type: MeetingType,
    /// 2-3 sentence summary of what was discussed
    pub meeting_summary: String,
    /// Important points or decisions from the meeting
    pub key_points: Vec<String>,
    pub action_items: Vec<ActionItem>,
    /// Blockers or impediments mentioned (empty if none)
    #[serde(default)]
    pub blockers: Vec<Blocker>,
    /// Critical or urgent issues (empty if none)
    #[serde(default)]
    pub urgent_issues: Vec<UrgentIssue>,
    /// Reminder date in YYYY-MM-DD format. Set it 1-2 days before the earliest
    /// mentioned deadline, otherwise one week from today.
    pub reminder_date: String,
}

#[derive(Debug, Clone, Default)]
pub struct CalendarReminderTool {
    services: MeetingServices,
}

impl CalendarReminderTool {
    pub fn new(services: MeetingServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl SchemaTool for CalendarReminderTool {
    type Input = CalendarReminderInput;
    const NAME: &'static str = "create_calendar_reminder";
    const DESCRIPTION: &'static str = "Create a calendar reminder with comprehensive meeting \
        details from the transcript. Use this ONLY for regular meetings such as standups, \
        planning sessions, retrospectives, status updates, reviews, client calls and interviews. \
        Do not use it for production incidents (use generate_incident_report) or architecture \
        and strategic decisions (use create_decision_record). Only one tool should be used per \
        transcript.";
    const KIND: Option<&'static str> = Some("calendar");

    fn validate(&self, input: &Self::Input) -> Vec<Violation> {
        let mut violations = Vec::new();
        check_not_blank(
            "meeting_title",
            &input.meeting_title,
            "Sprint 42 planning",
            &mut violations,
        );
        check_date("reminder_date", &input.reminder_date, &mut violations);
        for (i, item) in input.action_items.iter().enumerate() {
            if let Some(hours) = item.estimated_hours
                && hours <= 0.0
            {
                violations.push(Violation::correctness(
                    format!("action_items[{}].estimated_hours", i),
                    format!("must be positive (e.g. 1.5), got {}", hours),
                ));
            }
        }
        violations
    }

    async fn handle(&self, input: Self::Input, _context: &ExecutionContext) -> ToolResult {
        let Some(date) = parse_date(&input.reminder_date) else {
            return ToolResult::error(format!(
                "Failed to create calendar reminder: invalid reminder_date {:?}",
                input.reminder_date
            ))
            .with_kind(RecordKind::Calendar.as_str());
        };
        let reminder = date.and_time(NaiveTime::MIN) + Duration::hours(REMINDER_HOUR.into());
        let end = reminder + Duration::minutes(REMINDER_MINUTES);

        tracing::info!(
            title = %input.meeting_title,
            action_items = input.action_items.len(),
            reminder_date = %input.reminder_date,
            "Creating calendar reminder"
        );

        let message = format!(
            "Created calendar reminder '{}' for {} with {} action items.",
            input.meeting_title,
            input.reminder_date,
            input.action_items.len()
        );
        let mut payload = Map::new();
        payload.insert(
            "reminder_time".into(),
            reminder.format("%Y-%m-%dT%H:%M:%S").to_string().into(),
        );
        payload.insert(
            "end_time".into(),
            end.format("%Y-%m-%dT%H:%M:%S").to_string().into(),
        );

        let record = serde_json::to_value(&input).unwrap_or_default();
        self.services
            .complete(
                RecordKind::Calendar,
                &input.meeting_title,
                record,
                payload,
                message,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::testing::RecordingPublisher;
    use crate::tools::Tool;

    fn input() -> serde_json::Value {
        json!({
            "meeting_title": "Sprint planning",
            "meeting_type": "planning",
            "meeting_summary": "Planned the sprint.",
            "key_points": ["Scope agreed"],
            "action_items": [
                {"task": "Write spec", "owner": "Ana", "priority": "high", "estimated_hours": 3},
                {"task": "Review", "owner": "Bo"}
            ],
            "reminder_date": "2026-10-25"
        })
    }

    #[test]
    fn test_schema_accepts_minimal_input() {
        let tool = CalendarReminderTool::default();
        let violations = crate::extraction::validate(&tool.input_schema(), &input());
        assert!(violations.is_empty(), "{:?}", violations);
        assert!(tool.check(&input()).is_empty());
    }

    #[test]
    fn test_rejects_bad_date_and_hours() {
        let mut bad = input();
        bad["reminder_date"] = json!("2026-02-30");
        bad["action_items"][1]["estimated_hours"] = json!(-5);
        let violations = CalendarReminderTool::default().check(&bad);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[1].path, "action_items[1].estimated_hours");
        assert!(violations[1].message.contains("got -5"));
    }

    #[tokio::test]
    async fn test_creates_reminder_and_publishes() {
        let publisher = Arc::new(RecordingPublisher::succeeding("https://tracker/issues/7"));
        let tool = CalendarReminderTool::new(MeetingServices::new(publisher.clone()));
        let result = tool.execute(input(), &ExecutionContext::default()).await;

        assert!(result.is_success());
        assert_eq!(result.kind.as_deref(), Some("calendar"));
        assert_eq!(
            result.text(),
            "Created calendar reminder 'Sprint planning' for 2026-10-25 with 2 action items. \
             Issue created: https://tracker/issues/7"
        );
        assert_eq!(result.payload["reminder_time"], "2026-10-25T09:00:00");
        assert_eq!(result.payload["end_time"], "2026-10-25T09:30:00");
        assert_eq!(result.payload["type"], "calendar");
        assert!(
            result.payload["filename"]
                .as_str()
                .unwrap()
                .ends_with("_Sprint_planning.ics")
        );
        assert_eq!(result.payload["issue"]["status"], "success");

        let published = publisher.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "meeting_summary");
    }

    #[tokio::test]
    async fn test_unconfigured_publisher_is_not_a_failure() {
        let result = CalendarReminderTool::default()
            .execute(input(), &ExecutionContext::default())
            .await;
        assert!(result.is_success());
        assert!(!result.text().contains("Issue created"));
        assert_eq!(result.payload["issue"]["status"], "skipped");
    }
}
