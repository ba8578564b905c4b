use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::{MeetingServices, Priority, RecordKind, check_not_blank};
use crate::extraction::Violation;
use crate::tools::{ExecutionContext, SchemaTool};
use crate::types::ToolResult;

const ROOT_CAUSE_PREVIEW: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BusinessImpact {
    /// Overall description of business impact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Duration of downtime (e.g. "15 minutes")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downtime_duration: Option<String>,
    /// Number or description of affected users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_users: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_transactions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_impact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelineEvent {
    /// Time of the event (e.g. "10:15 AM")
    pub time: String,
    /// What happened at this time
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FollowUpAction {
    /// Follow-up action to prevent recurrence
    pub action: String,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IncidentReportInput {
    /// Clear, concise title (e.g. "Payment Processing API Outage")
    pub incident_title: String,
    pub severity: Severity,
    /// When the incident started (e.g. "10:15 AM")
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_time: Option<String>,
    /// When the incident was resolved, or "ongoing"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_time: Option<String>,
    pub root_cause: String,
    pub business_impact: BusinessImpact,
    /// Chronological timeline of incident events
    pub timeline: Vec<TimelineEvent>,
    pub resolution_steps: Vec<String>,
    #[serde(default)]
    pub stakeholders_notified: Vec<String>,
    #[serde(default)]
    pub follow_up_actions: Vec<FollowUpAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IncidentReportTool {
    services: MeetingServices,
}

impl IncidentReportTool {
    pub fn new(services: MeetingServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl SchemaTool for IncidentReportTool {
    type Input = IncidentReportInput;
    const NAME: &'static str = "generate_incident_report";
    const DESCRIPTION: &'static str = "Generate a structured incident report for production \
        issues, outages or critical problems. Use this when the transcript describes system \
        failures, emergency response calls, issues affecting users or revenue, or post-mortem \
        discussions. Only one tool should be used per transcript.";
    const KIND: Option<&'static str> = Some("incident");

    fn validate(&self, input: &Self::Input) -> Vec<Violation> {
        let mut violations = Vec::new();
        check_not_blank(
            "incident_title",
            &input.incident_title,
            "Payment API Outage",
            &mut violations,
        );
        check_not_blank(
            "root_cause",
            &input.root_cause,
            "API credentials expired",
            &mut violations,
        );
        violations
    }

    async fn handle(&self, input: Self::Input, _context: &ExecutionContext) -> ToolResult {
        let severity = input.severity.as_str().to_uppercase();
        tracing::info!(
            title = %input.incident_title,
            severity = %severity,
            "Generating incident report"
        );

        let preview: String = input.root_cause.chars().take(ROOT_CAUSE_PREVIEW).collect();
        let message = format!(
            "Generated incident report for '{}' (Severity: {}). Root cause: {}...",
            input.incident_title, severity, preview
        );
        let mut payload = Map::new();
        payload.insert(
            "resolved".into(),
            input
                .resolution_time
                .as_deref()
                .is_some_and(|t| !t.eq_ignore_ascii_case("ongoing"))
                .into(),
        );

        let record = serde_json::to_value(&input).unwrap_or_default();
        self.services
            .complete(
                RecordKind::Incident,
                &input.incident_title,
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
    use crate::publish::{IssueDraft, TRACKING_LABEL};
    use crate::testing::RecordingPublisher;
    use crate::tools::Tool;

    fn input() -> serde_json::Value {
        json!({
            "incident_title": "Payment API Outage",
            "severity": "critical",
            "start_time": "10:15 AM",
            "resolution_time": "11:00 AM",
            "root_cause": "API credentials expired",
            "business_impact": {"affected_users": "200 users"},
            "timeline": [{"time": "10:15 AM", "event": "Alerts fired"}],
            "resolution_steps": ["Rotated credentials"]
        })
    }

    #[test]
    fn test_schema_and_checks() {
        let tool = IncidentReportTool::default();
        assert!(crate::extraction::validate(&tool.input_schema(), &input()).is_empty());

        let mut missing = input();
        missing.as_object_mut().unwrap().remove("root_cause");
        let violations = crate::extraction::validate(&tool.input_schema(), &missing);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "root_cause");

        let mut wrong = input();
        wrong["severity"] = json!("sev1");
        let violations = crate::extraction::validate(&tool.input_schema(), &wrong);
        assert!(violations[0].message.contains("\"critical\""));
    }

    #[tokio::test]
    async fn test_generates_report() {
        let publisher = Arc::new(RecordingPublisher::succeeding("https://tracker/issues/9"));
        let tool = IncidentReportTool::new(MeetingServices::new(publisher.clone()));
        let result = tool.execute(input(), &ExecutionContext::default()).await;

        assert!(result.is_success());
        assert_eq!(result.kind.as_deref(), Some("incident"));
        assert!(result.text().starts_with(
            "Generated incident report for 'Payment API Outage' (Severity: CRITICAL). \
             Root cause: API credentials expired..."
        ));
        assert_eq!(result.payload["resolved"], true);

        let published = publisher.published().await;
        assert_eq!(published[0].0, "incident_report");
        let draft = IssueDraft::from_record(&published[0].0, &published[0].1);
        assert_eq!(draft.labels, vec!["incident", "critical", TRACKING_LABEL]);
    }
}
