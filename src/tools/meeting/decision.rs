use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::{MeetingServices, RecordKind, check_date, check_not_blank};
use crate::extraction::Violation;
use crate::tools::{ExecutionContext, SchemaTool};
use crate::types::ToolResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Proposed,
    Accepted,
    Rejected,
    Deprecated,
    Superseded,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Deprecated => "deprecated",
            Self::Superseded => "superseded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionOption {
    /// The option or alternative that was considered
    pub option: String,
    #[serde(default)]
    pub pros: Vec<String>,
    #[serde(default)]
    pub cons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Consequences {
    #[serde(default)]
    pub positive: Vec<String>,
    #[serde(default)]
    pub negative: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionRecordInput {
    /// Clear, concise title of the decision
    pub decision_title: String,
    /// Date the decision was made (YYYY-MM-DD)
    pub decision_date: String,
    /// Usually "accepted" if finalized in the meeting
    pub status: DecisionStatus,
    /// What problem or need led to this decision
    pub context: String,
    /// All alternatives considered during the discussion
    pub options_considered: Vec<DecisionOption>,
    /// The final decision: which option was chosen
    pub decision: String,
    /// Why this decision was made
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequences: Option<Consequences>,
    #[serde(default)]
    pub decision_makers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DecisionRecordTool {
    services: MeetingServices,
}

impl DecisionRecordTool {
    pub fn new(services: MeetingServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl SchemaTool for DecisionRecordTool {
    type Input = DecisionRecordInput;
    const NAME: &'static str = "create_decision_record";
    const DESCRIPTION: &'static str = "Create an Architecture Decision Record (ADR) for strategic \
        or technical decisions: technology choices, product prioritization, process changes or \
        trade-off discussions that ended in a decision. Do not use it for meetings with only \
        action items (use create_calendar_reminder) or incidents (use generate_incident_report).";
    const KIND: Option<&'static str> = Some("decision");

    fn validate(&self, input: &Self::Input) -> Vec<Violation> {
        let mut violations = Vec::new();
        check_not_blank(
            "decision_title",
            &input.decision_title,
            "Use REST instead of GraphQL",
            &mut violations,
        );
        check_date("decision_date", &input.decision_date, &mut violations);
        if input.options_considered.is_empty() {
            violations.push(Violation::correctness(
                "options_considered",
                "must list at least one option (e.g. [{\"option\": \"REST\", \"pros\": [\"simple\"]}]), got []",
            ));
        }
        violations
    }

    async fn handle(&self, input: Self::Input, _context: &ExecutionContext) -> ToolResult {
        tracing::info!(
            title = %input.decision_title,
            status = input.status.as_str(),
            options = input.options_considered.len(),
            "Recording decision"
        );

        let message = format!(
            "Created decision record for '{}' ({} options considered, decision: {}).",
            input.decision_title,
            input.options_considered.len(),
            input.status.as_str()
        );
        let record = serde_json::to_value(&input).unwrap_or_default();
        self.services
            .complete(
                RecordKind::Decision,
                &input.decision_title,
                record,
                Map::new(),
                message,
            )
            .await
    }
}
