//! Model-step proposals.

use serde::{Deserialize, Serialize};

use super::exchange::RawArguments;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySelection {
    pub name: String,
    pub arguments: RawArguments,
}

impl CapabilitySelection {
    pub fn new(name: impl Into<String>, arguments: impl Into<RawArguments>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One decision from the model: call a capability, or answer in plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Proposal {
    Selection(CapabilitySelection),
    PlainText { text: String },
}

impl Proposal {
    pub fn select(name: impl Into<String>, arguments: impl Into<RawArguments>) -> Self {
        Self::Selection(CapabilitySelection::new(name, arguments))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn as_selection(&self) -> Option<&CapabilitySelection> {
        match self {
            Self::Selection(selection) => Some(selection),
            Self::PlainText { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResponse {
    pub proposal: Proposal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StepResponse {
    pub fn new(proposal: Proposal) -> Self {
        Self {
            proposal,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

impl From<Proposal> for StepResponse {
    fn from(proposal: Proposal) -> Self {
        Self::new(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_tagging() {
        let selection: Proposal = serde_json::from_value(serde_json::json!({
            "type": "selection",
            "name": "log_hours",
            "arguments": {"hours": 2}
        }))
        .unwrap();
        assert_eq!(selection.as_selection().unwrap().name, "log_hours");

        let text: Proposal =
            serde_json::from_value(serde_json::json!({"type": "plain_text", "text": "done"}))
                .unwrap();
        assert_eq!(text, Proposal::text("done"));
        assert!(text.as_selection().is_none());
    }

    #[test]
    fn test_usage_total() {
        assert_eq!(Usage::new(120, 30).total(), 150);
    }
}
