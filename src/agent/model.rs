//! The model-step collaborator.
//!
//! The engine never talks to a model transport directly. It hands a
//! [`StepRequest`] to a [`ModelStep`] implementation and gets back one
//! [`StepResponse`]: either a capability selection or plain text.

use async_trait::async_trait;

use crate::types::{Exchange, StepResponse, ToolDefinition};

#[async_trait]
pub trait ModelStep: Send + Sync {
    async fn propose(&self, request: StepRequest) -> crate::Result<StepResponse>;
}

/// Correction request for one capability's arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Focus {
    pub tool: String,
    /// One message per violated constraint of the previous candidate
    pub feedback: Vec<String>,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRequest {
    pub instructions: String,
    pub prompt: String,
    /// Capabilities the model may select from
    pub tools: Vec<ToolDefinition>,
    /// Exchanges so far in this run
    pub history: Vec<Exchange>,
    pub focus: Option<Focus>,
}

impl StepRequest {
    pub fn new(instructions: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            prompt: prompt.into(),
            tools: Vec::new(),
            history: Vec::new(),
            focus: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_history(mut self, history: Vec<Exchange>) -> Self {
        self.history = history;
        self
    }

    pub fn with_focus(mut self, focus: Focus) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn is_correction(&self) -> bool {
        self.focus.is_some()
    }

    /// Feedback rendered as a single message to append to the conversation.
    pub fn feedback_message(&self) -> Option<String> {
        let focus = self.focus.as_ref()?;
        let mut message = format!(
            "The arguments for `{}` were rejected. Fix these problems and call it again:",
            focus.tool
        );
        for line in &focus.feedback {
            message.push_str("\n- ");
            message.push_str(line);
        }
        Some(message)
    }
}
