//! Tool error types.

use thiserror::Error;

/// Per-call failures. These never abort a run; they become error results.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("not configured: {what}")]
    NotConfigured { what: String },
}

impl ToolError {
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    pub fn not_configured(what: impl Into<String>) -> Self {
        Self::NotConfigured { what: what.into() }
    }
}
