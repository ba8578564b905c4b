//! Capability execution results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
    Skipped,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of exactly one executor invocation.
///
/// Error results always carry a message; the constructors enforce it and the
/// dispatcher fills one in for hand-built results that omit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Record category for external reporting (`calendar`, `incident`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            payload: Value::Null,
            message: Some(message.into()),
            kind: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            payload: Value::Null,
            message: Some(message.into()),
            kind: None,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Skipped,
            payload: Value::Null,
            message: Some(message.into()),
            kind: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    pub fn text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    pub(crate) fn ensure_message(mut self) -> Self {
        if self.status == ToolStatus::Error && self.message.is_none() {
            self.message = Some("capability reported an error without details".into());
        }
        self
    }
}

impl From<ToolError> for ToolResult {
    fn from(error: ToolError) -> Self {
        Self::error(error.to_string())
    }
}

impl<T, E> From<Result<T, E>> for ToolResult
where
    T: Into<String>,
    E: std::fmt::Display,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(content) => Self::success(content),
            Err(e) => Self::error(e.to_string()),
        }
    }
}
