//! Linear run history.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::proposal::Usage;
use super::tool::ToolResult;

/// Identifier pairing a capability call with its return. Unique within a run.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

impl CallId {
    pub fn new() -> Self {
        Self(format!("call_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Arguments as the model emitted them: already structured, or serialized JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawArguments {
    Serialized(String),
    Structured(Value),
}

impl RawArguments {
    /// Normalizes to a structured value. Blank text means "no arguments".
    pub fn parse(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Structured(value) => Ok(value.clone()),
            Self::Serialized(text) if text.trim().is_empty() => {
                Ok(Value::Object(serde_json::Map::new()))
            }
            Self::Serialized(text) => serde_json::from_str(text),
        }
    }
}

impl From<Value> for RawArguments {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

impl From<&str> for RawArguments {
    fn from(text: &str) -> Self {
        Self::Serialized(text.to_string())
    }
}

impl From<String> for RawArguments {
    fn from(text: String) -> Self {
        Self::Serialized(text)
    }
}

/// What a capability return carries.
///
/// `Legacy` exists for producers that only emit free text; those results have
/// no status field and are classified heuristically during reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnContent {
    Result(ToolResult),
    Legacy(String),
}

impl ReturnContent {
    pub fn text(&self) -> &str {
        match self {
            Self::Result(result) => result.text(),
            Self::Legacy(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Exchange {
    ModelStep {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    CapabilityCall {
        call_id: CallId,
        name: String,
        arguments: RawArguments,
    },
    CapabilityReturn {
        call_id: CallId,
        name: String,
        content: ReturnContent,
    },
}

impl Exchange {
    pub fn call(call_id: CallId, name: impl Into<String>, arguments: RawArguments) -> Self {
        Self::CapabilityCall {
            call_id,
            name: name.into(),
            arguments,
        }
    }

    pub fn result(call_id: CallId, name: impl Into<String>, result: ToolResult) -> Self {
        Self::CapabilityReturn {
            call_id,
            name: name.into(),
            content: ReturnContent::Result(result),
        }
    }

    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            Self::CapabilityCall { call_id, .. } | Self::CapabilityReturn { call_id, .. } => {
                Some(call_id)
            }
            Self::ModelStep { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModelStep { .. } => "model_step",
            Self::CapabilityCall { .. } => "capability_call",
            Self::CapabilityReturn { .. } => "capability_return",
        }
    }
}
