//! Capability descriptor types.

use serde::{Deserialize, Serialize};

/// What the model sees of a registered capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Names of the top-level fields the schema marks as required.
    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|fields| fields.iter().filter_map(|f| f.as_str()).collect())
            .unwrap_or_default()
    }
}
