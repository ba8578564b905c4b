//! Bridge to a dynamically supplied capability set.
//!
//! The review mode does not know its remote tools ahead of time: it lists
//! them from a [`RemoteToolProvider`] at run start and lets the model call
//! any of them through the single `execute_remote_tool` capability.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SchemaTool;
use super::context::ExecutionContext;
use crate::extraction::Violation;
use crate::types::ToolResult;

pub const BRIDGE_TOOL_NAME: &str = "execute_remote_tool";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteToolInfo {
    pub name: String,
    pub description: String,
}

impl RemoteToolInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[async_trait]
pub trait RemoteToolProvider: Send + Sync {
    async fn list_tools(&self) -> crate::Result<Vec<RemoteToolInfo>>;

    /// Returns the text content of the remote result.
    async fn call_tool(&self, name: &str, arguments: Value) -> crate::Result<String>;
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemoteToolInput {
    /// Name of the remote tool to execute
    pub tool_name: String,
    /// Arguments for the tool; configured defaults are injected when missing
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

pub struct RemoteToolBridge {
    provider: Arc<dyn RemoteToolProvider>,
    defaults: Map<String, Value>,
}

impl RemoteToolBridge {
    pub fn new(provider: Arc<dyn RemoteToolProvider>) -> Self {
        Self {
            provider,
            defaults: Map::new(),
        }
    }

    /// Injects `key` into every call that does not set it, e.g. `owner` or `repo`.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    fn merge_defaults(&self, mut arguments: Map<String, Value>) -> Map<String, Value> {
        for (key, value) in &self.defaults {
            if !arguments.contains_key(key) {
                arguments.insert(key.clone(), value.clone());
            }
        }
        arguments
    }
}

impl std::fmt::Debug for RemoteToolBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteToolBridge")
            .field("defaults", &self.defaults.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SchemaTool for RemoteToolBridge {
    type Input = RemoteToolInput;
    const NAME: &'static str = BRIDGE_TOOL_NAME;
    const DESCRIPTION: &'static str = "Execute any remote tool listed in the task. This is your \
        primary way to search, read, comment on, label and update items. Pass the tool name and \
        its arguments as an object.";

    fn validate(&self, input: &Self::Input) -> Vec<Violation> {
        if input.tool_name.trim().is_empty() {
            vec![Violation::correctness(
                "tool_name",
                "must name a listed remote tool (e.g. \"list_issues\"), got an empty string",
            )]
        } else {
            Vec::new()
        }
    }

    async fn handle(&self, input: Self::Input, _context: &ExecutionContext) -> ToolResult {
        let arguments = self.merge_defaults(input.arguments);
        tracing::debug!(
            remote_tool = %input.tool_name,
            arguments = arguments.len(),
            "Calling remote tool"
        );

        match self
            .provider
            .call_tool(&input.tool_name, Value::Object(arguments))
            .await
        {
            Ok(text) => {
                let text = if text.is_empty() {
                    "Action completed successfully".to_string()
                } else {
                    text
                };
                ToolResult::success(text)
                    .with_payload(serde_json::json!({"tool_name": input.tool_name}))
            }
            Err(e) => {
                tracing::warn!(remote_tool = %input.tool_name, error = %e, "Remote tool failed");
                ToolResult::error(format!("Error executing {}: {}", input.tool_name, e))
                    .with_payload(serde_json::json!({"tool_name": input.tool_name}))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::StaticRemoteTools;
    use crate::tools::Tool;

    #[tokio::test]
    async fn test_defaults_injected_when_absent() {
        let remote = Arc::new(StaticRemoteTools::new().with_reply("list_issues", "[]"));
        let bridge = RemoteToolBridge::new(remote.clone())
            .with_default("owner", "acme")
            .with_default("repo", "notes");
        let context = ExecutionContext::default();

        let result = bridge
            .execute(
                json!({"tool_name": "list_issues", "arguments": {"repo": "other"}}),
                &context,
            )
            .await;
        assert!(result.is_success());
        assert_eq!(result.text(), "[]");

        let calls = remote.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["owner"], "acme");
        assert_eq!(calls[0].1["repo"], "other");
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_error_result() {
        let remote = Arc::new(StaticRemoteTools::new());
        let bridge = RemoteToolBridge::new(remote);
        let result = bridge
            .execute(json!({"tool_name": "close_issue"}), &ExecutionContext::default())
            .await;
        assert!(result.is_error());
        assert!(result.text().starts_with("Error executing close_issue"));
    }

    #[tokio::test]
    async fn test_empty_reply_reads_as_completed() {
        let remote = Arc::new(StaticRemoteTools::new().with_reply("add_labels", ""));
        let bridge = RemoteToolBridge::new(remote);
        let result = bridge
            .execute(json!({"tool_name": "add_labels"}), &ExecutionContext::default())
            .await;
        assert_eq!(result.text(), "Action completed successfully");
    }
}
