//! Tool trait definitions.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use super::context::ExecutionContext;
use crate::extraction::Violation;
use crate::types::{ToolDefinition, ToolResult};

/// Core tool trait for all capability implementations.
///
/// Executors never fail out of band: every failure is reported as a
/// [`ToolResult`] with status `error`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;

    /// Semantic checks beyond the schema, run only on structurally valid input.
    fn check(&self, _input: &serde_json::Value) -> Vec<Violation> {
        Vec::new()
    }

    /// Record category for external reporting.
    fn kind(&self) -> Option<&str> {
        None
    }

    async fn execute(&self, input: serde_json::Value, context: &ExecutionContext) -> ToolResult;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

/// Schema-based tool trait with automatic JSON schema generation.
///
/// Provides a higher-level abstraction over `Tool` with typed inputs
/// and automatic schema derivation via schemars.
#[async_trait]
pub trait SchemaTool: Send + Sync {
    type Input: JsonSchema + DeserializeOwned + Send;
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    const KIND: Option<&'static str> = None;

    /// Checks the schema cannot express, such as real calendar dates or
    /// strictly positive estimates.
    fn validate(&self, _input: &Self::Input) -> Vec<Violation> {
        Vec::new()
    }

    async fn handle(&self, input: Self::Input, context: &ExecutionContext) -> ToolResult;

    fn input_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(Self::Input);
        let mut value =
            serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));

        if let Some(obj) = value.as_object_mut()
            && !obj.contains_key("properties")
        {
            obj.insert(
                "properties".to_string(),
                serde_json::Value::Object(serde_json::Map::new()),
            );
        }

        value
    }
}

#[async_trait]
impl<T: SchemaTool + 'static> Tool for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn description(&self) -> &str {
        T::DESCRIPTION
    }

    fn input_schema(&self) -> serde_json::Value {
        T::input_schema()
    }

    fn check(&self, input: &serde_json::Value) -> Vec<Violation> {
        match serde_json::from_value::<T::Input>(input.clone()) {
            Ok(typed) => SchemaTool::validate(self, &typed),
            Err(e) => vec![Violation::correctness(
                crate::extraction::validator::ROOT_PATH,
                format!("could not be read as {} input: {}", T::NAME, e),
            )],
        }
    }

    fn kind(&self) -> Option<&str> {
        T::KIND
    }

    async fn execute(&self, input: serde_json::Value, context: &ExecutionContext) -> ToolResult {
        let result = match serde_json::from_value::<T::Input>(input) {
            Ok(typed) => SchemaTool::handle(self, typed, context).await,
            Err(e) => ToolResult::error(format!("Invalid input: {}", e)),
        };
        match (T::KIND, &result.kind) {
            (Some(kind), None) => result.with_kind(kind),
            _ => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::HoursTool;

    #[test]
    fn test_schema_derivation() {
        let schema = <HoursTool as SchemaTool>::input_schema();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["hours"].is_object());
        let definition = HoursTool.definition();
        assert_eq!(definition.name, "log_hours");
        assert!(definition.required_fields().contains(&"hours"));
    }

    #[test]
    fn test_check_runs_typed_validation() {
        let violations = HoursTool.check(&json!({"task": "a", "hours": -5}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].to_string(), "field `hours` must be positive, got -5");
        assert!(HoursTool.check(&json!({"task": "a", "hours": 2})).is_empty());
    }

    #[test]
    fn test_check_reports_unreadable_input() {
        let violations = HoursTool.check(&json!({"task": 7}));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.contains("log_hours"));
    }

    #[tokio::test]
    async fn test_execute_tags_kind() {
        let context = ExecutionContext::default();
        let result = HoursTool
            .execute(json!({"task": "review", "hours": 2}), &context)
            .await;
        assert!(result.is_success());
        assert_eq!(result.kind.as_deref(), Some("timesheet"));

        let invalid = HoursTool.execute(json!({"hours": "x"}), &context).await;
        assert!(invalid.is_error());
        assert!(invalid.text().starts_with("Invalid input"));
    }
}
