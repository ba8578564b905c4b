//! Structural validation of candidate arguments against a capability schema.
//!
//! Validation itself is done by `jsonschema`. This module turns its errors
//! into [`Violation`]s whose messages name the field, state the constraint and
//! show the offending value, because the message is fed back to the model as
//! the only correction signal for its next attempt.

use jsonschema::error::ValidationErrorKind;
use jsonschema::{ValidationError, Validator};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correctness checks reject malformed or impossible values; policy checks
/// enforce business ceilings that may legitimately conflict with the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Correctness,
    Policy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
    pub kind: ViolationKind,
}

impl Violation {
    pub fn correctness(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind: ViolationKind::Correctness,
        }
    }

    pub fn policy(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind: ViolationKind::Policy,
        }
    }

    pub fn is_policy(&self) -> bool {
        self.kind == ViolationKind::Policy
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ViolationKind::Correctness => write!(f, "field `{}` {}", self.path, self.message),
            ViolationKind::Policy => write!(f, "policy: field `{}` {}", self.path, self.message),
        }
    }
}

pub const ROOT_PATH: &str = "input";
const MAX_REF_DEPTH: usize = 32;

/// Validates values against a schema document.
///
/// The schema is compiled once per validator. A schema that does not compile
/// rejects every value with a single root violation.
pub struct SchemaValidator<'a> {
    schema: &'a Value,
    compiled: Result<Validator, String>,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(schema: &'a Value) -> Self {
        let compiled = jsonschema::options()
            .should_validate_formats(true)
            .build(schema)
            .map_err(|e| e.to_string());
        if let Err(error) = &compiled {
            tracing::warn!(%error, "Capability schema does not compile");
        }
        Self { schema, compiled }
    }

    pub fn validate(&self, value: &Value) -> Vec<Violation> {
        let validator = match &self.compiled {
            Ok(validator) => validator,
            Err(error) => {
                return vec![Violation::correctness(
                    ROOT_PATH,
                    format!("cannot be checked: the capability schema is invalid ({})", error),
                )];
            }
        };

        let mut violations = Vec::new();
        for error in validator.iter_errors(value) {
            self.translate(&error, value, &mut violations);
        }
        violations
    }

    fn translate(&self, error: &ValidationError<'_>, root: &Value, out: &mut Vec<Violation>) {
        let pointer = error.instance_path.to_string();
        let segments = pointer_segments(&pointer);
        let path = instance_path(root, &segments);
        let value = root.pointer(&pointer).unwrap_or(&Value::Null);
        let node = self.schema_at(&segments);

        let message = match &error.kind {
            ValidationErrorKind::Required { property } => {
                let key = property.as_str().unwrap_or_default();
                let example = node
                    .and_then(|n| self.field_schema(n, key))
                    .and_then(|s| self.example(s))
                    .unwrap_or("<value>");
                out.push(Violation::correctness(
                    child_path(&path, key),
                    format!("is required (e.g. \"{}\": {})", key, example),
                ));
                return;
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                let known = node
                    .and_then(|n| self.resolve(n))
                    .and_then(|n| n.get("properties"))
                    .and_then(Value::as_object)
                    .map(|p| p.keys().map(String::as_str).collect::<Vec<_>>())
                    .unwrap_or_default();
                for key in unexpected {
                    out.push(Violation::correctness(
                        child_path(&path, key),
                        format!("is not allowed; known fields are: {}", known.join(", ")),
                    ));
                }
                return;
            }
            ValidationErrorKind::Enum { options } => {
                format!("must be one of {}, got {}", list_options(options), preview(value))
            }
            ValidationErrorKind::ExclusiveMinimum { limit } if limit.as_f64() == Some(0.0) => {
                format!("must be positive (e.g. 1), got {}", value)
            }
            ValidationErrorKind::ExclusiveMinimum { limit } => {
                format!("must be greater than {}, got {}", limit, value)
            }
            ValidationErrorKind::Minimum { limit } => {
                format!("must be at least {}, got {}", limit, value)
            }
            ValidationErrorKind::ExclusiveMaximum { limit } => {
                format!("must be less than {}, got {}", limit, value)
            }
            ValidationErrorKind::Maximum { limit } => {
                format!("must be at most {}, got {}", limit, value)
            }
            ValidationErrorKind::MinLength { limit } if *limit == 1 => {
                "must not be empty".to_string()
            }
            ValidationErrorKind::MinLength { limit } => format!(
                "must be at least {} characters, got {}",
                limit,
                value.as_str().map_or(0, |s| s.chars().count())
            ),
            ValidationErrorKind::MaxLength { limit } => format!(
                "must be at most {} characters, got {}",
                limit,
                value.as_str().map_or(0, |s| s.chars().count())
            ),
            ValidationErrorKind::MinItems { limit } => format!(
                "must contain at least {} item(s), got {}",
                limit,
                value.as_array().map_or(0, Vec::len)
            ),
            ValidationErrorKind::MaxItems { limit } => format!(
                "must contain at most {} item(s), got {}",
                limit,
                value.as_array().map_or(0, Vec::len)
            ),
            ValidationErrorKind::Pattern { pattern } => {
                format!("must match pattern {}, got {}", pattern, preview(value))
            }
            ValidationErrorKind::Format { format } if format == "date" => format!(
                "must be a date in YYYY-MM-DD format (e.g. 2026-10-25), got {}",
                preview(value)
            ),
            ValidationErrorKind::Type { .. } => match node.and_then(|n| self.expectation(n)) {
                Some(expected) => format!(
                    "must be {}, got {} {}",
                    expected,
                    type_name(value),
                    preview(value)
                ),
                None => error.to_string(),
            },
            _ => match node.and_then(|n| self.expectation(n)) {
                Some(expected) => format!("must be {}, got {}", expected, preview(value)),
                None => error.to_string(),
            },
        };
        out.push(Violation::correctness(path, message));
    }

    /// Follows local `$ref`s and unwraps nullable `anyOf`/`oneOf` pairs.
    fn resolve(&self, mut node: &'a Value) -> Option<&'a Value> {
        for _ in 0..MAX_REF_DEPTH {
            if let Some(reference) = node.get("$ref").and_then(Value::as_str) {
                node = self.schema.pointer(reference.strip_prefix('#')?)?;
                continue;
            }
            let branches = node
                .get("anyOf")
                .or_else(|| node.get("oneOf"))
                .and_then(Value::as_array);
            match branches {
                Some(branches) if branches.iter().all(|b| b.get("const").is_none()) => {
                    let non_null: Vec<&Value> = branches
                        .iter()
                        .filter(|b| b.get("type").and_then(Value::as_str) != Some("null"))
                        .collect();
                    match non_null.as_slice() {
                        [only] => node = *only,
                        _ => return Some(node),
                    }
                }
                _ => return Some(node),
            }
        }
        None
    }

    fn field_schema(&self, node: &'a Value, key: &str) -> Option<&'a Value> {
        self.resolve(node)?.get("properties")?.get(key)
    }

    /// The sub-schema describing the value at `segments`, if it can be found.
    fn schema_at(&self, segments: &[String]) -> Option<&'a Value> {
        let mut node = self.schema;
        for segment in segments {
            let resolved = self.resolve(node)?;
            node = match resolved.get("properties").and_then(|p| p.get(segment)) {
                Some(field) => field,
                None => resolved.get("items")?,
            };
        }
        Some(node)
    }

    fn allowed_values(&self, node: &'a Value) -> Option<Vec<&'a Value>> {
        let node = self.resolve(node)?;
        if let Some(options) = node.get("enum").and_then(Value::as_array) {
            return Some(options.iter().collect());
        }
        let branches = node
            .get("oneOf")
            .or_else(|| node.get("anyOf"))
            .and_then(Value::as_array)?;
        branches.iter().map(|b| b.get("const")).collect()
    }

    /// Human phrasing of what the schema accepts, with an example.
    fn expectation(&self, node: &'a Value) -> Option<String> {
        if let Some(options) = self.allowed_values(node) {
            let listed = options
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Some(format!("one of {}", listed));
        }
        let node = self.resolve(node)?;
        let names = type_names(node);
        let first = names.first()?;
        let described = names
            .iter()
            .map(|name| article(name))
            .collect::<Vec<_>>()
            .join(" or ");
        Some(format!("{} (e.g. {})", described, type_example(first, node)))
    }

    fn example(&self, node: &'a Value) -> Option<&'static str> {
        let node = self.resolve(node)?;
        let names = type_names(node);
        names.first().map(|name| type_example(name, node))
    }
}

/// Declared non-null type names, in schema order.
fn type_names(node: &Value) -> Vec<&str> {
    let names: Vec<&str> = match node.get("type") {
        Some(Value::String(name)) => vec![name.as_str()],
        Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    names.into_iter().filter(|n| *n != "null").collect()
}

fn article(type_name: &str) -> &str {
    match type_name {
        "string" => "a string",
        "number" => "a number",
        "integer" => "an integer",
        "boolean" => "a boolean",
        "array" => "an array",
        "object" => "an object",
        other => other,
    }
}

fn type_example(type_name: &str, node: &Value) -> &'static str {
    match type_name {
        "string" if node.get("format").and_then(Value::as_str) == Some("date") => "\"2026-10-25\"",
        "string" => "\"text\"",
        "number" => "1.5",
        "integer" => "3",
        "boolean" => "true",
        "array" => "[...]",
        "object" => "{...}",
        _ => "null",
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn list_options(options: &Value) -> String {
    match options.as_array() {
        Some(options) => options
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        None => options.to_string(),
    }
}

/// Short rendering of an offending value for feedback messages.
fn preview(value: &Value) -> String {
    const LIMIT: usize = 60;
    let text = value.to_string();
    if text.chars().count() <= LIMIT {
        text
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{}...", head)
    }
}

fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// `/items/1/task` becomes `items[1].task`, using the instance to tell array
/// indices from object keys.
fn instance_path(root: &Value, segments: &[String]) -> String {
    let mut path = ROOT_PATH.to_string();
    let mut current = Some(root);
    for segment in segments {
        match current {
            Some(Value::Array(items)) => {
                path = format!("{}[{}]", path, segment);
                current = segment.parse::<usize>().ok().and_then(|i| items.get(i));
            }
            _ => {
                path = child_path(&path, segment);
                current = current.and_then(|v| v.get(segment.as_str()));
            }
        }
    }
    path
}

fn child_path(parent: &str, key: &str) -> String {
    if parent == ROOT_PATH {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Convenience wrapper over [`SchemaValidator::validate`].
pub fn validate(schema: &Value, value: &Value) -> Vec<Violation> {
    SchemaValidator::new(schema).validate(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hours_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "hours": {"type": "number", "exclusiveMinimum": 0},
                "priority": {"type": "string", "enum": ["high", "medium", "low"]},
                "owner": {"type": "string", "minLength": 1}
            },
            "required": ["hours", "owner"]
        })
    }

    #[test]
    fn test_valid_value_has_no_violations() {
        let violations = validate(&hours_schema(), &json!({"hours": 2, "owner": "Ana"}));
        assert!(violations.is_empty());
    }

    #[test]
    fn test_positive_bound_message() {
        let violations = validate(&hours_schema(), &json!({"hours": -5, "owner": "Ana"}));
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].to_string(),
            "field `hours` must be positive (e.g. 1), got -5"
        );
    }

    #[test]
    fn test_required_field_carries_example() {
        let violations = validate(&hours_schema(), &json!({"hours": 1}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "owner");
        assert!(violations[0].message.contains("\"owner\": \"text\""));
    }

    #[test]
    fn test_empty_string_rejected() {
        let violations = validate(&hours_schema(), &json!({"hours": 1, "owner": ""}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "must not be empty");
    }

    #[test]
    fn test_enum_lists_options() {
        let violations = validate(
            &hours_schema(),
            &json!({"hours": 1, "owner": "Ana", "priority": "urgent"}),
        );
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "priority");
        assert!(violations[0].message.contains("\"high\", \"medium\", \"low\""));
        assert!(violations[0].message.contains("\"urgent\""));
    }

    #[test]
    fn test_type_mismatch() {
        let violations = validate(&hours_schema(), &json!({"hours": "two", "owner": "Ana"}));
        assert_eq!(violations.len(), 1);
        assert!(violations[0].message.starts_with("must be a number (e.g. 1.5)"));
        assert!(violations[0].message.contains("\"two\""));

        let root = validate(&hours_schema(), &json!([1, 2]));
        assert_eq!(root[0].path, ROOT_PATH);
        assert!(root[0].message.contains("an object"));
    }

    #[test]
    fn test_nested_paths_and_refs() {
        let schema = json!({
            "type": "object",
            "properties": {
                "items": {"type": "array", "items": {"$ref": "#/$defs/Item"}, "minItems": 1}
            },
            "required": ["items"],
            "$defs": {
                "Item": {
                    "type": "object",
                    "properties": {"task": {"type": "string"}},
                    "required": ["task"]
                }
            }
        });
        let violations = validate(&schema, &json!({"items": [{"task": "a"}, {}]}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "items[1].task");
        assert!(violations[0].message.contains("\"task\": \"text\""));

        let empty = validate(&schema, &json!({"items": []}));
        assert!(empty[0].message.contains("at least 1 item"));
    }

    #[test]
    fn test_nullable_any_of() {
        let schema = json!({
            "type": "object",
            "properties": {
                "due": {"anyOf": [{"$ref": "#/$defs/Priority"}, {"type": "null"}]}
            },
            "$defs": {"Priority": {"type": "string", "enum": ["high", "low"]}}
        });
        assert!(validate(&schema, &json!({"due": null})).is_empty());
        assert!(validate(&schema, &json!({"due": "high"})).is_empty());
        let violations = validate(&schema, &json!({"due": "soon"}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "due");
        assert!(violations[0].message.contains("one of \"high\", \"low\""));
    }

    #[test]
    fn test_type_list_with_null() {
        let schema = json!({"type": ["number", "null"]});
        assert!(validate(&schema, &json!(null)).is_empty());
        assert!(validate(&schema, &json!(1.5)).is_empty());
        assert!(validate(&schema, &json!("x"))[0].message.contains("a number"));
    }

    #[test]
    fn test_date_format_and_pattern() {
        let schema = json!({
            "type": "object",
            "properties": {
                "date": {"type": "string", "format": "date"},
                "code": {"type": "string", "pattern": "^[A-Z]{3}$"}
            }
        });
        assert!(validate(&schema, &json!({"date": "2026-02-28", "code": "ABC"})).is_empty());
        let violations = validate(&schema, &json!({"date": "2026-02-30", "code": "abc"}));
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.message.contains("YYYY-MM-DD")));
        assert!(violations.iter().any(|v| v.message.contains("pattern")));
    }

    #[test]
    fn test_additional_properties_rejected() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "additionalProperties": false
        });
        let violations = validate(&schema, &json!({"a": "x", "b": 1}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "b");
        assert!(violations[0].message.contains("known fields are: a"));
    }

    #[test]
    fn test_integer_accepts_whole_floats() {
        let schema = json!({"type": "integer", "minimum": 1});
        assert!(validate(&schema, &json!(3)).is_empty());
        assert!(validate(&schema, &json!(3.0)).is_empty());
        assert_eq!(validate(&schema, &json!(3.5)).len(), 1);
        assert!(validate(&schema, &json!(0))[0].message.contains("at least 1"));
    }

    #[test]
    fn test_object_keys_that_look_like_indices() {
        let schema = json!({
            "type": "object",
            "properties": {"7": {"type": "string"}}
        });
        let violations = validate(&schema, &json!({"7": 7}));
        assert_eq!(violations[0].path, "7");
    }

    #[test]
    fn test_invalid_schema_rejects_everything() {
        let schema = json!({"type": 12});
        let violations = validate(&schema, &json!({}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, ROOT_PATH);
        assert!(violations[0].message.contains("schema is invalid"));
    }

    #[test]
    fn test_policy_display() {
        let violation = Violation::policy("hours", "must be at most 8 per task, got 12");
        assert!(violation.is_policy());
        assert!(violation.to_string().starts_with("policy: field `hours`"));
    }
}
