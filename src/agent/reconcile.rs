//! Rebuild call/result pairs from a linear exchange history.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::types::{CallId, Exchange, ReturnContent, ToolStatus};

const LEGACY_FAILURE_MARKER: &str = "Failed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEntry {
    pub call_id: CallId,
    pub name: String,
    /// `Null` when the recorded arguments could not be parsed
    pub input: Value,
    /// Status of the paired return; `Error` for unparseable arguments
    pub status: ToolStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub call_id: CallId,
    pub name: String,
    pub status: ToolStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Classified from free text rather than a status field
    #[serde(default)]
    pub legacy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MalformedArguments,
    MissingReturn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub call_id: CallId,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.call_id, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reconciled {
    pub calls: Vec<CallEntry>,
    pub results: Vec<ResultEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Reconciled {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Walks `exchanges` in order and pairs every return with its call.
///
/// Unparseable arguments are kept as error calls with a diagnostic. A return
/// without a preceding call, a reused call id, or a second return for the same
/// call fails with [`crate::Error::Integrity`]. Pure: the same input always
/// yields the same output.
pub fn reconcile(exchanges: &[Exchange]) -> crate::Result<Reconciled> {
    let mut reconciled = Reconciled::default();
    let mut calls: HashMap<&CallId, (&str, usize)> = HashMap::new();
    let mut returned: HashSet<&CallId> = HashSet::new();

    for exchange in exchanges {
        match exchange {
            Exchange::ModelStep { .. } => {}
            Exchange::CapabilityCall {
                call_id,
                name,
                arguments,
            } => {
                if calls
                    .insert(call_id, (name.as_str(), reconciled.calls.len()))
                    .is_some()
                {
                    return Err(integrity(call_id, "call id used by more than one call"));
                }
                let entry = match arguments.parse() {
                    Ok(input) => CallEntry {
                        call_id: call_id.clone(),
                        name: name.clone(),
                        input,
                        status: ToolStatus::Success,
                    },
                    Err(e) => {
                        let malformed = crate::Error::MalformedArguments {
                            call_id: call_id.to_string(),
                            message: e.to_string(),
                        };
                        reconciled.diagnostics.push(Diagnostic {
                            kind: DiagnosticKind::MalformedArguments,
                            call_id: call_id.clone(),
                            message: malformed.to_string(),
                        });
                        CallEntry {
                            call_id: call_id.clone(),
                            name: name.clone(),
                            input: Value::Null,
                            status: ToolStatus::Error,
                        }
                    }
                };
                reconciled.calls.push(entry);
            }
            Exchange::CapabilityReturn {
                call_id,
                name,
                content,
            } => {
                let Some(&(called, index)) = calls.get(call_id) else {
                    return Err(integrity(call_id, "return has no preceding call"));
                };
                if called != name.as_str() {
                    return Err(integrity(
                        call_id,
                        format!("return names `{}` but the call named `{}`", name, called),
                    ));
                }
                if !returned.insert(call_id) {
                    return Err(integrity(call_id, "call returned more than once"));
                }
                let result = classify(call_id, name, content);
                if let Some(call) = reconciled.calls.get_mut(index)
                    && call.status != ToolStatus::Error
                {
                    call.status = result.status;
                }
                reconciled.results.push(result);
            }
        }
    }

    for call in &reconciled.calls {
        if !returned.contains(&call.call_id) {
            reconciled.diagnostics.push(Diagnostic {
                kind: DiagnosticKind::MissingReturn,
                call_id: call.call_id.clone(),
                message: format!("no return recorded for `{}`", call.name),
            });
        }
    }

    Ok(reconciled)
}

fn classify(call_id: &CallId, name: &str, content: &ReturnContent) -> ResultEntry {
    match content {
        ReturnContent::Result(result) => ResultEntry {
            call_id: call_id.clone(),
            name: name.to_string(),
            status: result.status,
            message: result.text().to_string(),
            payload: result.payload.clone(),
            kind: result.kind.clone(),
            legacy: false,
        },
        ReturnContent::Legacy(text) => {
            warn!(call_id = %call_id, tool = %name, "Classifying legacy free-text return");
            let status = if text.contains(LEGACY_FAILURE_MARKER) {
                ToolStatus::Error
            } else {
                ToolStatus::Success
            };
            ResultEntry {
                call_id: call_id.clone(),
                name: name.to_string(),
                status,
                message: text.clone(),
                payload: Value::Null,
                kind: None,
                legacy: true,
            }
        }
    }
}

fn integrity(call_id: &CallId, message: impl Into<String>) -> crate::Error {
    crate::Error::Integrity {
        call_id: call_id.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{RawArguments, ToolResult};

    fn legacy(call_id: &str, name: &str, text: &str) -> Exchange {
        Exchange::CapabilityReturn {
            call_id: CallId::from(call_id),
            name: name.into(),
            content: ReturnContent::Legacy(text.into()),
        }
    }

    #[test]
    fn test_pairs_in_emission_order() {
        let exchanges = vec![
            Exchange::ModelStep {
                text: None,
                usage: None,
            },
            Exchange::call("a".into(), "log_hours", json!({"hours": 2}).into()),
            Exchange::call("b".into(), "echo", RawArguments::from(r#"{"text": "hi"}"#)),
            Exchange::result("b".into(), "echo", ToolResult::success("hi")),
            Exchange::result("a".into(), "log_hours", ToolResult::error("over")),
        ];

        let reconciled = reconcile(&exchanges).unwrap();
        assert_eq!(reconciled.calls.len(), 2);
        assert_eq!(reconciled.calls[1].input["text"], "hi");
        assert_eq!(reconciled.results[0].call_id.as_str(), "b");
        assert_eq!(reconciled.results[1].status, ToolStatus::Error);
        assert_eq!(reconciled.calls[0].status, ToolStatus::Error);
        assert_eq!(reconciled.calls[1].status, ToolStatus::Success);
        assert!(reconciled.is_clean());
    }

    #[test]
    fn test_status_field_is_authoritative() {
        let exchanges = vec![
            Exchange::call("a".into(), "echo", json!({}).into()),
            Exchange::result("a".into(), "echo", ToolResult::success("Failed over to replica")),
        ];
        let reconciled = reconcile(&exchanges).unwrap();
        assert_eq!(reconciled.results[0].status, ToolStatus::Success);
        assert!(!reconciled.results[0].legacy);
    }

    #[test]
    fn test_legacy_text_fallback() {
        let exchanges = vec![
            Exchange::call("a".into(), "echo", json!({}).into()),
            legacy("a", "echo", "Failed to create calendar reminder: bad date"),
            Exchange::call("b".into(), "echo", json!({}).into()),
            legacy("b", "echo", "Created calendar reminder"),
        ];
        let reconciled = reconcile(&exchanges).unwrap();
        assert_eq!(reconciled.results[0].status, ToolStatus::Error);
        assert_eq!(reconciled.results[1].status, ToolStatus::Success);
        assert!(reconciled.results.iter().all(|r| r.legacy));
    }

    #[test]
    fn test_malformed_arguments_become_diagnostics() {
        let exchanges = vec![
            Exchange::call("a".into(), "echo", RawArguments::from("{text: ")),
            Exchange::result("a".into(), "echo", ToolResult::error("bad input")),
        ];
        let reconciled = reconcile(&exchanges).unwrap();
        assert_eq!(reconciled.calls[0].status, ToolStatus::Error);
        assert!(reconciled.calls[0].input.is_null());
        assert_eq!(reconciled.diagnostics.len(), 1);
        assert_eq!(
            reconciled.diagnostics[0].kind,
            DiagnosticKind::MalformedArguments
        );
    }

    #[test]
    fn test_orphan_return_is_integrity_violation() {
        let exchanges = vec![Exchange::result("X".into(), "echo", ToolResult::success("ok"))];
        let err = reconcile(&exchanges).unwrap_err();
        assert!(err.is_integrity_violation());
        assert!(err.to_string().contains("X"));
    }

    #[test]
    fn test_duplicates_are_integrity_violations() {
        let reused = vec![
            Exchange::call("a".into(), "echo", json!({}).into()),
            Exchange::call("a".into(), "echo", json!({}).into()),
        ];
        assert!(reconcile(&reused).unwrap_err().is_integrity_violation());

        let twice = vec![
            Exchange::call("a".into(), "echo", json!({}).into()),
            Exchange::result("a".into(), "echo", ToolResult::success("ok")),
            Exchange::result("a".into(), "echo", ToolResult::success("ok")),
        ];
        assert!(reconcile(&twice).unwrap_err().is_integrity_violation());

        let renamed = vec![
            Exchange::call("a".into(), "echo", json!({}).into()),
            Exchange::result("a".into(), "log_hours", ToolResult::success("ok")),
        ];
        assert!(reconcile(&renamed).unwrap_err().is_integrity_violation());
    }

    #[test]
    fn test_missing_return_reported() {
        let exchanges = vec![Exchange::call("a".into(), "echo", json!({}).into())];
        let reconciled = reconcile(&exchanges).unwrap();
        assert_eq!(reconciled.calls.len(), 1);
        assert_eq!(reconciled.diagnostics[0].kind, DiagnosticKind::MissingReturn);
    }

    #[test]
    fn test_idempotent() {
        let exchanges = vec![
            Exchange::call("a".into(), "echo", RawArguments::from("nope")),
            Exchange::result("a".into(), "echo", ToolResult::error("bad")),
            Exchange::call("b".into(), "echo", json!({"x": 1}).into()),
            legacy("b", "echo", "done"),
        ];
        assert_eq!(reconcile(&exchanges).unwrap(), reconcile(&exchanges).unwrap());
    }
}
