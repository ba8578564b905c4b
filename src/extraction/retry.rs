//! Propose, validate, re-propose with feedback.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::validator::{SchemaValidator, Violation};
use crate::agent::ExtractionConfig;
use crate::tools::Tool;
use crate::types::{RawArguments, ToolDefinition};

/// A schema-valid value and the number of extra proposal rounds it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub retries_used: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("no valid arguments for `{tool}` after {attempts} attempt(s): {}", last_errors.join("; "))]
pub struct ExtractionFailed {
    pub tool: String,
    pub attempts: u32,
    pub last_errors: Vec<String>,
}

/// Where replacement candidates come from, usually the model-step collaborator.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Propose new arguments for `tool` given the defects of the previous
    /// candidate. `Ok(None)` means the source declined to propose.
    async fn propose(
        &self,
        tool: &ToolDefinition,
        feedback: &[String],
        attempt: u32,
    ) -> crate::Result<Option<RawArguments>>;
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionEngine {
    config: ExtractionConfig,
    step_timeout: Option<Duration>,
}

impl ExtractionEngine {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            step_timeout: None,
        }
    }

    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Schema defects first; capability checks only run on structurally valid input.
    pub fn inspect(&self, tool: &dyn Tool, candidate: &Value) -> Vec<Violation> {
        let schema = tool.input_schema();
        let structural = SchemaValidator::new(&schema).validate(candidate);
        if !structural.is_empty() {
            return structural;
        }

        let (policy, correctness): (Vec<_>, Vec<_>) =
            tool.check(candidate).into_iter().partition(Violation::is_policy);
        if self.config.enforce_policy {
            return correctness.into_iter().chain(policy).collect();
        }
        for violation in &policy {
            debug!(tool = %tool.name(), %violation, "Policy violation not enforced");
        }
        correctness
    }

    pub async fn extract(
        &self,
        tool: &dyn Tool,
        initial: &RawArguments,
        source: &dyn CandidateSource,
    ) -> Result<Extracted, ExtractionFailed> {
        let mut feedback = match initial.parse() {
            Ok(candidate) => {
                let violations = self.inspect(tool, &candidate);
                if violations.is_empty() {
                    return Ok(Extracted {
                        value: candidate,
                        retries_used: 0,
                    });
                }
                render(&violations)
            }
            Err(e) => vec![malformed_feedback(&e)],
        };

        let definition = tool.definition();
        let max_retries = self.config.max_retries;

        for attempt in 1..=max_retries {
            debug!(
                tool = %definition.name,
                attempt,
                max_retries,
                defects = feedback.len(),
                "Requesting corrected arguments"
            );

            match self.propose(source, &definition, &feedback, attempt).await {
                Ok(Some(raw)) => match raw.parse() {
                    Ok(candidate) => {
                        let violations = self.inspect(tool, &candidate);
                        if violations.is_empty() {
                            debug!(tool = %definition.name, retries_used = attempt, "Arguments accepted");
                            return Ok(Extracted {
                                value: candidate,
                                retries_used: attempt,
                            });
                        }
                        feedback = render(&violations);
                    }
                    Err(e) => feedback = vec![malformed_feedback(&e)],
                },
                Ok(None) => {
                    feedback = vec![format!(
                        "no arguments were proposed; call `{}` with a JSON object matching its input schema",
                        definition.name
                    )];
                }
                Err(e) => {
                    warn!(tool = %definition.name, attempt, error = %e, "Candidate proposal failed");
                }
            }
        }

        warn!(
            tool = %definition.name,
            attempts = max_retries + 1,
            "Extraction abandoned"
        );
        Err(ExtractionFailed {
            tool: definition.name,
            attempts: max_retries + 1,
            last_errors: feedback,
        })
    }

    async fn propose(
        &self,
        source: &dyn CandidateSource,
        definition: &ToolDefinition,
        feedback: &[String],
        attempt: u32,
    ) -> crate::Result<Option<RawArguments>> {
        let call = source.propose(definition, feedback, attempt);
        match self.step_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| crate::Error::Timeout(limit))?,
            None => call.await,
        }
    }
}

fn render(violations: &[Violation]) -> Vec<String> {
    violations.iter().map(ToString::to_string).collect()
}

fn malformed_feedback(error: &serde_json::Error) -> String {
    format!(
        "arguments are not valid JSON ({}); send a single JSON object such as {{\"field\": \"value\"}}",
        error
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::testing::HoursTool;

    struct Queue {
        candidates: Mutex<Vec<crate::Result<Option<Value>>>>,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl Queue {
        fn new(mut candidates: Vec<crate::Result<Option<Value>>>) -> Self {
            candidates.reverse();
            Self {
                candidates: Mutex::new(candidates),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CandidateSource for Queue {
        async fn propose(
            &self,
            _tool: &ToolDefinition,
            feedback: &[String],
            _attempt: u32,
        ) -> crate::Result<Option<RawArguments>> {
            self.seen.lock().unwrap().push(feedback.to_vec());
            self.candidates
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(None))
                .map(|candidate| candidate.map(RawArguments::from))
        }
    }

    fn engine(max_retries: u32) -> ExtractionEngine {
        ExtractionEngine::new(ExtractionConfig::default().with_max_retries(max_retries))
    }

    #[tokio::test]
    async fn test_valid_initial_costs_no_round_trip() {
        let source = Queue::new(vec![]);
        let extracted = engine(2)
            .extract(&HoursTool, &json!({"task": "a", "hours": 1}).into(), &source)
            .await
            .unwrap();
        assert_eq!(extracted.retries_used, 0);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_feedback_reaches_source() {
        let source = Queue::new(vec![Ok(Some(json!({"task": "a", "hours": 2})))]);
        let extracted = engine(2)
            .extract(&HoursTool, &json!({"task": "a", "hours": -5}).into(), &source)
            .await
            .unwrap();
        assert_eq!(extracted.retries_used, 1);
        assert_eq!(extracted.value["hours"], 2);

        let seen = source.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0][0].contains("`hours`"));
        assert!(seen[0][0].contains("-5"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let source = Queue::new(vec![
            Ok(Some(json!({"task": "a", "hours": 0}))),
            Ok(Some(json!({"task": "a", "hours": -1}))),
            Ok(Some(json!({"task": "a", "hours": 4}))),
        ]);
        let failed = engine(2)
            .extract(&HoursTool, &json!({"task": "a"}).into(), &source)
            .await
            .unwrap_err();
        assert_eq!(source.calls(), 2);
        assert_eq!(failed.attempts, 3);
        assert_eq!(failed.tool, "log_hours");
        assert!(failed.last_errors[0].contains("-1"));
    }

    #[tokio::test]
    async fn test_zero_retries_fails_immediately() {
        let source = Queue::new(vec![Ok(Some(json!({"task": "a", "hours": 4})))]);
        let failed = engine(0)
            .extract(&HoursTool, &json!({"hours": 4}).into(), &source)
            .await
            .unwrap_err();
        assert_eq!(source.calls(), 0);
        assert_eq!(failed.attempts, 1);
    }

    #[tokio::test]
    async fn test_malformed_text_is_retried() {
        let source = Queue::new(vec![Ok(Some(json!({"task": "a", "hours": 3})))]);
        let extracted = engine(1)
            .extract(&HoursTool, &RawArguments::from("{hours: 3"), &source)
            .await
            .unwrap();
        assert_eq!(extracted.retries_used, 1);
        assert!(source.seen.lock().unwrap()[0][0].contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_malformed_candidate_gets_parse_feedback() {
        struct Garbled;

        #[async_trait]
        impl CandidateSource for Garbled {
            async fn propose(
                &self,
                _tool: &ToolDefinition,
                _feedback: &[String],
                _attempt: u32,
            ) -> crate::Result<Option<RawArguments>> {
                Ok(Some(RawArguments::from("{\"hours\": ")))
            }
        }

        let failed = engine(1)
            .extract(&HoursTool, &json!({"hours": -1}).into(), &Garbled)
            .await
            .unwrap_err();
        assert!(failed.last_errors[0].contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_source_errors_consume_attempts() {
        let source = Queue::new(vec![
            Err(crate::Error::Model("rate limited".into())),
            Ok(None),
        ]);
        let failed = engine(2)
            .extract(&HoursTool, &json!({"task": "a", "hours": -2}).into(), &source)
            .await
            .unwrap_err();
        assert_eq!(source.calls(), 2);
        assert!(failed.last_errors[0].contains("no arguments were proposed"));
    }

    #[tokio::test]
    async fn test_policy_enforcement_toggle() {
        let over_ceiling = json!({"task": "a", "hours": 12});

        let strict = engine(0);
        assert_eq!(strict.inspect(&HoursTool, &over_ceiling).len(), 1);

        let lenient = ExtractionEngine::new(
            ExtractionConfig::default()
                .with_max_retries(0)
                .with_enforce_policy(false),
        );
        assert!(lenient.inspect(&HoursTool, &over_ceiling).is_empty());
        assert_eq!(lenient.inspect(&HoursTool, &json!({"task": "a", "hours": -1})).len(), 1);
    }
}
