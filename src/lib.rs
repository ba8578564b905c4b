//! # transcript-agent
//!
//! Agentic orchestration engine that turns meeting transcripts into validated,
//! side-effecting records.
//!
//! A language model chooses which capability to call; the engine validates the
//! proposed arguments against the capability's schema, feeds concrete defects
//! back to the model until they are fixed (or a retry cap is hit), executes the
//! capability, and keeps a linear exchange history that can be reconciled into
//! call/result pairs. A second mode runs a bounded autonomous loop in which the
//! model keeps acting until it signals completion.
//!
//! ## Transcript processing
//!
//! ```rust,no_run
//! use transcript_agent::prelude::*;
//! use transcript_agent::tools::MeetingServices;
//!
//! # async fn example(model: impl ModelStep + 'static) -> Result<()> {
//! let engine = Engine::builder()
//!     .model(model)
//!     .meeting_tools(MeetingServices::default())
//!     .build()?;
//!
//! let outcome = engine.process("Sprint planning: Dana owns the migration, due Friday.").await;
//! println!("{} ({} calls)", outcome.summary, outcome.calls.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Autonomous review
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use transcript_agent::prelude::*;
//! use transcript_agent::tools::{RemoteToolBridge, RemoteToolProvider};
//!
//! # async fn example(model: impl ModelStep + 'static, remote: Arc<dyn RemoteToolProvider>) -> Result<()> {
//! let engine = Engine::builder()
//!     .model(model)
//!     .review_tools()
//!     .remote_bridge(RemoteToolBridge::new(remote.clone()).with_default("owner", "acme"))
//!     .build()?;
//!
//! let task = ReviewTask::discover("Review every open item labelled transcript-app.", remote.as_ref()).await?;
//! let outcome = engine.review(&task).await;
//! println!("reviewed {} item(s), complete: {}", outcome.reviewed_items.len(), outcome.completed);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod agent;
pub mod config;
pub mod extraction;
pub mod observability;
pub mod prelude;
pub mod publish;
#[doc(hidden)]
pub mod testing;
pub mod tools;
pub mod types;

pub use agent::{
    Dispatcher, Engine, EngineBuilder, EngineConfig, ExtractionConfig, LoopConfig, LoopState,
    ModelStep, ProcessOutcome, ReviewOutcome, ReviewTask, RunMetrics, StepRequest, reconcile,
};
pub use extraction::{ExtractionEngine, ExtractionFailed, SchemaValidator, Violation};
pub use observability::TracingConfig;
pub use publish::{DisabledPublisher, IssuePublisher, PublishOutcome};
pub use tools::{ExecutionContext, SchemaTool, Tool, ToolRegistry};
pub use types::{
    CallId, CapabilitySelection, Exchange, Proposal, RawArguments, StepResponse, ToolError,
    ToolResult, ToolStatus, Usage,
};

/// Error type for transcript-agent operations.
///
/// Per-capability failures never surface here; they become error
/// [`ToolResult`]s. What remains is run-level: unknown or duplicate
/// capabilities, abandoned extractions, broken exchange histories, collaborator
/// failures, and configuration problems.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The model selected a capability that is not registered.
    #[error("Unknown capability: {name}")]
    UnknownTool { name: String },

    /// A capability with this name is already registered.
    #[error("Capability already registered: {name}")]
    DuplicateTool { name: String },

    /// No schema-valid arguments within the retry budget.
    #[error("Extraction failed: {0}")]
    ExtractionFailed(#[from] extraction::ExtractionFailed),

    /// Recorded arguments could not be parsed into a structured value.
    #[error("Malformed arguments for call {call_id}: {message}")]
    MalformedArguments { call_id: String, message: String },

    /// The exchange history does not pair calls and returns correctly.
    #[error("Integrity violation at call {call_id}: {message}")]
    Integrity { call_id: String, message: String },

    /// The model-step collaborator failed.
    #[error("Model step failed: {0}")]
    Model(String),

    /// Operation exceeded timeout.
    #[error("Operation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(std::time::Duration),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Tool execution failed.
    #[error("Tool execution failed: {0}")]
    Tool(#[from] types::ToolError),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing collaborators, duplicate registrations, bad settings
    Configuration,
    /// Collaborator failures and timeouts that may succeed on retry
    Transient,
    /// Corrupted exchange history
    Integrity,
    /// Arguments the model could not get right
    Extraction,
    /// Everything else
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::DuplicateTool { .. } => ErrorCategory::Configuration,

            Error::Model(_) | Error::Timeout(_) => ErrorCategory::Transient,

            Error::Integrity { .. } => ErrorCategory::Integrity,

            Error::ExtractionFailed(_)
            | Error::MalformedArguments { .. }
            | Error::UnknownTool { .. } => ErrorCategory::Extraction,

            Error::Json(_) | Error::Tool(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    pub fn is_integrity_violation(&self) -> bool {
        self.category() == ErrorCategory::Integrity
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::InvalidValue { key, message } => {
                Error::Config(format!("Invalid value for {}: {}", key, message))
            }
            config::ConfigError::Env(e) => Error::Config(format!("Environment error: {}", e)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownTool {
            name: "teleport".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown capability: teleport");

        let err = Error::Integrity {
            call_id: "X".to_string(),
            message: "return has no preceding call".to_string(),
        };
        assert!(err.to_string().contains("call X"));
    }

    #[test]
    fn test_error_categories() {
        assert!(Error::Model("overloaded".into()).is_retryable());
        assert!(Error::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(!Error::Config("missing model".into()).is_retryable());
        assert!(Error::Config("missing model".into()).is_configuration_error());
        assert!(
            Error::Integrity {
                call_id: "X".into(),
                message: "orphan".into()
            }
            .is_integrity_violation()
        );

        let failed = Error::from(extraction::ExtractionFailed {
            tool: "log_hours".into(),
            attempts: 3,
            last_errors: vec!["field `hours` must be positive, got -1".into()],
        });
        assert_eq!(failed.category(), ErrorCategory::Extraction);
        assert!(failed.to_string().contains("after 3 attempt(s)"));
    }

    #[test]
    fn test_config_error_conversion() {
        let config_err = config::ConfigError::InvalidValue {
            key: "loop.max_iterations".to_string(),
            message: "must be greater than zero".to_string(),
        };
        let err: Error = config_err.into();
        assert!(matches!(err, Error::Config(ref m) if m.contains("loop.max_iterations")));
    }
}
