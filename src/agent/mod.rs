//! Orchestration: dispatch, reconciliation, and the two run modes.

mod autonomous;
mod config;
mod dispatcher;
mod engine;
mod model;
mod pipeline;
mod reconcile;
mod state;
mod turn;

pub use autonomous::{AutonomousLoop, LoopOutcome, LoopState, ReviewTask};
pub use config::{
    EngineConfig, ExtractionConfig, KEY_ENFORCE_POLICY, KEY_EXECUTOR_TIMEOUT_SECS,
    KEY_MAX_ITERATIONS, KEY_MAX_RETRIES, KEY_MAX_TURNS_PER_PASS, KEY_PASS_TIMEOUT_SECS,
    KEY_STEP_TIMEOUT_SECS, LoopConfig,
};
pub use dispatcher::{Conversation, Dispatched, Dispatcher};
pub use engine::{DEFAULT_REVIEW_INSTRUCTIONS, Engine, EngineBuilder, ReviewOutcome};
pub use model::{Focus, ModelStep, StepRequest};
pub use pipeline::{DEFAULT_INSTRUCTIONS, ProcessOutcome, TranscriptProcessor};
pub use reconcile::{
    CallEntry, Diagnostic, DiagnosticKind, Reconciled, ResultEntry, reconcile,
};
pub use state::{RunMetrics, ToolStats};
pub use turn::{PassEnd, PassReport};
