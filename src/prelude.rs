//! Prelude module for convenient imports.
//!
//! ```rust
//! use transcript_agent::prelude::*;
//! ```

// Core types
pub use crate::Error;
pub use crate::Result;

// Engine
pub use crate::agent::{
    Engine, EngineBuilder, EngineConfig, ModelStep, ProcessOutcome, ReviewOutcome, ReviewTask,
    StepRequest,
};

// Tools
pub use crate::tools::{ContextFacts, ExecutionContext, SchemaTool, Tool, ToolRegistry};
pub use crate::types::{ToolResult, ToolStatus};

// Types
pub use crate::types::{CapabilitySelection, Exchange, Proposal, StepResponse, Usage};
