//! Core data types shared by the registry, dispatcher and run loops.

pub mod exchange;
pub mod proposal;
pub mod tool;

pub use exchange::{CallId, Exchange, RawArguments, ReturnContent};
pub use proposal::{CapabilitySelection, Proposal, StepResponse, Usage};
pub use tool::{ToolDefinition, ToolError, ToolResult, ToolStatus};
