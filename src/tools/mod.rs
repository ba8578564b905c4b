//! Capabilities and the per-run context they execute against.

mod context;
pub mod meeting;
mod registry;
pub mod remote;
pub mod review;
mod traits;

pub use context::{
    ContextFacts, ExecutionContext, FACT_ONE_WEEK_FROM_NOW, FACT_TODAY, FACT_WEEKDAY,
};
pub use meeting::{
    ArtifactRenderer, CalendarReminderTool, DecisionRecordTool, IncidentReportTool,
    MeetingServices, RecordKind, meeting_tools,
};
pub use registry::ToolRegistry;
pub use remote::{RemoteToolBridge, RemoteToolInfo, RemoteToolProvider};
pub use review::{
    FinishReviewTool, RecordItemReviewedTool, ReviewAction, ReviewSession, ReviewedItem,
};
pub use traits::{SchemaTool, Tool};
