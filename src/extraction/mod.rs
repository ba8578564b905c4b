//! Schema-validated extraction with a bounded model-feedback retry loop.

pub mod retry;
pub mod validator;

pub use retry::{CandidateSource, Extracted, ExtractionEngine, ExtractionFailed};
pub use validator::{SchemaValidator, Violation, ViolationKind, validate};
