pub mod document_ctx;
pub mod step_executor;

pub use document_ctx::DocumentCtx;
pub use step_executor::{FailureKind, StepExecutor, StepFailure, StepOutcome, StepResult};
