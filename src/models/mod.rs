pub mod catalog;
pub mod document;
pub mod identity;
pub mod quality;
pub mod review;
pub mod state;
pub mod status;
pub mod subject;

pub use catalog::ExamCatalogEntry;
pub use document::{AnswerDocument, DocumentKey};
pub use identity::DocumentIdentity;
pub use quality::{QualityAssessment, QualityLabel};
pub use review::{CommentKind, ReviewComment, ReviewDocument, ReviewQuestion, ReviewSummary};
pub use state::{timestamp_now, PipelineStep, ProcessingState, StatePatch, StepTiming};
pub use status::DocumentStatus;
pub use subject::Subject;
