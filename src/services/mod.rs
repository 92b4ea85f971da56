pub mod catalog_service;
pub mod identity_service;
pub mod llm_service;
pub mod matching_service;
pub mod problem_text_service;
pub mod quality_service;
pub mod review_service;
pub mod selection_hints;
pub mod transcription_service;

pub use catalog_service::CatalogService;
pub use identity_service::IdentityService;
pub use llm_service::{GenerativeModel, LlmService};
pub use matching_service::ExamCatalogMatcher;
pub use problem_text_service::{ProblemTextService, ProblemTexts};
pub use quality_service::QualityService;
pub use review_service::ReviewService;
pub use selection_hints::SelectionHints;
pub use transcription_service::TranscriptionService;
