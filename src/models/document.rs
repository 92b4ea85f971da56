use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, PipelineError};
use crate::models::catalog::ExamCatalogEntry;
use crate::models::identity::DocumentIdentity;
use crate::models::quality::QualityAssessment;
use crate::models::state::ProcessingState;
use crate::models::status::DocumentStatus;

/// 答案文档标识：上传文件名 + 去掉扩展名的 stem
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    filename: String,
    stem: String,
}

impl DocumentKey {
    pub fn new(filename: impl Into<String>) -> AppResult<Self> {
        let filename = filename.into().trim().to_string();
        if filename.is_empty() || filename.contains('/') || filename.contains("..") {
            return Err(PipelineError::EmptyDocumentName.into());
        }
        let stem = Path::new(&filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(PipelineError::EmptyDocumentName)?;
        Ok(Self { filename, stem })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.filename)
    }
}

/// 答案文档（内存中的只读缓存视图，以持久化状态为准）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerDocument {
    pub name: String,
    pub status: DocumentStatus,
    pub quality: Option<QualityAssessment>,
    pub details: Option<DocumentIdentity>,
    pub problem_set: Option<ExamCatalogEntry>,
    pub review_ref: Option<String>,
    pub last_error: Option<String>,
}

impl AnswerDocument {
    /// 由持久化状态重建
    pub fn from_state(name: impl Into<String>, state: ProcessingState) -> Self {
        Self {
            name: name.into(),
            status: state.status.unwrap_or(DocumentStatus::Unprocessed),
            quality: state.quality,
            details: state.details,
            problem_set: state.problem_set,
            review_ref: state.review_ref,
            last_error: state.last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_key_stem() {
        let key = DocumentKey::new("答案_山田.pdf").unwrap();
        assert_eq!(key.stem(), "答案_山田");
        assert_eq!(key.filename(), "答案_山田.pdf");
    }

    #[test]
    fn test_document_key_rejects_empty_and_paths() {
        assert!(DocumentKey::new("  ").is_err());
        assert!(DocumentKey::new("../etc/passwd").is_err());
    }
}
