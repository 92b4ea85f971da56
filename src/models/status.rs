//! 答案处理状态
//!
//! 状态字符串是持久化的外部契约，前端和既有状态文件都按字面值读取。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::state::PipelineStep;

/// 答案处理状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocumentStatus {
    Unprocessed,
    Rasterizing,
    Rasterized,
    Classifying,
    /// 质量 NG，需要人工确认
    NeedsManualReview,
    Classified,
    Transcribing,
    Transcribed,
    Identifying,
    Identified,
    /// 题库中没有可用的题目集
    NoMatchFound,
    Reviewing,
    ReviewComplete,
    /// 人工签收，终态
    Completed,
    ReprocessStarted,
    Reprocessing(PipelineStep),
    Failed(PipelineStep),
    /// 无法识别的状态字符串，原样保留
    Other(String),
}

impl DocumentStatus {
    /// 状态字符串
    pub fn label(&self) -> String {
        match self {
            DocumentStatus::Unprocessed => "未処理".to_string(),
            DocumentStatus::Rasterizing => "処理中(PNG変換)".to_string(),
            DocumentStatus::Rasterized => "PNG変換済".to_string(),
            DocumentStatus::Classifying => "処理中(仕分け)".to_string(),
            DocumentStatus::NeedsManualReview => "仕分済 (要手動確認)".to_string(),
            DocumentStatus::Classified => "仕分済 (自動可)".to_string(),
            DocumentStatus::Transcribing => "処理中(書き起こし)".to_string(),
            DocumentStatus::Transcribed => "書き起こし済".to_string(),
            DocumentStatus::Identifying => "処理中(特定)".to_string(),
            DocumentStatus::Identified => "特定済".to_string(),
            DocumentStatus::NoMatchFound => "エラー(問題なし)".to_string(),
            DocumentStatus::Reviewing => "処理中(添削)".to_string(),
            DocumentStatus::ReviewComplete => "AI添削完了".to_string(),
            DocumentStatus::Completed => "添削完了".to_string(),
            DocumentStatus::ReprocessStarted => "再処理開始".to_string(),
            DocumentStatus::Reprocessing(step) => format!("再処理中({})", step),
            DocumentStatus::Failed(step) => format!("エラー({})", step),
            DocumentStatus::Other(raw) => raw.clone(),
        }
    }

    /// 从状态字符串解析
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let fixed = [
            DocumentStatus::Unprocessed,
            DocumentStatus::Rasterizing,
            DocumentStatus::Rasterized,
            DocumentStatus::Classifying,
            DocumentStatus::NeedsManualReview,
            DocumentStatus::Classified,
            DocumentStatus::Transcribing,
            DocumentStatus::Transcribed,
            DocumentStatus::Identifying,
            DocumentStatus::Identified,
            DocumentStatus::NoMatchFound,
            DocumentStatus::Reviewing,
            DocumentStatus::ReviewComplete,
            DocumentStatus::Completed,
            DocumentStatus::ReprocessStarted,
        ];
        if let Some(status) = fixed.into_iter().find(|s| s.label() == text) {
            return status;
        }

        let step_in = |prefix: &str| {
            text.strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|name| name.parse::<PipelineStep>().ok())
        };
        if let Some(step) = step_in("再処理中(") {
            return DocumentStatus::Reprocessing(step);
        }
        if let Some(step) = step_in("エラー(") {
            return DocumentStatus::Failed(step);
        }
        DocumentStatus::Other(text.to_string())
    }

    /// 是否处于处理中或错误状态
    pub fn is_busy(&self) -> bool {
        let label = self.label();
        label.contains("処理中") || label.contains("エラー")
    }

    /// 全量处理不再推进的状态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Completed
                | DocumentStatus::ReviewComplete
                | DocumentStatus::NeedsManualReview
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<String> for DocumentStatus {
    fn from(value: String) -> Self {
        DocumentStatus::parse(&value)
    }
}

impl From<DocumentStatus> for String {
    fn from(value: DocumentStatus) -> Self {
        value.label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_labels_round_trip() {
        let statuses = [
            DocumentStatus::Unprocessed,
            DocumentStatus::NeedsManualReview,
            DocumentStatus::ReviewComplete,
            DocumentStatus::Reprocessing(PipelineStep::Identify),
            DocumentStatus::Failed(PipelineStep::Transcribe),
        ];
        for status in statuses {
            assert_eq!(DocumentStatus::parse(&status.label()), status);
        }
        assert_eq!(DocumentStatus::Failed(PipelineStep::Png).label(), "エラー(png)");
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        // 旧版本写入的状态
        let status = DocumentStatus::parse("書き起こし済(既存利用)");
        assert_eq!(status, DocumentStatus::Other("書き起こし済(既存利用)".to_string()));
        assert_eq!(status.label(), "書き起こし済(既存利用)");
    }

    #[test]
    fn test_busy_detection() {
        assert!(DocumentStatus::Rasterizing.is_busy());
        assert!(DocumentStatus::Reprocessing(PipelineStep::Review).is_busy());
        assert!(DocumentStatus::NoMatchFound.is_busy());
        assert!(DocumentStatus::Failed(PipelineStep::Quality).is_busy());
        assert!(!DocumentStatus::Identified.is_busy());
        assert!(!DocumentStatus::Completed.is_busy());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(DocumentStatus::Completed.is_terminal());
        assert!(DocumentStatus::NeedsManualReview.is_terminal());
        assert!(!DocumentStatus::NoMatchFound.is_terminal());
        assert!(!DocumentStatus::Failed(PipelineStep::Review).is_terminal());
    }
}
