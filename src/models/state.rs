//! 处理状态记录
//!
//! 每个答案对应一条 JSON 状态记录，按键浅合并更新，从不整体替换。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::catalog::ExamCatalogEntry;
use crate::models::identity::DocumentIdentity;
use crate::models::quality::QualityAssessment;
use crate::models::status::DocumentStatus;

/// 流水线步骤
///
/// 变体声明顺序即规范执行顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStep {
    /// 栅格化
    Png,
    /// 质量判定
    Quality,
    /// 转写
    Transcribe,
    /// 识别题库
    Identify,
    /// 生成添削
    Review,
}

impl PipelineStep {
    /// 规范顺序的全部步骤
    pub const ALL: [PipelineStep; 5] = [
        PipelineStep::Png,
        PipelineStep::Quality,
        PipelineStep::Transcribe,
        PipelineStep::Identify,
        PipelineStep::Review,
    ];

    /// 步骤名（状态字符串中使用）
    pub fn name(self) -> &'static str {
        match self {
            PipelineStep::Png => "png",
            PipelineStep::Quality => "quality",
            PipelineStep::Transcribe => "transcribe",
            PipelineStep::Identify => "identify",
            PipelineStep::Review => "review",
        }
    }

    /// 按规范顺序整理请求的步骤（去重）
    pub fn canonical_subset(requested: &[PipelineStep]) -> Vec<PipelineStep> {
        Self::ALL
            .iter()
            .copied()
            .filter(|step| requested.contains(step))
            .collect()
    }

    /// 解析逗号分隔的步骤列表
    pub fn parse_list(text: &str) -> Result<Vec<PipelineStep>, PipelineError> {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PipelineStep {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.name() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| PipelineError::UnknownStep(s.to_string()))
    }
}

/// 单个步骤的开始/结束时间（ISO 8601，精确到秒）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTiming {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// 当前时间戳
pub fn timestamp_now() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

/// 持久化的处理状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingState {
    pub status: Option<DocumentStatus>,
    pub last_step: Option<PipelineStep>,
    pub last_error: Option<String>,
    pub timeline: BTreeMap<PipelineStep, StepTiming>,
    pub quality: Option<QualityAssessment>,
    pub details: Option<DocumentIdentity>,
    pub problem_set: Option<ExamCatalogEntry>,
    pub exam_type: Option<String>,
    pub review_ref: Option<String>,
    pub updated_at: Option<String>,
}

/// 状态的部分更新
///
/// 外层 `None` 表示不修改该键；`Some(None)` 表示写入 null。
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_step: Option<Option<PipelineStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<BTreeMap<PipelineStep, StepTiming>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<DocumentIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_set: Option<Option<ExamCatalogEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_type: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_ref: Option<String>,
}

impl StatePatch {
    /// 只更新状态
    pub fn status(status: DocumentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_timeline(mut self, timeline: BTreeMap<PipelineStep, StepTiming>) -> Self {
        self.timeline = Some(timeline);
        self
    }

    pub fn with_last_step(mut self, step: Option<PipelineStep>) -> Self {
        self.last_step = Some(step);
        self
    }

    pub fn with_last_error(mut self, error: Option<String>) -> Self {
        self.last_error = Some(error);
        self
    }

    /// 写入（或清空）已解析的题目集及其试题种类
    pub fn with_problem_set(mut self, entry: Option<ExamCatalogEntry>) -> Self {
        self.exam_type = Some(entry.as_ref().map(|e| e.exam_type.clone()));
        self.problem_set = Some(entry);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_subset_ignores_input_order() {
        let steps = PipelineStep::canonical_subset(&[
            PipelineStep::Review,
            PipelineStep::Png,
            PipelineStep::Identify,
            PipelineStep::Png,
        ]);
        assert_eq!(
            steps,
            vec![PipelineStep::Png, PipelineStep::Identify, PipelineStep::Review]
        );
    }

    #[test]
    fn test_parse_step_list() {
        let steps = PipelineStep::parse_list("review, Quality").unwrap();
        assert_eq!(steps, vec![PipelineStep::Review, PipelineStep::Quality]);
        assert!(matches!(
            PipelineStep::parse_list("png,ocr"),
            Err(PipelineError::UnknownStep(name)) if name == "ocr"
        ));
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        // Some(None) 写入 null，None 不出现
        let patch = StatePatch::status(DocumentStatus::Rasterizing).with_last_error(None);
        let value = serde_json::to_value(&patch).unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.get("status").unwrap(), "処理中(PNG変換)");
        assert!(map.get("last_error").unwrap().is_null());
        assert!(!map.contains_key("last_step"));
    }

    #[test]
    fn test_cleared_problem_set_serializes_null() {
        let patch = StatePatch::status(DocumentStatus::NoMatchFound).with_problem_set(None);
        let value = serde_json::to_value(&patch).unwrap();
        assert!(value["problem_set"].is_null());
        assert!(value["exam_type"].is_null());
        assert!(value.as_object().unwrap().contains_key("problem_set"));
    }

    #[test]
    fn test_state_reads_timeline_keys() {
        let state: ProcessingState = serde_json::from_str(
            r#"{"status":"特定済","timeline":{"png":{"start":"2024-01-01T10:00:00","end":"2024-01-01T10:00:05"}}}"#,
        )
        .unwrap();
        assert_eq!(state.status, Some(DocumentStatus::Identified));
        assert!(state.timeline[&PipelineStep::Png].end.is_some());
    }
}
