use serde::{Deserialize, Serialize};

/// 题库条目：大学/类别 × 试题种类
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamCatalogEntry {
    pub university: String,
    pub exam_type: String,
    /// 本地题目目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    /// 对象存储前缀（以 `/` 结尾）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_prefix: Option<String>,
}

impl ExamCatalogEntry {
    pub fn new(university: impl Into<String>, exam_type: impl Into<String>) -> Self {
        Self {
            university: university.into(),
            exam_type: exam_type.into(),
            local_path: None,
            storage_prefix: None,
        }
    }

    pub fn with_local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_prefix = Some(prefix.into());
        self
    }

    /// 是否有可读取的题目文件位置
    pub fn has_assets(&self) -> bool {
        self.local_path.is_some() || self.storage_prefix.is_some()
    }
}
