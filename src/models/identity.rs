use serde::{Deserialize, Serialize};

use crate::models::subject::Subject;

/// 答案的身份信息
///
/// 各字段都可能缺失，部分识别结果同样有效。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    /// 四位年份
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exam_label: Option<String>,
}

impl DocumentIdentity {
    /// 大学、年份、科目是否都已识别
    pub fn is_complete(&self) -> bool {
        self.university.is_some() && self.year.is_some() && self.subject.is_some()
    }

    /// 是否一个字段都没有
    pub fn is_empty(&self) -> bool {
        self == &DocumentIdentity::default()
    }

    /// 用另一份结果补全缺失字段，已有字段保持不变
    pub fn fill_missing(&mut self, other: DocumentIdentity) {
        if self.university.is_none() {
            self.university = other.university;
        }
        if self.year.is_none() {
            self.year = other.year;
        }
        if self.subject.is_none() {
            self.subject = other.subject;
        }
        if self.question_number.is_none() {
            self.question_number = other.question_number;
        }
        if self.exam_category.is_none() {
            self.exam_category = other.exam_category;
        }
        if self.exam_label.is_none() {
            self.exam_label = other.exam_label;
        }
    }

    /// 年份后两位（按字符截取）
    pub fn year_short(&self) -> Option<&str> {
        let year = self.year.as_deref()?;
        year.char_indices().rev().nth(1).map(|(idx, _)| &year[idx..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_missing_keeps_existing() {
        let mut identity = DocumentIdentity {
            university: Some("東京大学".to_string()),
            ..Default::default()
        };
        identity.fill_missing(DocumentIdentity {
            university: Some("京都大学".to_string()),
            year: Some("2023".to_string()),
            subject: Some(Subject::Math2),
            ..Default::default()
        });
        assert_eq!(identity.university.as_deref(), Some("東京大学"));
        assert_eq!(identity.year_short(), Some("23"));
        assert!(identity.is_complete());
    }

    #[test]
    fn test_year_short_on_wide_digits() {
        let identity = DocumentIdentity {
            year: Some("20２３".to_string()),
            ..Default::default()
        };
        assert_eq!(identity.year_short(), Some("２３"));

        let short = DocumentIdentity {
            year: Some("3".to_string()),
            ..Default::default()
        };
        assert_eq!(short.year_short(), None);
    }
}
