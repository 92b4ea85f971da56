use serde::{Deserialize, Serialize};

use crate::utils::normalize::subject_hint;

/// 科目枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// 数学Ⅰ・A
    #[serde(rename = "数学1")]
    Math1,
    /// 数学Ⅱ・B
    #[serde(rename = "数学2")]
    Math2,
    #[serde(rename = "英語")]
    English,
    #[serde(rename = "国語")]
    Japanese,
    #[serde(rename = "物理")]
    Physics,
    #[serde(rename = "化学")]
    Chemistry,
    #[serde(rename = "生物")]
    Biology,
}

impl Subject {
    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            Subject::Math1 => "数学1",
            Subject::Math2 => "数学2",
            Subject::English => "英語",
            Subject::Japanese => "国語",
            Subject::Physics => "物理",
            Subject::Chemistry => "化学",
            Subject::Biology => "生物",
        }
    }

    /// 题库中优先匹配的文理方向
    pub fn preferred_track(self) -> Option<&'static str> {
        match self {
            Subject::Math2 => Some("理系"),
            Subject::Math1 => Some("文系"),
            _ => None,
        }
    }

    /// 从任意文本解析科目（容忍 Ⅰ/Ⅱ、全角、空白）
    pub fn parse_label(text: &str) -> Option<Self> {
        if let Some(hint) = subject_hint(text) {
            return match hint.as_str() {
                "数学1" => Some(Subject::Math1),
                "数学2" => Some(Subject::Math2),
                _ => None,
            };
        }
        [
            Subject::English,
            Subject::Japanese,
            Subject::Physics,
            Subject::Chemistry,
            Subject::Biology,
        ]
        .into_iter()
        .find(|subject| text.contains(subject.name()))
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_math_variants() {
        assert_eq!(Subject::parse_label("数学ⅠA"), Some(Subject::Math1));
        assert_eq!(Subject::parse_label("数学 Ⅱ・B"), Some(Subject::Math2));
        assert_eq!(Subject::parse_label("数学２"), Some(Subject::Math2));
        assert_eq!(Subject::parse_label("英語リーディング"), Some(Subject::English));
        assert_eq!(Subject::parse_label("数学"), None);
    }

    #[test]
    fn test_preferred_track() {
        assert_eq!(Subject::Math2.preferred_track(), Some("理系"));
        assert_eq!(Subject::Math1.preferred_track(), Some("文系"));
        assert_eq!(Subject::English.preferred_track(), None);
    }
}
