use serde::{Deserialize, Serialize};

/// 添削结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewDocument {
    #[serde(default)]
    pub summary: ReviewSummary,
    #[serde(default)]
    pub questions: Vec<ReviewQuestion>,
}

impl ReviewDocument {
    /// 生成失败时的降级结果
    pub fn degraded(reason: impl std::fmt::Display) -> Self {
        Self {
            summary: ReviewSummary {
                total_score: 0.0,
                max_score: 0.0,
                notes: format!("生成に失敗しました: {}", reason),
            },
            questions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    #[serde(default)]
    pub total_score: f64,
    #[serde(default)]
    pub max_score: f64,
    #[serde(default)]
    pub notes: String,
}

/// 单题添削
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewQuestion {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub awarded: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default)]
    pub comments: Vec<ReviewComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    #[serde(rename = "type")]
    pub kind: CommentKind,
    pub text: String,
    #[serde(default)]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
}

/// 评语类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommentKind {
    Score,
    Praise,
    Mistake,
    Guidance,
}

impl From<String> for CommentKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "score" => CommentKind::Score,
            "praise" => CommentKind::Praise,
            "mistake" => CommentKind::Mistake,
            // 未知类型按指导处理
            _ => CommentKind::Guidance,
        }
    }
}

impl From<CommentKind> for String {
    fn from(value: CommentKind) -> Self {
        match value {
            CommentKind::Score => "score",
            CommentKind::Praise => "praise",
            CommentKind::Mistake => "mistake",
            CommentKind::Guidance => "guidance",
        }
        .to_string()
    }
}

// 题号可能是字符串也可能是整数
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Visitor;
    use std::fmt;

    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer representing a question id")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}
