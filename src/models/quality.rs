use serde::{Deserialize, Serialize};

/// 质量判定标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityLabel {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NG")]
    Ng,
}

impl QualityLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityLabel::Ok => "OK",
            QualityLabel::Ng => "NG",
        }
    }

    /// 严格解析（忽略大小写和空白）
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_uppercase().as_str() {
            "OK" => Some(QualityLabel::Ok),
            "NG" => Some(QualityLabel::Ng),
            _ => None,
        }
    }
}

/// 答案图片质量判定结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub label: QualityLabel,
    #[serde(default)]
    pub reason: String,
}

impl QualityAssessment {
    pub fn is_ok(&self) -> bool {
        self.label == QualityLabel::Ok
    }
}
