//! 质量判定服务 - 业务能力层
//!
//! 对答案第一页做可读性判定（OK / NG）。模型输出无法解析时按关键词兜底，默认 NG。

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::models::{QualityAssessment, QualityLabel};
use crate::services::llm_service::GenerativeModel;
use crate::utils::text::{parse_json_lenient, take_chars};

const QUALITY_PROMPT: &str = r#"あなたは答案画像の仕分け担当です。
この答案画像が自動採点に回せる品質かどうかを判定してください。
判定基準:
- 文字が判読できること（極端なかすれ・ぼやけがない）
- 答案の大部分が写っていること（大きな欠け・傾きがない）
- 手書きの解答が存在すること
次の JSON だけを返してください:
{"label": "OK" または "NG", "reason": "判定理由を一文で"}"#;

const REASON_PREVIEW_CHARS: usize = 120;

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    label: String,
    #[serde(default)]
    reason: String,
}

/// 质量判定服务
pub struct QualityService {
    model: Arc<dyn GenerativeModel>,
}

impl QualityService {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// 判定一页答案图片
    ///
    /// 模型调用失败返回错误；模型输出不规范时不报错，走兜底判定。
    pub async fn classify(&self, first_page: &[u8]) -> Result<QualityAssessment> {
        let raw = self
            .model
            .generate(QUALITY_PROMPT, None, &[first_page.to_vec()])
            .await
            .context("品質判定の呼び出しに失敗")?;
        debug!("质量判定原始输出: {}", raw);
        Ok(parse_verdict(&raw))
    }
}

/// 解析模型输出
pub fn parse_verdict(raw: &str) -> QualityAssessment {
    let assessment = match parse_json_lenient::<RawVerdict>(raw) {
        Ok(verdict) => match QualityLabel::parse(&verdict.label) {
            Some(label) => QualityAssessment {
                label,
                reason: verdict.reason.trim().to_string(),
            },
            None => keyword_fallback(raw),
        },
        Err(_) => keyword_fallback(raw),
    };

    if assessment.reason.is_empty() {
        return QualityAssessment {
            reason: format!("基準に基づく総合判定: {}", assessment.label.as_str()),
            ..assessment
        };
    }
    assessment
}

fn keyword_fallback(raw: &str) -> QualityAssessment {
    let upper = raw.to_uppercase();
    let label = if upper.contains("OK") && !upper.contains("NG") {
        QualityLabel::Ok
    } else {
        QualityLabel::Ng
    };
    QualityAssessment {
        label,
        reason: take_chars(raw.trim(), REASON_PREVIEW_CHARS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"label\": \"ok\", \"reason\": \"鮮明\"}\n```";
        let verdict = parse_verdict(raw);
        assert_eq!(verdict.label, QualityLabel::Ok);
        assert_eq!(verdict.reason, "鮮明");
    }

    #[test]
    fn test_unparsable_ng_text() {
        // 非 JSON 且包含 NG
        let verdict = parse_verdict("判定: NG (かすれが多い)");
        assert_eq!(verdict.label, QualityLabel::Ng);
        assert!(verdict.reason.contains("かすれ"));
    }

    #[test]
    fn test_unparsable_ok_text() {
        let verdict = parse_verdict("OK です");
        assert_eq!(verdict.label, QualityLabel::Ok);
    }

    #[test]
    fn test_ambiguous_text_defaults_to_ng() {
        assert_eq!(parse_verdict("OK だが一部 NG").label, QualityLabel::Ng);
        assert_eq!(parse_verdict("判断できません").label, QualityLabel::Ng);
    }

    #[test]
    fn test_invalid_label_uses_fallback_and_empty_reason_filled() {
        let verdict = parse_verdict(r#"{"label": "MAYBE", "reason": ""}"#);
        assert_eq!(verdict.label, QualityLabel::Ng);

        let verdict = parse_verdict(r#"{"label": "OK", "reason": ""}"#);
        assert_eq!(verdict.reason, "基準に基づく総合判定: OK");
    }
}
