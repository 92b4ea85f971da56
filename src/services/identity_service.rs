//! 身份抽取服务 - 业务能力层
//!
//! 从转写文本开头抽取大学、年份、科目、题号。
//!
//! ## 抽取顺序
//! 1. 特殊标记：命中后直接返回固定身份
//! 2. 规则抽取：表格行 → 各字段单独匹配
//! 3. 模型补全：规则结果不完整且允许调用模型时，补全缺失字段
//!
//! 模型失败时退回规则结果；规则和模型都没有结果时报错。

use std::sync::Arc;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::models::{DocumentIdentity, Subject};
use crate::services::llm_service::GenerativeModel;
use crate::utils::text::{parse_json_lenient, take_chars};

/// 命中即视为校内实力测试的标记文本
pub const SPECIAL_TRANSCRIPT_MARKER: &str = "【実力テスト】数学ⅠA実力テスト";
/// 特殊标记对应的大学（类别）
pub const SPECIAL_UNIVERSITY: &str = "実力テスト";
/// 特殊标记对应的试题种类
pub const SPECIAL_EXAM_TYPE: &str = "学力テスト・数学ⅠA";
/// 用于抽取的文本开头长度
pub const HEADER_CHARS: usize = 1200;

static TABLE_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(20[0-9]{2})年度・([^・\n]+大学)[^\n]*・([^・\n]*数学[12ⅠⅡI]{1})[^\n]*・第\s*([0-9０-９]+)\s*問")
        .expect("table row pattern")
});
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(20[0-9]{2})\s*年度").expect("year pattern"));
static YEAR_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(20[0-9]{2})").expect("year digits pattern"));
static UNIVERSITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([一-龥ぁ-んァ-ンA-Za-z]+大学)").expect("university pattern"));
static QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"第\s*([0-9０-９]+)\s*問").expect("question pattern"));

const EXTRACT_PROMPT: &str = r#"以下は答案の書き起こしの冒頭です。答案の識別情報を抽出してください。
次の JSON だけを返してください（不明な項目は空文字）:
{"university": "大学名", "year": "西暦4桁", "subject": "数学1 または 数学2 など", "question": "大問番号"}

書き起こし:
"#;

#[derive(Debug, Default, Deserialize)]
struct RawIdentity {
    #[serde(default)]
    university: Option<serde_json::Value>,
    #[serde(default)]
    year: Option<serde_json::Value>,
    #[serde(default)]
    subject: Option<serde_json::Value>,
    #[serde(default)]
    question: Option<serde_json::Value>,
}

fn value_text(value: Option<serde_json::Value>) -> Option<String> {
    let text = match value? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn parse_question_number(text: &str) -> Option<u32> {
    let ascii: String = text.nfkc().filter(|c| c.is_ascii_digit()).collect();
    ascii.parse().ok()
}

fn clean_university(raw: &str) -> String {
    raw.trim_start_matches("年度").trim_start_matches('年').trim().to_string()
}

/// 全角数字转半角，其余字符不变
fn fold_wide_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '０'..='９' => char::from(b'0' + (c as u32 - '０' as u32) as u8),
            _ => c,
        })
        .collect()
}

/// 规则抽取（不调用模型）
pub fn extract_rule_based(header: &str) -> DocumentIdentity {
    let folded = fold_wide_digits(header);
    let header = folded.as_str();
    if let Some(caps) = TABLE_ROW.captures(header) {
        return DocumentIdentity {
            year: Some(caps[1].to_string()),
            university: Some(clean_university(&caps[2])),
            subject: Subject::parse_label(&caps[3]),
            question_number: parse_question_number(&caps[4]),
            ..Default::default()
        };
    }

    let normalized: String = header.nfkc().collect();
    DocumentIdentity {
        year: YEAR.captures(header).map(|caps| caps[1].to_string()),
        university: UNIVERSITY
            .captures(header)
            .map(|caps| clean_university(&caps[1]))
            .filter(|u| u != "大学"),
        subject: Subject::parse_label(header),
        question_number: QUESTION
            .captures(&normalized)
            .and_then(|caps| parse_question_number(&caps[1])),
        ..Default::default()
    }
}

/// 命中特殊标记时的固定身份
pub fn special_identity(transcript: &str) -> Option<DocumentIdentity> {
    if !transcript.contains(SPECIAL_TRANSCRIPT_MARKER) {
        return None;
    }
    let header = take_chars(transcript, HEADER_CHARS);
    let rule = extract_rule_based(&header);
    Some(DocumentIdentity {
        university: Some(SPECIAL_UNIVERSITY.to_string()),
        year: rule.year,
        subject: Some(Subject::Math1),
        question_number: rule.question_number,
        exam_category: Some(SPECIAL_UNIVERSITY.to_string()),
        exam_label: Some(SPECIAL_EXAM_TYPE.to_string()),
    })
}

/// 解析模型返回的身份 JSON
pub fn parse_model_identity(raw: &str) -> Result<DocumentIdentity> {
    let parsed: RawIdentity = parse_json_lenient(raw).map_err(|e| anyhow!("識別結果の JSON 解析に失敗: {}", e))?;
    Ok(DocumentIdentity {
        university: value_text(parsed.university),
        year: value_text(parsed.year)
            .map(|y| fold_wide_digits(&y))
            .and_then(|y| YEAR_DIGITS.captures(&y).map(|caps| caps[1].to_string())),
        subject: value_text(parsed.subject).and_then(|s| Subject::parse_label(&s)),
        question_number: value_text(parsed.question).and_then(|q| parse_question_number(&q)),
        ..Default::default()
    })
}

/// 身份抽取服务
pub struct IdentityService {
    model: Arc<dyn GenerativeModel>,
    use_ai: bool,
}

impl IdentityService {
    pub fn new(model: Arc<dyn GenerativeModel>, use_ai: bool) -> Self {
        Self { model, use_ai }
    }

    /// 从转写全文抽取身份
    pub async fn extract(&self, transcript: &str) -> Result<DocumentIdentity> {
        if let Some(identity) = special_identity(transcript) {
            info!("✓ 检测到实力测试标记，使用固定身份");
            return Ok(identity);
        }

        let header = take_chars(transcript, HEADER_CHARS);
        let mut identity = extract_rule_based(&header);
        debug!("规则抽取结果: {:?}", identity);

        if identity.is_complete() || !self.use_ai {
            return finish(identity, None);
        }

        let prompt = format!("{}{}", EXTRACT_PROMPT, header);
        match self.model.generate(&prompt, None, &[]).await {
            Ok(raw) => match parse_model_identity(&raw) {
                Ok(from_model) => {
                    identity.fill_missing(from_model);
                    finish(identity, None)
                }
                Err(e) => {
                    warn!("⚠️ 模型抽取结果无法解析，使用规则结果: {}", e);
                    finish(identity, Some(e))
                }
            },
            Err(e) => {
                warn!("⚠️ 模型抽取失败，使用规则结果: {}", e);
                finish(identity, Some(e))
            }
        }
    }
}

fn finish(identity: DocumentIdentity, cause: Option<anyhow::Error>) -> Result<DocumentIdentity> {
    if !identity.is_empty() {
        return Ok(identity);
    }
    match cause {
        Some(e) => Err(e.context("識別情報を抽出できませんでした")),
        None => Err(anyhow!("識別情報を抽出できませんでした")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedModel(Result<String, String>);

    #[async_trait]
    impl GenerativeModel for FixedModel {
        async fn generate(&self, _: &str, _: Option<&str>, _: &[Vec<u8>]) -> Result<String> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    #[test]
    fn test_table_row_extraction() {
        let header = "| 2023年度・東京大学・前期・数学Ⅱ・第３問 |";
        let identity = extract_rule_based(header);
        assert_eq!(identity.year.as_deref(), Some("2023"));
        assert_eq!(identity.university.as_deref(), Some("東京大学"));
        assert_eq!(identity.subject, Some(Subject::Math2));
        assert_eq!(identity.question_number, Some(3));
    }

    #[test]
    fn test_wide_digit_year_is_folded() {
        let identity = extract_rule_based("20２３年度・東京大学・前期・数学Ⅱ・第1問");
        assert_eq!(identity.year.as_deref(), Some("2023"));
        assert_eq!(identity.university.as_deref(), Some("東京大学"));
        assert_eq!(identity.year_short(), Some("23"));

        let loose = extract_rule_based("２０２２年度　京都大学\n数学ⅠA 第１問");
        assert_eq!(loose.year.as_deref(), Some("2022"));
    }

    #[test]
    fn test_field_by_field_extraction() {
        let header = "# 2022年度 京都大学 入試対策\n数学 I A\n第 ２ 問 (1)";
        let identity = extract_rule_based(header);
        assert_eq!(identity.year.as_deref(), Some("2022"));
        assert_eq!(identity.university.as_deref(), Some("京都大学"));
        assert_eq!(identity.subject, Some(Subject::Math1));
        assert_eq!(identity.question_number, Some(2));
    }

    #[test]
    fn test_special_marker_overrides() {
        let transcript = "--- [ページ 1] ---\n\n【実力テスト】数学ⅠA実力テスト\n2024年度 第1問";
        let identity = special_identity(transcript).unwrap();
        assert_eq!(identity.university.as_deref(), Some(SPECIAL_UNIVERSITY));
        assert_eq!(identity.exam_label.as_deref(), Some(SPECIAL_EXAM_TYPE));
        assert_eq!(identity.year.as_deref(), Some("2024"));
    }

    #[test]
    fn test_parse_model_identity_validates_year() {
        let identity =
            parse_model_identity(r#"{"university": "大阪大学", "year": "令和5年(2023)", "subject": "数学Ⅱ", "question": 4}"#)
                .unwrap();
        assert_eq!(identity.year.as_deref(), Some("2023"));
        assert_eq!(identity.subject, Some(Subject::Math2));
        assert_eq!(identity.question_number, Some(4));

        let identity = parse_model_identity(r#"{"year": "unknown"}"#).unwrap();
        assert_eq!(identity.year, None);
    }

    #[tokio::test]
    async fn test_model_fills_missing_fields_only() {
        let model = FixedModel(Ok(r#"{"university": "名古屋大学", "year": "2021", "subject": "数学1"}"#.to_string()));
        let service = IdentityService::new(Arc::new(model), true);
        let identity = service.extract("2023年度 東北大学").await.unwrap();
        assert_eq!(identity.university.as_deref(), Some("東北大学"));
        assert_eq!(identity.year.as_deref(), Some("2023"));
        assert_eq!(identity.subject, Some(Subject::Math1));
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_partial() {
        let service = IdentityService::new(Arc::new(FixedModel(Err("timeout".to_string()))), true);
        let identity = service.extract("2023年度 答案").await.unwrap();
        assert_eq!(identity.year.as_deref(), Some("2023"));

        let err = service.extract("読めない答案").await.unwrap_err();
        assert!(err.to_string().contains("識別情報"));
    }

    #[tokio::test]
    async fn test_ai_disabled_uses_rules_only() {
        let model = FixedModel(Ok(r#"{"university": "名古屋大学"}"#.to_string()));
        let service = IdentityService::new(Arc::new(model), false);
        let identity = service.extract("2023年度 答案").await.unwrap();
        assert_eq!(identity.university, None);
    }
}
