//! 题库选择线索
//!
//! 由身份信息和转写文本构造，只在识别步骤内部使用，不持久化。

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::DocumentIdentity;
use crate::utils::normalize::{normalize_label, subject_hint};
use crate::utils::text::take_chars;

/// 类别关键词
pub const CATEGORY_KEYWORDS: [&str; 9] = [
    "実力テスト",
    "学力テスト",
    "模擬試験",
    "模試",
    "定期テスト",
    "中間テスト",
    "期末テスト",
    "共通テスト",
    "入試",
];

/// 科目关键词
pub const SUBJECT_KEYWORDS: [&str; 17] = [
    "数学", "英語", "国語", "理科", "社会", "物理", "化学", "生物", "地理", "日本史", "世界史",
    "現代文", "古文", "漢文", "倫理", "政治", "経済",
];

const HINT_SCAN_LINES: usize = 20;
const TRANSCRIPT_HINT_CHARS: usize = 800;

static CATEGORY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![Regex::new(r"カテ(?:ゴリ)?ー?[：:]\s*(?P<value>.+)").expect("category pattern")]
});

static EXAM_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"試験(?:種|名)?[：:]\s*(?P<value>.+)").expect("exam pattern"),
        Regex::new(r"科目[：:]\s*(?P<value>.+)").expect("subject pattern"),
    ]
});

/// 从转写文本中找到的类别/试题线索
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExamHints {
    pub category: Option<String>,
    pub exam_label: Option<String>,
    /// 原始线索文本（未归一化）
    pub tokens: BTreeSet<String>,
}

/// 匹配器使用的线索
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionHints {
    pub university: Option<String>,
    pub year_short: Option<String>,
    /// 理系 / 文系
    pub preferred_track: Option<String>,
    pub subject_norm: String,
    pub subject_hint_norm: String,
    pub exam_hint_norm: String,
    pub category_norm: String,
    pub exam_norm: String,
    pub combined_norm: String,
    pub transcript_norm: String,
    pub hint_tokens: BTreeSet<String>,
    /// 去重后的候选文本，顺序固定
    pub hint_text_norms: Vec<String>,
}

fn looks_like_subject(text: &str) -> bool {
    SUBJECT_KEYWORDS.iter().any(|kw| text.contains(kw))
}

const EDGE_CHARS: &[char] = &[' ', '・', ':', '：', '-', '‐', '–', '—'];

/// 一行中同时出现类别关键词和科目时，返回 (类别, 科目标签)
fn category_exam_from_line(line: &str) -> Option<(String, String)> {
    for keyword in CATEGORY_KEYWORDS {
        let Some((before, after)) = line.split_once(keyword) else {
            continue;
        };
        let mut candidate = before.trim_matches(EDGE_CHARS);
        if candidate.is_empty() {
            candidate = after.trim_matches(EDGE_CHARS);
        }
        if !candidate.is_empty() && looks_like_subject(candidate) {
            return Some((keyword.to_string(), candidate.to_string()));
        }
    }
    None
}

fn first_capture(patterns: &[Regex], line: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(line)
            .map(|caps| caps["value"].trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// 扫描转写文本前 20 个非空行
pub fn extract_exam_hints(identity: &DocumentIdentity, transcript: &str) -> ExamHints {
    let mut category = identity.exam_category.clone();
    let mut exam_label = identity.exam_label.clone();
    let mut tokens: BTreeSet<String> = BTreeSet::new();

    let add_token = |token: Option<&str>, tokens: &mut BTreeSet<String>| {
        if let Some(t) = token.map(str::trim).filter(|t| !t.is_empty()) {
            tokens.insert(t.to_string());
        }
    };
    add_token(category.as_deref(), &mut tokens);
    add_token(exam_label.as_deref(), &mut tokens);
    add_token(identity.subject.map(|s| s.name()), &mut tokens);

    let lines = transcript
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(HINT_SCAN_LINES);

    for line in lines {
        if category.is_none() {
            if let Some(value) = first_capture(&CATEGORY_PATTERNS, line) {
                add_token(Some(value.as_str()), &mut tokens);
                category = Some(value);
            }
        }
        if exam_label.is_none() {
            if let Some(value) = first_capture(&EXAM_PATTERNS, line) {
                add_token(Some(value.as_str()), &mut tokens);
                exam_label = Some(value);
            }
        }
        if category.is_none() || exam_label.is_none() {
            if let Some((cat, exam)) = category_exam_from_line(line) {
                if category.is_none() {
                    add_token(Some(cat.as_str()), &mut tokens);
                    category = Some(cat);
                }
                if exam_label.is_none() {
                    add_token(Some(exam.as_str()), &mut tokens);
                    exam_label = Some(exam);
                }
            }
        }
    }

    ExamHints {
        category,
        exam_label,
        tokens,
    }
}

impl SelectionHints {
    /// 由身份信息和转写文本构造
    pub fn build(identity: &DocumentIdentity, transcript: &str) -> Self {
        let header = take_chars(transcript, crate::services::identity_service::HEADER_CHARS);
        let exam_hints = extract_exam_hints(identity, transcript);

        // 试题线索：身份中的标签 → 开头第一行
        let exam_hint_raw = identity
            .exam_label
            .clone()
            .or_else(|| {
                header
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(str::to_string)
            });
        let exam_hint_norm = exam_hint_raw.as_deref().map(normalize_label).unwrap_or_default();

        let subject_norm = identity.subject.map(|s| normalize_label(s.name())).unwrap_or_default();
        let subject_hint_norm = identity
            .subject
            .and_then(|s| subject_hint(s.name()))
            .map(|h| normalize_label(&h))
            .unwrap_or_default();

        let category_norm = exam_hints.category.as_deref().map(normalize_label).unwrap_or_default();
        let exam_norm = exam_hints.exam_label.as_deref().map(normalize_label).unwrap_or_default();
        let combined_norm = if exam_hints.category.is_some() || exam_hints.exam_label.is_some() {
            normalize_label(&format!(
                "{}{}",
                exam_hints.category.as_deref().unwrap_or_default(),
                exam_hints.exam_label.as_deref().unwrap_or_default()
            ))
        } else {
            String::new()
        };

        let mut hint_tokens: BTreeSet<String> = exam_hints
            .tokens
            .iter()
            .map(|t| normalize_label(t))
            .filter(|t| !t.is_empty())
            .collect();
        for extra in [&subject_norm, &subject_hint_norm, &exam_hint_norm] {
            if !extra.is_empty() {
                hint_tokens.insert(extra.clone());
            }
        }

        let mut hint_text_norms: Vec<String> = Vec::new();
        for candidate in [
            &exam_hint_norm,
            &combined_norm,
            &category_norm,
            &exam_norm,
            &subject_norm,
            &subject_hint_norm,
        ] {
            if !candidate.is_empty() && !hint_text_norms.contains(candidate) {
                hint_text_norms.push(candidate.clone());
            }
        }

        Self {
            university: identity.university.clone().filter(|u| !u.trim().is_empty()),
            year_short: identity.year_short().map(str::to_string),
            preferred_track: identity
                .subject
                .and_then(|s| s.preferred_track())
                .map(str::to_string),
            subject_norm,
            subject_hint_norm,
            exam_hint_norm,
            category_norm,
            exam_norm,
            combined_norm,
            transcript_norm: normalize_label(&take_chars(transcript, TRANSCRIPT_HINT_CHARS)),
            hint_tokens,
            hint_text_norms,
        }
    }
}
