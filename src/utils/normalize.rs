//! 标签归一化
//!
//! 题库目录名和答案中抽取的文本都经过同一套归一化后再比较：
//! NFKC → 去除分隔符 → 罗马数字转阿拉伯数字 → 同义词替换 → 小写。

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use phf::phf_map;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// 同义词替换表
static LABEL_SYNONYMS: phf::Map<&'static str, &'static str> = phf_map! {
    "学力テスト" => "実力テスト",
};

static TOKEN_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[・/／,，、\s　\-]+").expect("token split pattern"));

static SUBJECT_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"数学\s*([12])").expect("subject hint pattern"));

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '-' | '_' | '/' | '・' | '【' | '】' | '[' | ']' | '（' | '）' | '(' | ')' | '‐' | '–' | '—'
        )
}

fn roman_value(run: &str) -> Option<&'static str> {
    match run {
        "I" => Some("1"),
        "II" => Some("2"),
        "III" => Some("3"),
        "IV" => Some("4"),
        "V" => Some("5"),
        _ => None,
    }
}

/// 把独立的罗马数字（可带 A/B/C 后缀）替换为阿拉伯数字
///
/// `数学IA` → `数学1A`，`数学IIB` → `数学2B`；英文单词内部的 I/V 不动。
pub fn replace_roman_numerals(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '|' || c == '｜' {
            out.push('1');
            i += 1;
            continue;
        }

        let prev_is_latin = i > 0 && chars[i - 1].is_ascii_alphabetic();
        if !prev_is_latin && matches!(c, 'I' | 'V') {
            let start = i;
            let mut end = i;
            while end < chars.len() && matches!(chars[end], 'I' | 'V') {
                end += 1;
            }
            let next = chars.get(end).copied();
            let after_next = chars.get(end + 1).copied();
            let standalone = match next {
                None => true,
                Some(n) if !n.is_ascii_alphabetic() => true,
                Some('A' | 'B' | 'C') => !after_next.is_some_and(|a| a.is_ascii_alphabetic()),
                _ => false,
            };
            let run: String = chars[start..end].iter().collect();
            match roman_value(&run).filter(|_| standalone) {
                Some(value) => out.push_str(value),
                None => out.push_str(&run),
            }
            i = end;
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}

/// 归一化标签
pub fn normalize_label(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let nfkc: String = text.nfkc().collect();
    let stripped: String = nfkc.chars().filter(|c| !is_separator(*c)).collect();
    let mut norm = replace_roman_numerals(&stripped);
    for (from, to) in LABEL_SYNONYMS.entries() {
        norm = norm.replace(from, to);
    }
    norm.to_lowercase()
}

/// 把试题种类拆成归一化 token 集合
pub fn tokenize_exam_type(exam_type: &str) -> BTreeSet<String> {
    TOKEN_SPLIT
        .split(exam_type)
        .filter(|raw| !raw.trim().is_empty())
        .map(normalize_label)
        .filter(|token| !token.is_empty())
        .collect()
}

/// 从科目文本中提取 `数学1` / `数学2`
pub fn subject_hint(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        return None;
    }
    let nfkc: String = text.nfkc().collect();
    let mapped = replace_roman_numerals(&nfkc);
    SUBJECT_HINT
        .captures(&mapped)
        .map(|caps| format!("数学{}", &caps[1]))
}

/// 归一化编辑距离相似度，取值 [0, 1]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b)
}
