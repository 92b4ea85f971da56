//! 模型输出文本处理
//!
//! 模型返回的 JSON 经常被包在 ```json 代码块里，或者带有非法的反斜杠转义。

use serde::de::DeserializeOwned;

/// 按字符截取前 `max_chars` 个字符
pub fn take_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// 提取 ``` 代码块内容（优先 ```json）
pub fn strip_code_fence(text: &str) -> Option<&str> {
    let (start, open_len) = match text.find("```json") {
        Some(pos) => (pos, "```json".len()),
        None => (text.find("```")?, 3),
    };
    let body = &text[start + open_len..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// 第一个 `{` 到最后一个 `}` 之间的文本
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// 把非法的反斜杠转义改成字面反斜杠
///
/// 合法转义：`\\ \/ \" \b \f \n \r \t \u`
pub fn repair_invalid_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('\\' | '/' | '"' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => out.push_str("\\\\"),
        }
    }

    out
}

/// 宽松解析模型返回的 JSON
///
/// 依次尝试代码块、原文、第一个对象，每个候选都先原样解析、再修复转义后解析。
pub fn parse_json_lenient<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let mut candidates: Vec<&str> = Vec::new();
    if let Some(fenced) = strip_code_fence(raw) {
        candidates.push(fenced);
    }
    candidates.push(raw.trim());
    if let Some(object) = first_json_object(raw) {
        candidates.push(object);
    }

    let mut last_error = None;
    for candidate in candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
        match serde_json::from_str::<T>(&repair_invalid_escapes(candidate)) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => serde_json::from_str::<T>(raw),
    }
}
