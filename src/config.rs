use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{AppResult, ConfigError};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "auto_correction.toml";

/// 程序配置文件
///
/// 加载顺序：默认值 → TOML 文件（可选）→ 环境变量
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时处理的答案数量
    pub max_concurrent_documents: usize,
    /// 本地存储根目录（未配置 bucket 时使用）
    pub data_dir: String,
    /// 本地题库目录
    pub problem_dir: String,
    /// 输出日志文件
    pub output_log_file: String,
    // --- 对象存储配置 ---
    pub storage_bucket: Option<String>,
    pub storage_endpoint: String,
    pub storage_token: Option<String>,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 处理配置 ---
    /// 转写时使用占位文本，不调用模型
    pub transcribe_dummy: bool,
    /// 规则抽取不完整时是否调用模型补全
    pub extract_use_ai: bool,
    /// 栅格化缩放倍率
    pub render_scale: f32,
    /// 单个 md/txt 题目文件的最大字符数
    pub problem_text_limit: usize,
    /// 单个 PDF 题目文件的最大字符数
    pub pdf_text_limit: usize,
    /// 送入添削的最大题目文件数
    pub max_problem_files: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_documents: 3,
            data_dir: "data".to_string(),
            problem_dir: "problems".to_string(),
            output_log_file: "output.txt".to_string(),
            storage_bucket: None,
            storage_endpoint: "https://storage.googleapis.com".to_string(),
            storage_token: None,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_temperature: 0.3,
            llm_max_tokens: 8192,
            transcribe_dummy: false,
            extract_use_ai: true,
            render_scale: 2.0,
            problem_text_limit: 6000,
            pdf_text_limit: 12000,
            max_problem_files: 6,
        }
    }
}

impl Config {
    /// 只从环境变量加载（未设置的项使用默认值）
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载
    pub fn from_toml_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(config)
    }

    /// 加载完整配置
    ///
    /// `AUTO_CORRECTION_CONFIG` 指定的文件或当前目录下的 `auto_correction.toml`
    /// 存在时先读取文件，再由环境变量覆盖。
    pub fn load() -> AppResult<Self> {
        let explicit = std::env::var("AUTO_CORRECTION_CONFIG").ok();
        let path = explicit.clone().unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let base = if explicit.is_some() || Path::new(&path).exists() {
            debug!("读取配置文件: {}", path);
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };

        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> AppResult<()> {
        if self.max_concurrent_documents == 0 {
            return Err(ConfigError::InvalidValue {
                name: "max_concurrent_documents".to_string(),
                reason: "必须大于 0".to_string(),
            }
            .into());
        }
        if self.render_scale <= 0.0 {
            return Err(ConfigError::InvalidValue {
                name: "render_scale".to_string(),
                reason: "必须大于 0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn with_env_overrides(self) -> Self {
        let default = self;
        Self {
            max_concurrent_documents: std::env::var("MAX_CONCURRENT_DOCUMENTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_documents),
            data_dir: std::env::var("DATA_DIR").unwrap_or(default.data_dir),
            problem_dir: std::env::var("PROBLEM_DIR").unwrap_or(default.problem_dir),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            storage_bucket: std::env::var("STORAGE_BUCKET").ok().filter(|v| !v.is_empty()).or(default.storage_bucket),
            storage_endpoint: std::env::var("STORAGE_ENDPOINT").unwrap_or(default.storage_endpoint),
            storage_token: std::env::var("STORAGE_TOKEN").ok().filter(|v| !v.is_empty()).or(default.storage_token),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_temperature: std::env::var("LLM_TEMPERATURE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_temperature),
            llm_max_tokens: std::env::var("LLM_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_max_tokens),
            transcribe_dummy: std::env::var("TRANSCRIBE_MODE").ok().map(|v| v.trim().eq_ignore_ascii_case("dummy")).unwrap_or(default.transcribe_dummy),
            extract_use_ai: std::env::var("EXTRACT_USE_AI").ok().and_then(|v| parse_flag(&v)).unwrap_or(default.extract_use_ai),
            render_scale: std::env::var("PNG_SCALE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.render_scale),
            problem_text_limit: std::env::var("PROBLEM_TEXT_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.problem_text_limit),
            pdf_text_limit: std::env::var("PDF_TEXT_LIMIT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.pdf_text_limit),
            max_problem_files: std::env::var("MAX_PROBLEM_FILES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_problem_files),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_toml_partial_uses_defaults() {
        // 未写出的字段回落到默认值
        let config: Config = toml::from_str(
            r#"
            max_concurrent_documents = 5
            storage_bucket = "answers"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_documents, 5);
        assert_eq!(config.storage_bucket.as_deref(), Some("answers"));
        assert_eq!(config.max_problem_files, 6);
        assert!(config.extract_use_ai);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = Config {
            max_concurrent_documents: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
