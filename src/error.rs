use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 存储相关错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 流程调度错误
    #[error("流程错误: {0}")]
    Pipeline(#[from] PipelineError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 存储相关错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 读取对象失败
    #[error("读取对象失败 ({key}): {source}")]
    ReadFailed {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入对象失败
    #[error("写入对象失败 ({key}): {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 删除对象失败
    #[error("删除对象失败 ({key}): {source}")]
    DeleteFailed {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 列举对象失败
    #[error("列举对象失败 (前缀: {prefix}): {source}")]
    ListFailed {
        prefix: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 对象存储返回错误响应
    #[error("对象存储返回错误响应 ({key}): status={status}")]
    BadResponse { key: String, status: u16 },
    /// 非法的对象键
    #[error("非法的对象键: {0}")]
    InvalidKey(String),
    /// JSON 解析失败
    #[error("JSON解析失败 ({key}): {source}")]
    JsonParseFailed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 流程调度错误
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 文档名为空
    #[error("文档名不能为空")]
    EmptyDocumentName,
    /// 同一文档已有处理在运行
    #[error("文档 {0} 正在处理中，拒绝重复运行")]
    AlreadyRunning(String),
    /// 未知步骤名
    #[error("未知步骤: {0}")]
    UnknownStep(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 配置值无效
    #[error("配置项 {name} 无效: {reason}")]
    InvalidValue { name: String, reason: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建对象读取错误
    pub fn storage_read_failed(
        key: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Storage(StorageError::ReadFailed {
            key: key.into(),
            source: Box::new(source),
        })
    }

    /// 创建对象写入错误
    pub fn storage_write_failed(
        key: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Storage(StorageError::WriteFailed {
            key: key.into(),
            source: Box::new(source),
        })
    }

    /// 创建对象删除错误
    pub fn storage_delete_failed(
        key: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Storage(StorageError::DeleteFailed {
            key: key.into(),
            source: Box::new(source),
        })
    }

    /// 创建对象列举错误
    pub fn storage_list_failed(
        prefix: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Storage(StorageError::ListFailed {
            prefix: prefix.into(),
            source: Box::new(source),
        })
    }

    /// 创建 JSON 解析错误
    pub fn json_parse_failed(key: impl Into<String>, source: serde_json::Error) -> Self {
        AppError::Storage(StorageError::JsonParseFailed {
            key: key.into(),
            source,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
