use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 输入数据错误
    #[error("数据错误: {0}")]
    Data(#[from] DataError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 分析流程错误
    #[error("分析错误: {0}")]
    Analysis(#[from] AnalysisError),
    /// 任务队列错误
    #[error("任务队列错误: {0}")]
    Job(#[from] JobError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

impl AppError {
    /// 错误类别名称，写入任务的 `error_detail.error_type`
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "ConfigError",
            AppError::Data(_) => "DataError",
            AppError::Llm(_) => "LlmError",
            AppError::Analysis(AnalysisError::Cancelled) => "Cancelled",
            AppError::Analysis(_) => "AnalysisError",
            AppError::Job(_) => "JobError",
            AppError::Other(_) => "Other",
        }
    }

    /// 是否为协作式取消导致的错误
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Analysis(AnalysisError::Cancelled))
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
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
    /// 配置值不合法
    #[error("配置项 {field} 不合法: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 输入数据错误
#[derive(Debug, Error)]
pub enum DataError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    JsonParseFailed(#[from] serde_json::Error),
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容无法解析为分析结果
    #[error("无法解析LLM返回的分析结果: {reason}")]
    MalformedResponse { reason: String },
}

/// 分析流程错误
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// 运行被取消
    #[error("分析已被取消")]
    Cancelled,
}

/// 任务队列错误
#[derive(Debug, Error)]
pub enum JobError {
    /// 队列已关闭，不再接受新任务
    #[error("任务队列已关闭，无法提交新任务")]
    ShuttingDown,
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建LLM API调用错误
    pub fn llm_api_failed(model: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            message: message.to_string(),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Data(DataError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建配置值不合法错误
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Data(DataError::JsonParseFailed(err))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
