use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 任务准备阶段错误（缺列、数据集不可读）
    #[error("准备错误: {0}")]
    Setup(#[from] SetupError),
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 任务控制错误
    #[error("任务错误: {0}")]
    Job(#[from] JobError),
}

/// 任务准备阶段错误
///
/// 出现即意味着任务进入 error 状态，不做任何重试
#[derive(Debug, Error)]
pub enum SetupError {
    /// 数据集缺少必需的列
    #[error("文件格式错误：缺少\"{column}\"列")]
    MissingColumn { column: String },
    /// 数据集无法解析
    #[error("数据集无法解析 ({path}): {reason}")]
    UnreadableDataset { path: String, reason: String },
}

/// API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败（连接失败、连接被重置等）
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// 请求超时
    #[error("API请求超时 ({endpoint})")]
    Timeout { endpoint: String },
    /// API 返回错误状态码
    #[error("API返回错误响应 ({endpoint}): status={status}, body={body}")]
    BadStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// 请求频率限制
    #[error("API请求频率限制 ({endpoint}), 建议等待: {retry_after:?}秒")]
    RateLimited {
        endpoint: String,
        retry_after: Option<u64>,
    },
    /// 响应体解析失败
    #[error("JSON解析失败: {0}")]
    JsonParseFailed(String),
    /// 请求构建失败
    #[error("请求构建失败: {0}")]
    BuildFailed(String),
}

impl ApiError {
    /// 是否属于可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RequestFailed { .. }
            | ApiError::Timeout { .. }
            | ApiError::RateLimited { .. }
            | ApiError::JsonParseFailed(_) => true,
            ApiError::BadStatus { status, .. } => *status >= 500,
            ApiError::BuildFailed(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout { .. })
    }
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// JSON 序列化/反序列化失败
    #[error("JSON处理失败 ({path}): {source}")]
    JsonFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
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
    /// 配置值非法
    #[error("配置项 {field} 非法: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 任务控制错误
#[derive(Debug, Error)]
pub enum JobError {
    /// 会话对应的任务不存在
    #[error("任务不存在")]
    NotFound,
    /// 当前状态不允许该操作
    #[error("当前状态 {status} 不允许执行 {action}")]
    InvalidTransition { status: String, action: String },
    /// 尚未上传数据集
    #[error("请先上传文件")]
    DatasetMissing,
    /// API 密钥为空
    #[error("API密钥不能为空")]
    EmptyApiKey,
    /// 任务正在进行或已完成，需要先结束
    #[error("请先结束当前任务")]
    Busy,
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建 JSON 处理错误
    pub fn json_failed(path: impl Into<String>, source: serde_json::Error) -> Self {
        AppError::File(FileError::JsonFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建非法状态转换错误
    pub fn invalid_transition(status: impl ToString, action: impl Into<String>) -> Self {
        AppError::Job(JobError::InvalidTransition {
            status: status.to_string(),
            action: action.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
