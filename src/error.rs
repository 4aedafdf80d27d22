use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// 应用程序错误类型
///
/// 只覆盖进程级失败（配置、文件、输入解析）。单个条目的失败
/// 由 [`PipelineError`] 表达，永远不会中断整个批次。
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 文件操作错误
    #[error("文件错误 ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// 输入文件解析失败
    #[error("输入解析失败 ({path}): {message}")]
    InputParse { path: String, message: String },

    /// JSON 序列化失败
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// 创建文件错误
    pub fn file(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File {
            path: path.into(),
            source,
        }
    }

    /// 创建输入解析错误
    pub fn input_parse(path: impl Into<String>, message: impl ToString) -> Self {
        AppError::InputParse {
            path: path.into(),
            message: message.to_string(),
        }
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

    /// 缺少 API 密钥
    #[error("未设置 API 密钥，请设置环境变量 {var_name}")]
    MissingApiKey { var_name: String },

    /// 必需文件不存在
    #[error("文件不存在: {path}")]
    FileNotFound { path: String },

    /// 参数取值非法
    #[error("配置项 {name} 取值非法: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// 远程调用的传输层错误
///
/// 每个变体都携带自己的可重试分类，重试层据此决定退避还是立即失败。
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// 请求频率限制（429）
    #[error("请求频率限制: {message}")]
    RateLimited { message: String },

    /// 服务端暂时不可用（500 / 502 / 503 / 529）
    #[error("服务端暂时不可用 (状态码 {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// 单次调用超时
    #[error("请求超时 ({0:?})")]
    Timeout(Duration),

    /// 不可重试的错误
    #[error("请求失败 (状态码 {status:?}): {message}")]
    Fatal { status: Option<u16>, message: String },
}

/// 可重试的服务端状态码
pub const RETRYABLE_STATUS_CODES: [u16; 4] = [500, 502, 503, 529];

impl TransportError {
    /// 根据 HTTP 状态码分类
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 {
            TransportError::RateLimited { message }
        } else if RETRYABLE_STATUS_CODES.contains(&status) {
            TransportError::Unavailable { status, message }
        } else {
            TransportError::Fatal {
                status: Some(status),
                message,
            }
        }
    }

    /// 不带状态码的致命错误
    pub fn fatal(message: impl Into<String>) -> Self {
        TransportError::Fatal {
            status: None,
            message: message.into(),
        }
    }

    /// 是否允许传输层重试
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Fatal { .. })
    }
}

/// 单个条目的处理错误
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// 暂时性错误，重试次数耗尽
    #[error("暂时性传输错误，已尝试 {attempts} 次: {source}")]
    TransientTransport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// 不可重试的传输错误
    #[error("致命传输错误: {0}")]
    FatalTransport(#[source] TransportError),

    /// 所有提取策略均失败
    #[error("无法从响应中提取 JSON")]
    ExtractionFailed,

    /// 解析成功但结构不合规
    #[error("响应校验失败: {}", .violations.join("; "))]
    ValidationFailed { violations: Vec<String> },

    /// 修复调用仍未得到合规结果
    #[error("修复重试失败: {reason}")]
    RepairExhausted { reason: String },
}

impl PipelineError {
    /// 对应的失败类别（写入结果文件）
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::TransientTransport { .. } => FailureKind::TransientTransport,
            PipelineError::FatalTransport(_) => FailureKind::FatalTransport,
            PipelineError::ExtractionFailed => FailureKind::ExtractionFailed,
            PipelineError::ValidationFailed { .. } => FailureKind::ValidationFailed,
            PipelineError::RepairExhausted { .. } => FailureKind::RepairExhausted,
        }
    }
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransientTransport,
    FatalTransport,
    ExtractionFailed,
    ValidationFailed,
    RepairExhausted,
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
