//! 错误定义模块

use thiserror::Error;

/// Teledent系统统一错误类型
#[derive(Error, Debug)]
pub enum TeledentError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("认证错误: {0}")]
    Auth(String),

    #[error("权限错误: {0}")]
    Forbidden(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("推理服务错误: {0}")]
    Inference(String),

    #[error("报告生成错误: {0}")]
    Report(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// Teledent系统统一结果类型
pub type Result<T> = std::result::Result<T, TeledentError>;
