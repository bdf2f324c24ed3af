//! 领域模型错误定义
//!
//! 定义了在线状态与消息子系统的错误分类，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 资源不存在错误
    #[error("资源不存在: {resource} {id}")]
    NotFound { resource: String, id: String },

    /// 冲突错误（例如重复的连接ID注册）
    #[error("资源冲突: {message}")]
    Conflict { message: String },

    /// 验证错误
    #[error("验证失败: {field}: {message}")]
    Validation { field: String, message: String },

    /// 身份缺失或无效（由上游认证协作方产生，这里仅透出）
    #[error("未授权: {message}")]
    Unauthorized { message: String },
}

impl DomainError {
    /// 创建资源不存在错误
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// 创建冲突错误
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// 创建验证错误
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建未授权错误
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("资源不存在")]
    NotFound,
    #[error("资源冲突")]
    Conflict,
    #[error("存储错误: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    /// 创建存储错误
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
