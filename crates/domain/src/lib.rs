//! 在线状态与消息系统核心领域模型
//!
//! 包含连接记录、在线消息两个核心实体，以及统一的基础实体约定
//! （租户分区、审计字段、软删除）和仓储接口定义。

pub mod entity;
pub mod errors;
pub mod fingerprint;
pub mod online_message;
pub mod online_user;
pub mod repositories;

// 重新导出常用类型
pub use entity::{BaseEntity, TenantContext};
pub use errors::{DomainError, DomainResult, RepositoryError};
pub use fingerprint::FingerprintHasher;
pub use online_message::{MessageKind, OnlineMessage, ReadStatus, Reader};
pub use online_user::{DeviceClass, OnlineStatus, OnlineUser};
pub use repositories::{
    MessageQuery, OnlineMessageRepository, OnlineUserRepository, PaginatedResult, Pagination,
    UserDirectory, UserRef,
};
