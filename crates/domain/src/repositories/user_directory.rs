//! 用户目录查询接口
//!
//! 用户实体的 CRUD 由外部模块负责，这里只需要一个只读查询端口，
//! 用于校验消息接收者并补全显示名称。

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::RepositoryError;

/// 用户引用信息
#[derive(Debug, Clone, PartialEq)]
pub struct UserRef {
    pub user_id: Uuid,
    pub user_name: String,
    pub avatar: Option<String>,
}

/// 用户目录只读端口
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 按ID查找用户引用，不存在时返回 None
    async fn find_ref(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<UserRef>, RepositoryError>;
}
