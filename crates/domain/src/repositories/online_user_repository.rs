//! 在线用户连接记录仓储接口

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::online_user::OnlineUser;
use crate::repositories::{PaginatedResult, Pagination};

/// 连接记录仓储接口
///
/// 所有变更操作都直写存储，不存在独立于存储的权威内存缓存；
/// 进程重启只丢失打开的套接字，不丢失注册表完整性。
#[async_trait]
pub trait OnlineUserRepository: Send + Sync {
    /// 插入新的连接记录
    async fn insert(&self, record: &OnlineUser) -> Result<OnlineUser, RepositoryError>;

    /// 按连接ID查找活跃记录
    async fn find_active_by_connection(
        &self,
        tenant_id: Uuid,
        connection_id: &str,
    ) -> Result<Option<OnlineUser>, RepositoryError>;

    /// 查找某用户的全部活跃记录（多端登录会返回多条）
    async fn find_active_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<OnlineUser>, RepositoryError>;

    /// 活跃记录快照，供心跳清扫器使用
    async fn list_active(&self, tenant_id: Uuid) -> Result<Vec<OnlineUser>, RepositoryError>;

    /// 跨全部租户的活跃记录快照
    ///
    /// 显式绕过租户过滤，仅限进程级后台任务（清扫器）使用。
    async fn list_active_all(&self) -> Result<Vec<OnlineUser>, RepositoryError>;

    /// 活跃记录分页查询，可按用户名关键字过滤
    async fn list_active_paged(
        &self,
        tenant_id: Uuid,
        keyword: Option<&str>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<OnlineUser>, RepositoryError>;

    /// 刷新某用户全部活跃记录的最后活动时间，返回受影响行数
    async fn touch_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// 按连接ID置为离线并清空连接ID，返回受影响行数
    async fn mark_offline_by_connection(
        &self,
        tenant_id: Uuid,
        connection_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// 按用户ID置为离线并清空连接ID，返回受影响行数
    async fn mark_offline_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;
}
