//! 连接注册表服务
//!
//! 维护"谁在线、在哪个设备、从什么时候开始"的权威记录。
//! 每个变更操作都直写存储，进程重启不丢失注册表完整性。

use std::sync::Arc;
use uuid::Uuid;

use domain::{
    DeviceClass, DomainError, OnlineUser, OnlineUserRepository, PaginatedResult, Pagination,
    TenantContext,
};

use crate::clock::Clock;
use crate::error::ApplicationResult;

/// 注册连接命令
#[derive(Debug, Clone)]
pub struct RegisterConnection {
    /// 传输层分配的连接ID
    pub connection_id: String,
    /// 用户头像
    pub avatar: Option<String>,
    /// 设备指纹
    pub device_fingerprint: String,
    /// 设备类型
    pub device_class: DeviceClass,
}

/// 连接注册表服务
pub struct PresenceService {
    users: Arc<dyn OnlineUserRepository>,
    clock: Arc<dyn Clock>,
}

impl PresenceService {
    pub fn new(users: Arc<dyn OnlineUserRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { users, clock }
    }

    /// 注册一条新连接
    ///
    /// 同一用户允许持有多条并发记录（多端登录）；同一个传输层
    /// 连接ID重复注册是冲突，正确的传输层不应出现这种情况。
    pub async fn register(
        &self,
        ctx: &TenantContext,
        command: RegisterConnection,
    ) -> ApplicationResult<OnlineUser> {
        if let Some(existing) = self
            .users
            .find_active_by_connection(ctx.tenant_id, &command.connection_id)
            .await?
        {
            tracing::warn!(
                connection_id = %command.connection_id,
                holder = %existing.user_id,
                "连接ID重复注册"
            );
            return Err(DomainError::conflict(format!(
                "连接ID已被注册: {}",
                command.connection_id
            ))
            .into());
        }

        let now = self.clock.now();
        let record = OnlineUser::new(
            ctx.tenant_id,
            ctx.user_id,
            ctx.user_name.clone(),
            command.avatar,
            command.connection_id,
            command.device_fingerprint,
            command.device_class,
            now,
        )?;
        let record = self.users.insert(&record).await?;

        tracing::info!(
            user_id = %record.user_id,
            connection_id = ?record.connection_id,
            device = %record.device_class,
            "用户连接已注册"
        );
        Ok(record)
    }

    /// 刷新某用户全部活跃记录的最后活动时间
    ///
    /// 幂等；用户没有活跃记录时只记录一条软告警。
    pub async fn heartbeat(&self, ctx: &TenantContext, user_id: Uuid) -> ApplicationResult<()> {
        let now = self.clock.now();
        let touched = self.users.touch_user(ctx.tenant_id, user_id, now).await?;
        if touched == 0 {
            tracing::warn!(user_id = %user_id, "收到心跳但用户没有活跃连接记录");
        }
        Ok(())
    }

    /// 按连接ID注销，重复调用是无操作
    pub async fn deregister_connection(
        &self,
        ctx: &TenantContext,
        connection_id: &str,
    ) -> ApplicationResult<()> {
        let now = self.clock.now();
        let affected = self
            .users
            .mark_offline_by_connection(ctx.tenant_id, connection_id, now)
            .await?;
        if affected == 0 {
            tracing::debug!(connection_id = %connection_id, "连接已注销，忽略重复调用");
        } else {
            tracing::info!(connection_id = %connection_id, "连接已注销");
        }
        Ok(())
    }

    /// 按用户ID注销其全部连接，重复调用是无操作
    pub async fn deregister_user(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
    ) -> ApplicationResult<()> {
        let now = self.clock.now();
        let affected = self
            .users
            .mark_offline_by_user(ctx.tenant_id, user_id, now)
            .await?;
        if affected == 0 {
            tracing::debug!(user_id = %user_id, "用户没有需要注销的连接");
        } else {
            tracing::info!(user_id = %user_id, affected, "用户全部连接已注销");
        }
        Ok(())
    }

    /// 当前租户的活跃记录快照
    pub async fn list_active(&self, ctx: &TenantContext) -> ApplicationResult<Vec<OnlineUser>> {
        Ok(self.users.list_active(ctx.tenant_id).await?)
    }

    /// 活跃记录分页查询，供管理端列表使用
    pub async fn list_active_paged(
        &self,
        ctx: &TenantContext,
        keyword: Option<&str>,
        pagination: Pagination,
    ) -> ApplicationResult<PaginatedResult<OnlineUser>> {
        Ok(self
            .users
            .list_active_paged(ctx.tenant_id, keyword, pagination)
            .await?)
    }
}
