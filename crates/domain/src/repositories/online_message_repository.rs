//! 在线消息仓储接口

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::online_message::{MessageKind, OnlineMessage, Reader};
use crate::repositories::{PaginatedResult, Pagination};

/// 消息历史查询条件
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    /// 按发送者过滤
    pub sender_id: Option<Uuid>,
    /// 按接收者过滤
    pub receiver_id: Option<Uuid>,
    /// 按消息类型过滤
    pub kind: Option<MessageKind>,
    /// 内容关键字
    pub keyword: Option<String>,
}

/// 消息仓储接口
#[async_trait]
pub trait OnlineMessageRepository: Send + Sync {
    /// 持久化一条新消息
    async fn insert(&self, message: &OnlineMessage) -> Result<OnlineMessage, RepositoryError>;

    /// 按ID查找消息
    async fn find_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<OnlineMessage>, RepositoryError>;

    /// 未读到已读的条件更新
    ///
    /// 只在当前状态为未读时生效（行级原子读改写），返回是否发生转换。
    async fn mark_read(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reader: &Reader,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// 某用户的全部未读消息，按发送时间升序
    async fn list_unread(
        &self,
        tenant_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Vec<OnlineMessage>, RepositoryError>;

    /// 某用户的未读消息数
    async fn count_unread(
        &self,
        tenant_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<u64, RepositoryError>;

    /// 消息历史分页查询，按发送时间降序
    async fn list_paged(
        &self,
        tenant_id: Uuid,
        query: &MessageQuery,
        pagination: Pagination,
    ) -> Result<PaginatedResult<OnlineMessage>, RepositoryError>;
}
