//! 内存实现的仓储与推送适配器
//!
//! 用于单元测试和无数据库的本地运行，行为与 Postgres 实现保持一致
//! （包括活跃连接ID的唯一性约束和条件更新语义）。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use domain::{
    MessageQuery, OnlineMessage, OnlineMessageRepository, OnlineUser, OnlineUserRepository,
    PaginatedResult, Pagination, ReadStatus, Reader, RepositoryError, UserDirectory, UserRef,
};

use crate::clock::Clock;
use crate::pusher::{ConnectionPusher, OutboundEvent, PushError};

/// 内存连接记录仓储
#[derive(Default)]
pub struct InMemoryOnlineUserRepository {
    records: RwLock<HashMap<Uuid, OnlineUser>>,
}

impl InMemoryOnlineUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OnlineUserRepository for InMemoryOnlineUserRepository {
    async fn insert(&self, record: &OnlineUser) -> Result<OnlineUser, RepositoryError> {
        let mut records = self.records.write().await;
        if let Some(connection_id) = &record.connection_id {
            let duplicate = records
                .values()
                .any(|r| r.is_active() && r.connection_id.as_ref() == Some(connection_id));
            if duplicate {
                return Err(RepositoryError::Conflict);
            }
        }
        records.insert(record.base.id, record.clone());
        Ok(record.clone())
    }

    async fn find_active_by_connection(
        &self,
        tenant_id: Uuid,
        connection_id: &str,
    ) -> Result<Option<OnlineUser>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| {
                r.base.tenant_id == tenant_id
                    && r.is_active()
                    && r.connection_id.as_deref() == Some(connection_id)
            })
            .cloned())
    }

    async fn find_active_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<OnlineUser>, RepositoryError> {
        let records = self.records.read().await;
        let mut found: Vec<OnlineUser> = records
            .values()
            .filter(|r| r.base.tenant_id == tenant_id && r.is_active() && r.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.login_at, r.base.id));
        Ok(found)
    }

    async fn list_active(&self, tenant_id: Uuid) -> Result<Vec<OnlineUser>, RepositoryError> {
        let records = self.records.read().await;
        let mut found: Vec<OnlineUser> = records
            .values()
            .filter(|r| r.base.tenant_id == tenant_id && r.is_active())
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.login_at, r.base.id));
        Ok(found)
    }

    async fn list_active_all(&self) -> Result<Vec<OnlineUser>, RepositoryError> {
        let records = self.records.read().await;
        let mut found: Vec<OnlineUser> =
            records.values().filter(|r| r.is_active()).cloned().collect();
        found.sort_by_key(|r| (r.login_at, r.base.id));
        Ok(found)
    }

    async fn list_active_paged(
        &self,
        tenant_id: Uuid,
        keyword: Option<&str>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<OnlineUser>, RepositoryError> {
        let records = self.records.read().await;
        let keyword = keyword.map(|k| k.to_lowercase());
        let mut found: Vec<OnlineUser> = records
            .values()
            .filter(|r| r.base.tenant_id == tenant_id && r.is_active())
            .filter(|r| match &keyword {
                Some(k) => r.user_name.to_lowercase().contains(k),
                None => true,
            })
            .cloned()
            .collect();
        found.sort_by_key(|r| std::cmp::Reverse((r.login_at, r.base.id)));

        let total = found.len() as u64;
        let items: Vec<OnlineUser> = found
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect();
        Ok(PaginatedResult::new(items, total, pagination))
    }

    async fn touch_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().await;
        let mut touched = 0;
        for record in records.values_mut() {
            if record.base.tenant_id == tenant_id && record.is_active() && record.user_id == user_id
            {
                record.touch(now);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn mark_offline_by_connection(
        &self,
        tenant_id: Uuid,
        connection_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().await;
        let mut affected = 0;
        for record in records.values_mut() {
            if record.base.tenant_id == tenant_id
                && record.is_active()
                && record.connection_id.as_deref() == Some(connection_id)
            {
                record.mark_offline(now);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn mark_offline_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().await;
        let mut affected = 0;
        for record in records.values_mut() {
            if record.base.tenant_id == tenant_id && record.is_active() && record.user_id == user_id
            {
                record.mark_offline(now);
                affected += 1;
            }
        }
        Ok(affected)
    }
}

/// 内存消息仓储
#[derive(Default)]
pub struct InMemoryOnlineMessageRepository {
    messages: RwLock<HashMap<Uuid, OnlineMessage>>,
}

impl InMemoryOnlineMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OnlineMessageRepository for InMemoryOnlineMessageRepository {
    async fn insert(&self, message: &OnlineMessage) -> Result<OnlineMessage, RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.insert(message.base.id, message.clone());
        Ok(message.clone())
    }

    async fn find_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<OnlineMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .get(&id)
            .filter(|m| m.base.tenant_id == tenant_id && !m.base.is_deleted)
            .cloned())
    }

    async fn mark_read(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reader: &Reader,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut messages = self.messages.write().await;
        let Some(message) = messages
            .get_mut(&id)
            .filter(|m| m.base.tenant_id == tenant_id && !m.base.is_deleted)
        else {
            return Ok(false);
        };
        Ok(message.mark_read(reader.clone(), now))
    }

    async fn list_unread(
        &self,
        tenant_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Vec<OnlineMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut unread: Vec<OnlineMessage> = messages
            .values()
            .filter(|m| {
                m.base.tenant_id == tenant_id
                    && !m.base.is_deleted
                    && m.receiver_id == receiver_id
                    && m.read_status == ReadStatus::Unread
            })
            .cloned()
            .collect();
        unread.sort_by_key(|m| (m.sent_at, m.base.created_at, m.base.id));
        Ok(unread)
    }

    async fn count_unread(
        &self,
        tenant_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<u64, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .values()
            .filter(|m| {
                m.base.tenant_id == tenant_id
                    && !m.base.is_deleted
                    && m.receiver_id == receiver_id
                    && m.read_status == ReadStatus::Unread
            })
            .count() as u64)
    }

    async fn list_paged(
        &self,
        tenant_id: Uuid,
        query: &MessageQuery,
        pagination: Pagination,
    ) -> Result<PaginatedResult<OnlineMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let keyword = query.keyword.as_ref().map(|k| k.to_lowercase());
        let mut found: Vec<OnlineMessage> = messages
            .values()
            .filter(|m| m.base.tenant_id == tenant_id && !m.base.is_deleted)
            .filter(|m| query.sender_id.map(|id| m.sender_id == id).unwrap_or(true))
            .filter(|m| {
                query
                    .receiver_id
                    .map(|id| m.receiver_id == id)
                    .unwrap_or(true)
            })
            .filter(|m| query.kind.map(|k| m.kind == k).unwrap_or(true))
            .filter(|m| match &keyword {
                Some(k) => m.content.to_lowercase().contains(k),
                None => true,
            })
            .cloned()
            .collect();
        found.sort_by_key(|m| std::cmp::Reverse((m.sent_at, m.base.id)));

        let total = found.len() as u64;
        let items: Vec<OnlineMessage> = found
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .collect();
        Ok(PaginatedResult::new(items, total, pagination))
    }
}

/// 内存用户目录
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<(Uuid, Uuid), UserRef>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个用户引用
    pub async fn upsert(&self, tenant_id: Uuid, user: UserRef) {
        let mut users = self.users.write().await;
        users.insert((tenant_id, user.user_id), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_ref(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<UserRef>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&(tenant_id, user_id)).cloned())
    }
}

/// 记录型推送适配器
///
/// 记录全部推送事件，并可以把指定连接标记为不可达。
#[derive(Default)]
pub struct RecordingPusher {
    sent: StdMutex<Vec<(String, OutboundEvent)>>,
    failing: StdMutex<HashSet<String>>,
}

impl RecordingPusher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把某个连接标记为不可达，之后对它的推送都返回错误
    pub fn fail_connection(&self, connection_id: impl Into<String>) {
        self.failing.lock().unwrap().insert(connection_id.into());
    }

    /// 全部已推送事件
    pub fn sent(&self) -> Vec<(String, OutboundEvent)> {
        self.sent.lock().unwrap().clone()
    }

    /// 推送到指定连接的事件
    pub fn sent_to(&self, connection_id: &str) -> Vec<OutboundEvent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == connection_id)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait]
impl ConnectionPusher for RecordingPusher {
    async fn push(&self, connection_id: &str, event: OutboundEvent) -> Result<(), PushError> {
        if self.failing.lock().unwrap().contains(connection_id) {
            return Err(PushError::ConnectionGone(connection_id.to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((connection_id.to_string(), event));
        Ok(())
    }
}

/// 固定时钟，测试里可以手动推进
pub struct FixedClock {
    now: StdMutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: StdMutex::new(start),
        }
    }

    /// 推进时钟
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
