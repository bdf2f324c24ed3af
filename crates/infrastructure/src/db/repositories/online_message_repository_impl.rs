//! 消息仓储实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    entity::BaseEntity, MessageQuery, OnlineMessage, OnlineMessageRepository, PaginatedResult,
    Pagination, Reader, RepositoryError,
};
use sqlx::{query, query_as, query_scalar, FromRow};
use uuid::Uuid;

use crate::db::{map_sqlx_err, DbPool};
use crate::scope::TenantScope;

const COLUMNS: &str = "id, tenant_id, sender_id, sender_name, sender_avatar, receiver_id, \
     receiver_name, kind, content, sent_at, read_status, read_at, reader_id, reader_name, \
     reader_ip, created_by, created_at, updated_by, updated_at, is_deleted, deleted_by, \
     deleted_at, remark";

/// 数据库消息模型
#[derive(Debug, Clone, FromRow)]
struct DbOnlineMessage {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub receiver_id: Uuid,
    pub receiver_name: String,
    pub kind: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub read_status: String,
    pub read_at: Option<DateTime<Utc>>,
    pub reader_id: Option<Uuid>,
    pub reader_name: Option<String>,
    pub reader_ip: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub remark: Option<String>,
}

impl TryFrom<DbOnlineMessage> for OnlineMessage {
    type Error = RepositoryError;

    fn try_from(row: DbOnlineMessage) -> Result<Self, Self::Error> {
        let kind = row
            .kind
            .parse()
            .map_err(|_| RepositoryError::storage(format!("无效的消息类型: {}", row.kind)))?;
        let read_status = row
            .read_status
            .parse()
            .map_err(|_| RepositoryError::storage(format!("无效的已读状态: {}", row.read_status)))?;

        Ok(OnlineMessage {
            base: BaseEntity {
                id: row.id,
                tenant_id: row.tenant_id,
                created_by: row.created_by,
                created_at: row.created_at,
                updated_by: row.updated_by,
                updated_at: row.updated_at,
                is_deleted: row.is_deleted,
                deleted_by: row.deleted_by,
                deleted_at: row.deleted_at,
                remark: row.remark,
            },
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            sender_avatar: row.sender_avatar,
            receiver_id: row.receiver_id,
            receiver_name: row.receiver_name,
            kind,
            content: row.content,
            sent_at: row.sent_at,
            read_status,
            read_at: row.read_at,
            reader_id: row.reader_id,
            reader_name: row.reader_name,
            reader_ip: row.reader_ip,
        })
    }
}

/// 消息仓储实现
pub struct PgOnlineMessageRepository {
    pool: DbPool,
}

impl PgOnlineMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OnlineMessageRepository for PgOnlineMessageRepository {
    async fn insert(&self, message: &OnlineMessage) -> Result<OnlineMessage, RepositoryError> {
        let sql = format!(
            "INSERT INTO online_message (id, tenant_id, sender_id, sender_name, sender_avatar, \
             receiver_id, receiver_name, kind, content, sent_at, read_status, \
             created_by, created_at, is_deleted, remark) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {COLUMNS}"
        );
        let row = query_as::<_, DbOnlineMessage>(&sql)
            .bind(message.base.id)
            .bind(message.base.tenant_id)
            .bind(message.sender_id)
            .bind(&message.sender_name)
            .bind(&message.sender_avatar)
            .bind(message.receiver_id)
            .bind(&message.receiver_name)
            .bind(message.kind.as_str())
            .bind(&message.content)
            .bind(message.sent_at)
            .bind(message.read_status.as_str())
            .bind(message.base.created_by)
            .bind(message.base.created_at)
            .bind(message.base.is_deleted)
            .bind(&message.base.remark)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        row.try_into()
    }

    async fn find_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<Option<OnlineMessage>, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let sql = format!(
            "SELECT {COLUMNS} FROM online_message WHERE {} AND id = $2",
            scope.predicate(1)
        );
        let row = query_as::<_, DbOnlineMessage>(&sql)
            .bind(scope.tenant_id())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        row.map(OnlineMessage::try_from).transpose()
    }

    async fn mark_read(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        reader: &Reader,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        // 行级条件更新：只有未读状态的行会被转换
        let sql = format!(
            "UPDATE online_message \
             SET read_status = 'read', read_at = $3, reader_id = $4, reader_name = $5, \
                 reader_ip = $6, updated_by = $4, updated_at = $3 \
             WHERE {} AND id = $2 AND read_status = 'unread'",
            scope.predicate(1)
        );
        let result = query(&sql)
            .bind(scope.tenant_id())
            .bind(id)
            .bind(now)
            .bind(reader.reader_id)
            .bind(&reader.reader_name)
            .bind(&reader.reader_ip)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_unread(
        &self,
        tenant_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<Vec<OnlineMessage>, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let sql = format!(
            "SELECT {COLUMNS} FROM online_message \
             WHERE {} AND receiver_id = $2 AND read_status = 'unread' \
             ORDER BY sent_at, created_at, id",
            scope.predicate(1)
        );
        let rows = query_as::<_, DbOnlineMessage>(&sql)
            .bind(scope.tenant_id())
            .bind(receiver_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        rows.into_iter().map(OnlineMessage::try_from).collect()
    }

    async fn count_unread(
        &self,
        tenant_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<u64, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let sql = format!(
            "SELECT COUNT(*) FROM online_message \
             WHERE {} AND receiver_id = $2 AND read_status = 'unread'",
            scope.predicate(1)
        );
        let total = query_scalar::<_, i64>(&sql)
            .bind(scope.tenant_id())
            .bind(receiver_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(total as u64)
    }

    async fn list_paged(
        &self,
        tenant_id: Uuid,
        query_params: &MessageQuery,
        pagination: Pagination,
    ) -> Result<PaginatedResult<OnlineMessage>, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let mut conditions = vec![scope.predicate(1)];
        let mut next_param = 2;

        if query_params.sender_id.is_some() {
            conditions.push(format!("sender_id = ${next_param}"));
            next_param += 1;
        }
        if query_params.receiver_id.is_some() {
            conditions.push(format!("receiver_id = ${next_param}"));
            next_param += 1;
        }
        if query_params.kind.is_some() {
            conditions.push(format!("kind = ${next_param}"));
            next_param += 1;
        }
        if query_params.keyword.is_some() {
            conditions.push(format!("content ILIKE ${next_param}"));
            next_param += 1;
        }
        let where_clause = conditions.join(" AND ");
        let pattern = query_params.keyword.as_ref().map(|k| format!("%{k}%"));

        let count_sql = format!("SELECT COUNT(*) FROM online_message WHERE {where_clause}");
        let mut count_query = query_scalar::<_, i64>(&count_sql).bind(scope.tenant_id());
        if let Some(sender_id) = query_params.sender_id {
            count_query = count_query.bind(sender_id);
        }
        if let Some(receiver_id) = query_params.receiver_id {
            count_query = count_query.bind(receiver_id);
        }
        if let Some(kind) = query_params.kind {
            count_query = count_query.bind(kind.as_str());
        }
        if let Some(pattern) = &pattern {
            count_query = count_query.bind(pattern);
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let page_sql = format!(
            "SELECT {COLUMNS} FROM online_message WHERE {where_clause} \
             ORDER BY sent_at DESC, id DESC LIMIT ${next_param} OFFSET ${}",
            next_param + 1
        );
        let mut page_query = query_as::<_, DbOnlineMessage>(&page_sql).bind(scope.tenant_id());
        if let Some(sender_id) = query_params.sender_id {
            page_query = page_query.bind(sender_id);
        }
        if let Some(receiver_id) = query_params.receiver_id {
            page_query = page_query.bind(receiver_id);
        }
        if let Some(kind) = query_params.kind {
            page_query = page_query.bind(kind.as_str());
        }
        if let Some(pattern) = &pattern {
            page_query = page_query.bind(pattern);
        }
        let rows = page_query
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let items: Result<Vec<OnlineMessage>, _> =
            rows.into_iter().map(OnlineMessage::try_from).collect();
        Ok(PaginatedResult::new(items?, total as u64, pagination))
    }
}
