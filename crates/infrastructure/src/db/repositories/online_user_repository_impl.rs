//! 连接记录仓储实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    OnlineStatus, OnlineUser, OnlineUserRepository, PaginatedResult, Pagination, RepositoryError,
    entity::BaseEntity,
};
use sqlx::{query, query_as, query_scalar, FromRow};
use uuid::Uuid;

use crate::db::{map_sqlx_err, DbPool};
use crate::scope::TenantScope;

const COLUMNS: &str = "id, tenant_id, user_id, user_name, avatar, connection_id, \
     device_fingerprint, device_class, login_at, last_active_at, session_id, \
     access_token_hash, refresh_token_hash, token_expires_at, status, \
     created_by, created_at, updated_by, updated_at, is_deleted, deleted_by, deleted_at, remark";

/// 数据库连接记录模型
#[derive(Debug, Clone, FromRow)]
struct DbOnlineUser {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub avatar: Option<String>,
    pub connection_id: Option<String>,
    pub device_fingerprint: String,
    pub device_class: String,
    pub login_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub session_id: Uuid,
    pub access_token_hash: Option<String>,
    pub refresh_token_hash: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub remark: Option<String>,
}

impl TryFrom<DbOnlineUser> for OnlineUser {
    type Error = RepositoryError;

    fn try_from(row: DbOnlineUser) -> Result<Self, Self::Error> {
        let device_class = row
            .device_class
            .parse()
            .map_err(|_| RepositoryError::storage(format!("无效的设备类型: {}", row.device_class)))?;
        let status: OnlineStatus = row
            .status
            .parse()
            .map_err(|_| RepositoryError::storage(format!("无效的在线状态: {}", row.status)))?;

        Ok(OnlineUser {
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
            user_id: row.user_id,
            user_name: row.user_name,
            avatar: row.avatar,
            connection_id: row.connection_id,
            device_fingerprint: row.device_fingerprint,
            device_class,
            login_at: row.login_at,
            last_active_at: row.last_active_at,
            session_id: row.session_id,
            access_token_hash: row.access_token_hash,
            refresh_token_hash: row.refresh_token_hash,
            token_expires_at: row.token_expires_at,
            status,
        })
    }
}

/// 连接记录仓储实现
pub struct PgOnlineUserRepository {
    pool: DbPool,
}

impl PgOnlineUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OnlineUserRepository for PgOnlineUserRepository {
    async fn insert(&self, record: &OnlineUser) -> Result<OnlineUser, RepositoryError> {
        let sql = format!(
            "INSERT INTO online_user (id, tenant_id, user_id, user_name, avatar, connection_id, \
             device_fingerprint, device_class, login_at, last_active_at, session_id, \
             access_token_hash, refresh_token_hash, token_expires_at, status, \
             created_by, created_at, is_deleted, remark) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) \
             RETURNING {COLUMNS}"
        );
        let row = query_as::<_, DbOnlineUser>(&sql)
            .bind(record.base.id)
            .bind(record.base.tenant_id)
            .bind(record.user_id)
            .bind(&record.user_name)
            .bind(&record.avatar)
            .bind(&record.connection_id)
            .bind(&record.device_fingerprint)
            .bind(record.device_class.as_str())
            .bind(record.login_at)
            .bind(record.last_active_at)
            .bind(record.session_id)
            .bind(&record.access_token_hash)
            .bind(&record.refresh_token_hash)
            .bind(record.token_expires_at)
            .bind(record.status.as_str())
            .bind(record.base.created_by)
            .bind(record.base.created_at)
            .bind(record.base.is_deleted)
            .bind(&record.base.remark)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        row.try_into()
    }

    async fn find_active_by_connection(
        &self,
        tenant_id: Uuid,
        connection_id: &str,
    ) -> Result<Option<OnlineUser>, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let sql = format!(
            "SELECT {COLUMNS} FROM online_user \
             WHERE {} AND connection_id = $2 AND status <> 'offline'",
            scope.predicate(1)
        );
        let row = query_as::<_, DbOnlineUser>(&sql)
            .bind(scope.tenant_id())
            .bind(connection_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        row.map(OnlineUser::try_from).transpose()
    }

    async fn find_active_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<OnlineUser>, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let sql = format!(
            "SELECT {COLUMNS} FROM online_user \
             WHERE {} AND user_id = $2 AND status <> 'offline' \
             ORDER BY login_at, id",
            scope.predicate(1)
        );
        let rows = query_as::<_, DbOnlineUser>(&sql)
            .bind(scope.tenant_id())
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        rows.into_iter().map(OnlineUser::try_from).collect()
    }

    async fn list_active(&self, tenant_id: Uuid) -> Result<Vec<OnlineUser>, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let sql = format!(
            "SELECT {COLUMNS} FROM online_user \
             WHERE {} AND status <> 'offline' \
             ORDER BY login_at, id",
            scope.predicate(1)
        );
        let rows = query_as::<_, DbOnlineUser>(&sql)
            .bind(scope.tenant_id())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        rows.into_iter().map(OnlineUser::try_from).collect()
    }

    async fn list_active_all(&self) -> Result<Vec<OnlineUser>, RepositoryError> {
        // 显式跨租户查询，仅供心跳清扫器使用
        let sql = format!(
            "SELECT {COLUMNS} FROM online_user \
             WHERE is_deleted = FALSE AND status <> 'offline' \
             ORDER BY login_at, id"
        );
        let rows = query_as::<_, DbOnlineUser>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        rows.into_iter().map(OnlineUser::try_from).collect()
    }

    async fn list_active_paged(
        &self,
        tenant_id: Uuid,
        keyword: Option<&str>,
        pagination: Pagination,
    ) -> Result<PaginatedResult<OnlineUser>, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let mut conditions = vec![scope.predicate(1), "status <> 'offline'".to_string()];
        let mut next_param = 2;
        if keyword.is_some() {
            conditions.push(format!("user_name ILIKE ${next_param}"));
            next_param += 1;
        }
        let where_clause = conditions.join(" AND ");
        let pattern = keyword.map(|k| format!("%{k}%"));

        let count_sql = format!("SELECT COUNT(*) FROM online_user WHERE {where_clause}");
        let mut count_query = query_scalar::<_, i64>(&count_sql).bind(scope.tenant_id());
        if let Some(pattern) = &pattern {
            count_query = count_query.bind(pattern);
        }
        let total = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let page_sql = format!(
            "SELECT {COLUMNS} FROM online_user WHERE {where_clause} \
             ORDER BY login_at DESC, id DESC LIMIT ${next_param} OFFSET ${}",
            next_param + 1
        );
        let mut page_query = query_as::<_, DbOnlineUser>(&page_sql).bind(scope.tenant_id());
        if let Some(pattern) = &pattern {
            page_query = page_query.bind(pattern);
        }
        let rows = page_query
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let items: Result<Vec<OnlineUser>, _> =
            rows.into_iter().map(OnlineUser::try_from).collect();
        Ok(PaginatedResult::new(items?, total as u64, pagination))
    }

    async fn touch_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let sql = format!(
            "UPDATE online_user SET last_active_at = $3 \
             WHERE {} AND user_id = $2 AND status <> 'offline'",
            scope.predicate(1)
        );
        let result = query(&sql)
            .bind(scope.tenant_id())
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }

    async fn mark_offline_by_connection(
        &self,
        tenant_id: Uuid,
        connection_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let sql = format!(
            "UPDATE online_user SET status = 'offline', connection_id = NULL, updated_at = $3 \
             WHERE {} AND connection_id = $2 AND status <> 'offline'",
            scope.predicate(1)
        );
        let result = query(&sql)
            .bind(scope.tenant_id())
            .bind(connection_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }

    async fn mark_offline_by_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let sql = format!(
            "UPDATE online_user SET status = 'offline', connection_id = NULL, updated_at = $3 \
             WHERE {} AND user_id = $2 AND status <> 'offline'",
            scope.predicate(1)
        );
        let result = query(&sql)
            .bind(scope.tenant_id())
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}
