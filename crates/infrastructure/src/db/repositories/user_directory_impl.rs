//! 用户目录只读实现
//!
//! 用户表由外部 CRUD 模块维护，这里只做接收者校验所需的查询。

use async_trait::async_trait;
use domain::{RepositoryError, UserDirectory, UserRef};
use sqlx::{query_as, FromRow};
use uuid::Uuid;

use crate::db::{map_sqlx_err, DbPool};
use crate::scope::TenantScope;

#[derive(Debug, Clone, FromRow)]
struct DbUserRef {
    pub id: Uuid,
    pub user_name: String,
    pub avatar: Option<String>,
}

/// 用户目录实现
pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_ref(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<UserRef>, RepositoryError> {
        let scope = TenantScope::new(tenant_id);
        let sql = format!(
            "SELECT id, user_name, avatar FROM sys_user WHERE {} AND id = $2",
            scope.predicate(1)
        );
        let row = query_as::<_, DbUserRef>(&sql)
            .bind(scope.tenant_id())
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(row.map(|r| UserRef {
            user_id: r.id,
            user_name: r.user_name,
            avatar: r.avatar,
        }))
    }
}
