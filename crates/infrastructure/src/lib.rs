//! 基础设施层
//!
//! PostgreSQL 仓储实现与连接池管理。所有读路径都经过显式的
//! 租户过滤构造（TenantScope），不存在隐式的查询拦截。

pub mod db;
pub mod scope;

pub use db::repositories::{PgOnlineMessageRepository, PgOnlineUserRepository, PgUserDirectory};
pub use db::{create_pg_pool, DbPool};
pub use scope::TenantScope;
