//! 基础实体约定
//!
//! 所有持久化记录共享的列集：代理主键、租户分区键、审计字段和软删除字段。
//! 任何读路径都必须显式套用租户过滤与未删除过滤（见 infrastructure 的 TenantScope）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 所有持久化实体共享的基础字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEntity {
    /// 代理主键
    pub id: Uuid,
    /// 租户分区键
    pub tenant_id: Uuid,
    /// 创建者（插入后不可变）
    pub created_by: Option<Uuid>,
    /// 创建时间（插入后不可变）
    pub created_at: DateTime<Utc>,
    /// 最后更新者
    pub updated_by: Option<Uuid>,
    /// 最后更新时间
    pub updated_at: Option<DateTime<Utc>>,
    /// 软删除标记
    pub is_deleted: bool,
    /// 删除者
    pub deleted_by: Option<Uuid>,
    /// 删除时间
    pub deleted_at: Option<DateTime<Utc>>,
    /// 备注
    pub remark: Option<String>,
}

impl BaseEntity {
    /// 创建新的基础字段集
    pub fn new(tenant_id: Uuid, created_by: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            created_by,
            created_at: now,
            updated_by: None,
            updated_at: None,
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
            remark: None,
        }
    }

    /// 记录一次更新
    pub fn touch_updated(&mut self, updated_by: Option<Uuid>, now: DateTime<Utc>) {
        self.updated_by = updated_by;
        self.updated_at = Some(now);
    }

    /// 软删除，重复调用无效果
    pub fn soft_delete(&mut self, deleted_by: Option<Uuid>, now: DateTime<Utc>) {
        if self.is_deleted {
            return;
        }
        self.is_deleted = true;
        self.deleted_by = deleted_by;
        self.deleted_at = Some(now);
    }
}

/// 已认证调用方的身份上下文
///
/// 由上游认证协作方（bearer token 中间件）产生，显式传入每个服务调用，
/// 不做任何环境式的隐式查找。
#[derive(Debug, Clone, PartialEq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid, user_id: Uuid, user_name: impl Into<String>) -> Self {
        Self {
            tenant_id,
            user_id,
            user_name: user_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_delete_is_idempotent() {
        let now = Utc::now();
        let mut base = BaseEntity::new(Uuid::new_v4(), None, now);
        let deleter = Uuid::new_v4();

        base.soft_delete(Some(deleter), now);
        assert!(base.is_deleted);
        assert_eq!(base.deleted_by, Some(deleter));

        let later = now + chrono::Duration::seconds(5);
        base.soft_delete(Some(Uuid::new_v4()), later);
        // 第二次调用不应覆盖首次删除信息
        assert_eq!(base.deleted_by, Some(deleter));
        assert_eq!(base.deleted_at, Some(now));
    }
}
