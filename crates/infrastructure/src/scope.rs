//! 显式租户过滤
//!
//! 每条查询都必须可以追溯到一次显式的过滤构造：租户分区键
//! 加未删除过滤。需要跨租户的调用（仅限进程级后台任务）
//! 不使用本类型，并在调用处注明。

use uuid::Uuid;

/// 租户查询范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: Uuid,
}

impl TenantScope {
    pub fn new(tenant_id: Uuid) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// 生成 WHERE 谓词片段，`param` 是租户ID的绑定位置
    pub fn predicate(&self, param: usize) -> String {
        format!("tenant_id = ${param} AND is_deleted = FALSE")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_uses_given_param_position() {
        let scope = TenantScope::new(Uuid::new_v4());
        assert_eq!(scope.predicate(1), "tenant_id = $1 AND is_deleted = FALSE");
        assert_eq!(scope.predicate(4), "tenant_id = $4 AND is_deleted = FALSE");
    }
}
