//! 连接注册表服务单元测试

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use domain::{DeviceClass, DomainError, OnlineUserRepository, TenantContext};

use crate::error::ApplicationError;
use crate::memory::{FixedClock, InMemoryOnlineUserRepository};
use crate::presence_service::{PresenceService, RegisterConnection};

struct TestEnv {
    users: Arc<InMemoryOnlineUserRepository>,
    clock: Arc<FixedClock>,
    service: PresenceService,
    ctx: TenantContext,
}

fn test_env() -> TestEnv {
    let users = Arc::new(InMemoryOnlineUserRepository::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let service = PresenceService::new(users.clone(), clock.clone());
    let ctx = TenantContext::new(Uuid::new_v4(), Uuid::new_v4(), "alice");
    TestEnv {
        users,
        clock,
        service,
        ctx,
    }
}

fn register_command(connection_id: &str) -> RegisterConnection {
    RegisterConnection {
        connection_id: connection_id.to_string(),
        avatar: None,
        device_fingerprint: "fp-test".to_string(),
        device_class: DeviceClass::Web,
    }
}

#[tokio::test]
async fn test_register_then_list_active_includes_record_once() {
    let env = test_env();

    let record = env
        .service
        .register(&env.ctx, register_command("c1"))
        .await
        .unwrap();

    let active = env.service.list_active(&env.ctx).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].base.id, record.base.id);
    assert_eq!(active[0].connection_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn test_register_duplicate_connection_should_conflict() {
    let env = test_env();
    env.service
        .register(&env.ctx, register_command("c1"))
        .await
        .unwrap();

    let other = TenantContext::new(env.ctx.tenant_id, Uuid::new_v4(), "bob");
    let result = env.service.register(&other, register_command("c1")).await;

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::Conflict { .. }))
    ));
}

#[tokio::test]
async fn test_multi_device_register_is_allowed() {
    let env = test_env();
    env.service
        .register(&env.ctx, register_command("c1"))
        .await
        .unwrap();
    env.service
        .register(&env.ctx, register_command("c2"))
        .await
        .unwrap();

    let active = env.service.list_active(&env.ctx).await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|r| r.user_id == env.ctx.user_id));
}

#[tokio::test]
async fn test_heartbeat_updates_last_active() {
    let env = test_env();
    let record = env
        .service
        .register(&env.ctx, register_command("c1"))
        .await
        .unwrap();
    let registered_at = record.last_active_at;

    env.clock.advance(chrono::Duration::seconds(15));
    env.service
        .heartbeat(&env.ctx, env.ctx.user_id)
        .await
        .unwrap();

    let active = env.service.list_active(&env.ctx).await.unwrap();
    assert!(active[0].last_active_at >= registered_at);
    assert_eq!(
        active[0].last_active_at,
        registered_at + chrono::Duration::seconds(15)
    );
}

#[tokio::test]
async fn test_heartbeat_without_records_is_soft_noop() {
    let env = test_env();
    // 没有任何连接记录时心跳不报错
    env.service
        .heartbeat(&env.ctx, env.ctx.user_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_deregister_connection_twice_is_noop() {
    let env = test_env();
    env.service
        .register(&env.ctx, register_command("c1"))
        .await
        .unwrap();

    env.service
        .deregister_connection(&env.ctx, "c1")
        .await
        .unwrap();
    let active = env.service.list_active(&env.ctx).await.unwrap();
    assert!(active.is_empty());

    // 第二次注销是无操作
    env.service
        .deregister_connection(&env.ctx, "c1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_deregister_user_marks_all_devices_offline() {
    let env = test_env();
    env.service
        .register(&env.ctx, register_command("c1"))
        .await
        .unwrap();
    env.service
        .register(&env.ctx, register_command("c2"))
        .await
        .unwrap();

    env.service
        .deregister_user(&env.ctx, env.ctx.user_id)
        .await
        .unwrap();

    let active = env.service.list_active(&env.ctx).await.unwrap();
    assert!(active.is_empty());

    let all = env.users.list_active_all().await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_list_active_is_tenant_scoped() {
    let env = test_env();
    env.service
        .register(&env.ctx, register_command("c1"))
        .await
        .unwrap();

    let other_tenant = TenantContext::new(Uuid::new_v4(), Uuid::new_v4(), "eve");
    let active = env.service.list_active(&other_tenant).await.unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn test_list_active_paged_filters_by_keyword() {
    let env = test_env();
    env.service
        .register(&env.ctx, register_command("c1"))
        .await
        .unwrap();
    let bob = TenantContext::new(env.ctx.tenant_id, Uuid::new_v4(), "bob");
    env.service
        .register(&bob, register_command("c2"))
        .await
        .unwrap();

    let page = env
        .service
        .list_active_paged(&env.ctx, Some("ali"), domain::Pagination::new(1, 10))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].user_name, "alice");
}
