//! 心跳清扫器单元测试

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use domain::{DeviceClass, OnlineStatus, OnlineUser, OnlineUserRepository};

use crate::clock::Clock;
use crate::memory::{FixedClock, InMemoryOnlineUserRepository, RecordingPusher};
use crate::pusher::{ConnectionPusher, OutboundEvent, PushError};
use crate::sweeper::{HeartbeatSweeper, SweeperConfig};

async fn insert_record(
    users: &InMemoryOnlineUserRepository,
    tenant_id: Uuid,
    name: &str,
    connection_id: &str,
) -> OnlineUser {
    let record = OnlineUser::new(
        tenant_id,
        Uuid::new_v4(),
        name,
        None,
        connection_id,
        "fp-test",
        DeviceClass::Web,
        Utc::now(),
    )
    .unwrap();
    users.insert(&record).await.unwrap()
}

fn sweeper(
    users: Arc<InMemoryOnlineUserRepository>,
    pusher: Arc<dyn ConnectionPusher>,
    clock: Arc<FixedClock>,
    config: SweeperConfig,
) -> HeartbeatSweeper {
    HeartbeatSweeper::new(users, pusher, clock, config)
}

#[tokio::test]
async fn test_sweep_reaps_only_failed_connection() {
    let users = Arc::new(InMemoryOnlineUserRepository::new());
    let pusher = Arc::new(RecordingPusher::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let tenant_id = Uuid::new_v4();

    insert_record(&users, tenant_id, "u1", "c1").await;
    insert_record(&users, tenant_id, "u2", "c2").await;
    insert_record(&users, tenant_id, "u3", "c3").await;
    pusher.fail_connection("c2");

    let sweeper = sweeper(
        users.clone(),
        pusher.clone(),
        clock,
        SweeperConfig::default(),
    );
    let report = sweeper.sweep_once().await.unwrap();

    assert_eq!(report.checked, 3);
    assert_eq!(report.reaped, 1);
    assert_eq!(report.expired, 0);

    // 只有推送失败的连接被回收，其余保持在线且连接ID不变
    let active = users.list_active_all().await.unwrap();
    let connections: HashSet<&str> = active
        .iter()
        .filter_map(|r| r.connection_id.as_deref())
        .collect();
    assert_eq!(connections, HashSet::from(["c1", "c3"]));
    assert!(active.iter().all(|r| r.status == OnlineStatus::Online));
}

#[tokio::test]
async fn test_sweep_pushes_heartbeat_to_every_active_connection() {
    let users = Arc::new(InMemoryOnlineUserRepository::new());
    let pusher = Arc::new(RecordingPusher::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let server_time = clock.now();
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();

    // 清扫跨越全部租户
    insert_record(&users, tenant_a, "u1", "c1").await;
    insert_record(&users, tenant_b, "u2", "c2").await;

    let sweeper = sweeper(
        users.clone(),
        pusher.clone(),
        clock,
        SweeperConfig::default(),
    );
    sweeper.sweep_once().await.unwrap();

    for connection in ["c1", "c2"] {
        let events = pusher.sent_to(connection);
        assert_eq!(events, vec![OutboundEvent::heartbeat(server_time)]);
    }
}

#[tokio::test]
async fn test_deregistered_connection_is_not_swept() {
    let users = Arc::new(InMemoryOnlineUserRepository::new());
    let pusher = Arc::new(RecordingPusher::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let tenant_id = Uuid::new_v4();

    insert_record(&users, tenant_id, "u1", "c1").await;
    let record = insert_record(&users, tenant_id, "u3", "c3").await;
    users
        .mark_offline_by_connection(record.base.tenant_id, "c3", Utc::now())
        .await
        .unwrap();

    let sweeper = sweeper(
        users.clone(),
        pusher.clone(),
        clock,
        SweeperConfig::default(),
    );
    let report = sweeper.sweep_once().await.unwrap();

    assert_eq!(report.checked, 1);
    assert!(pusher.sent_to("c3").is_empty());
    assert_eq!(pusher.sent_to("c1").len(), 1);
}

/// 对指定连接永远不完成的推送适配器
struct HangingPusher {
    inner: RecordingPusher,
    hang: HashSet<String>,
}

#[async_trait]
impl ConnectionPusher for HangingPusher {
    async fn push(&self, connection_id: &str, event: OutboundEvent) -> Result<(), PushError> {
        if self.hang.contains(connection_id) {
            futures::future::pending::<()>().await;
        }
        self.inner.push(connection_id, event).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_push_timeout_counts_as_failure() {
    let users = Arc::new(InMemoryOnlineUserRepository::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let tenant_id = Uuid::new_v4();

    insert_record(&users, tenant_id, "u1", "c1").await;
    insert_record(&users, tenant_id, "u2", "c2").await;

    let pusher = Arc::new(HangingPusher {
        inner: RecordingPusher::new(),
        hang: HashSet::from(["c1".to_string()]),
    });

    let sweeper = sweeper(
        users.clone(),
        pusher.clone(),
        clock,
        SweeperConfig {
            push_timeout: Duration::from_millis(100),
            ..SweeperConfig::default()
        },
    );
    let report = sweeper.sweep_once().await.unwrap();

    // 挂起的推送按失败处理，不会拖住整轮清扫
    assert_eq!(report.reaped, 1);
    let active = users.list_active_all().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].connection_id.as_deref(), Some("c2"));
}

#[tokio::test]
async fn test_stale_expiry_reaps_idle_connection_when_enabled() {
    let users = Arc::new(InMemoryOnlineUserRepository::new());
    let pusher = Arc::new(RecordingPusher::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let tenant_id = Uuid::new_v4();

    insert_record(&users, tenant_id, "u1", "c1").await;
    clock.advance(chrono::Duration::seconds(120));

    let sweeper = sweeper(
        users.clone(),
        pusher.clone(),
        clock,
        SweeperConfig {
            stale_after: Some(Duration::from_secs(60)),
            ..SweeperConfig::default()
        },
    );
    let report = sweeper.sweep_once().await.unwrap();

    assert_eq!(report.expired, 1);
    assert_eq!(report.reaped, 0);
    // 超时回收不再尝试推送
    assert!(pusher.sent_to("c1").is_empty());
    assert!(users.list_active_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fresh_connection_survives_stale_expiry() {
    let users = Arc::new(InMemoryOnlineUserRepository::new());
    let pusher = Arc::new(RecordingPusher::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let tenant_id = Uuid::new_v4();

    insert_record(&users, tenant_id, "u1", "c1").await;
    clock.advance(chrono::Duration::seconds(30));

    let sweeper = sweeper(
        users.clone(),
        pusher.clone(),
        clock,
        SweeperConfig {
            stale_after: Some(Duration::from_secs(60)),
            ..SweeperConfig::default()
        },
    );
    let report = sweeper.sweep_once().await.unwrap();

    assert_eq!(report.expired, 0);
    assert_eq!(pusher.sent_to("c1").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown_signal() {
    let users = Arc::new(InMemoryOnlineUserRepository::new());
    let pusher = Arc::new(RecordingPusher::new());
    let clock = Arc::new(FixedClock::new(Utc::now()));

    let sweeper = Arc::new(HeartbeatSweeper::new(
        users,
        pusher,
        clock,
        SweeperConfig::default(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn({
        let sweeper = sweeper.clone();
        async move { sweeper.run(shutdown_rx).await }
    });

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("sweeper should stop after shutdown signal")
        .unwrap();
}
