//! 主应用程序入口
//!
//! 装配仓储、应用服务、心跳清扫器和 Web 服务，
//! 并在停机时按顺序回收。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use application::{
    Clock, HeartbeatSweeper, MessageService, MessageServiceDependencies, PresenceService,
    SweeperConfig, SystemClock,
};
use config::AppConfig;
use domain::{FingerprintHasher, OnlineMessageRepository, OnlineUserRepository, UserDirectory};
use infrastructure::{
    create_pg_pool, PgOnlineMessageRepository, PgOnlineUserRepository, PgUserDirectory,
};
use web_api::{router, AppState, HubConnections, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env_with_defaults();

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').next_back().unwrap_or("unknown")
    );
    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // 仓储
    let users: Arc<dyn OnlineUserRepository> =
        Arc::new(PgOnlineUserRepository::new(pg_pool.clone()));
    let messages: Arc<dyn OnlineMessageRepository> =
        Arc::new(PgOnlineMessageRepository::new(pg_pool.clone()));
    let directory: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(pg_pool));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let connections = Arc::new(HubConnections::new());

    // 应用层服务
    let presence_service = Arc::new(PresenceService::new(users.clone(), clock.clone()));
    let message_service = Arc::new(MessageService::new(MessageServiceDependencies {
        messages,
        users: users.clone(),
        directory,
        pusher: connections.clone(),
        clock: clock.clone(),
    }));

    // 心跳清扫器
    let sweeper = Arc::new(HeartbeatSweeper::new(
        users,
        connections.clone(),
        clock.clone(),
        SweeperConfig {
            interval: Duration::from_secs(config.presence.sweep_interval_secs),
            push_timeout: Duration::from_millis(config.presence.push_timeout_ms),
            stale_after: config.presence.stale_after_secs.map(Duration::from_secs),
        },
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_handle = tokio::spawn({
        let sweeper = sweeper.clone();
        async move { sweeper.run(shutdown_rx).await }
    });

    // 应用状态
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let state = AppState::new(
        presence_service,
        message_service,
        connections,
        jwt_service,
        Arc::new(FingerprintHasher::new()),
        clock,
    );

    // 启动 Web 服务器
    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("在线服务启动在 http://{addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // 通知清扫器停止，最多等待一轮在途清扫
    let _ = shutdown_tx.send(true);
    let _ = sweeper_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听停机信号");
    }
    tracing::info!("收到停机信号");
}
