//! 心跳清扫器
//!
//! 周期性地对每条活跃连接做一次轻量推送，回收传输层没有察觉的
//! 死连接。推送失败是陈旧注册记录唯一的自动回收路径；可选的
//! 活动超时兜底需要显式配置开启。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use domain::{OnlineUser, OnlineUserRepository};

use crate::clock::Clock;
use crate::error::ApplicationResult;
use crate::pusher::{ConnectionPusher, OutboundEvent};

/// 清扫器配置
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// 清扫间隔
    pub interval: Duration,
    /// 单次推送超时，超时等同于推送失败
    pub push_timeout: Duration,
    /// 可选的活动超时兜底
    pub stale_after: Option<Duration>,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            push_timeout: Duration::from_secs(5),
            stale_after: None,
        }
    }
}

/// 单轮清扫结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// 本轮检查的连接数
    pub checked: usize,
    /// 因推送失败回收的连接数
    pub reaped: usize,
    /// 因活动超时回收的连接数
    pub expired: usize,
}

/// 心跳清扫器
pub struct HeartbeatSweeper {
    users: Arc<dyn OnlineUserRepository>,
    pusher: Arc<dyn ConnectionPusher>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl HeartbeatSweeper {
    pub fn new(
        users: Arc<dyn OnlineUserRepository>,
        pusher: Arc<dyn ConnectionPusher>,
        clock: Arc<dyn Clock>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            users,
            pusher,
            clock,
            config,
        }
    }

    /// 清扫循环，直到收到停机信号
    ///
    /// 停机信号在每次休眠前和每轮开始前检查，进程停机最多等待
    /// 一轮在途清扫。
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            "心跳清扫器已启动"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    match self.sweep_once().await {
                        Ok(report) if report.reaped > 0 || report.expired > 0 => {
                            tracing::info!(
                                checked = report.checked,
                                reaped = report.reaped,
                                expired = report.expired,
                                "心跳清扫完成"
                            );
                        }
                        Ok(report) => {
                            tracing::debug!(checked = report.checked, "心跳清扫完成");
                        }
                        // 快照失败不致命，等待下一个周期
                        Err(err) => {
                            tracing::error!(error = %err, "心跳清扫失败，等待下一个周期");
                        }
                    }
                }
            }
        }

        tracing::info!("心跳清扫器已停止");
    }

    /// 执行一轮清扫
    ///
    /// 处理的是快照：记录在快照和使用之间可能已经变化，
    /// 回收操作对此必须安全（条件更新，零行受影响即忽略）。
    pub async fn sweep_once(&self) -> ApplicationResult<SweepReport> {
        let snapshot = self.users.list_active_all().await?;
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for record in snapshot {
            let Some(connection_id) = record.connection_id.clone() else {
                continue;
            };
            report.checked += 1;

            if let Some(stale_after) = self.config.stale_after {
                let idle = now.signed_duration_since(record.last_active_at);
                if idle.to_std().map(|d| d > stale_after).unwrap_or(false) {
                    tracing::warn!(
                        user_id = %record.user_id,
                        connection_id = %connection_id,
                        idle_secs = idle.num_seconds(),
                        "连接活动超时"
                    );
                    self.reap(&record, &connection_id, now).await;
                    report.expired += 1;
                    continue;
                }
            }

            if self.push_heartbeat(&connection_id, now).await {
                continue;
            }
            self.reap(&record, &connection_id, now).await;
            report.reaped += 1;
        }

        Ok(report)
    }

    /// 推送心跳，返回连接是否存活
    async fn push_heartbeat(&self, connection_id: &str, now: DateTime<Utc>) -> bool {
        let push = self
            .pusher
            .push(connection_id, OutboundEvent::heartbeat(now));
        match tokio::time::timeout(self.config.push_timeout, push).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::warn!(connection_id = %connection_id, error = %err, "心跳推送失败");
                false
            }
            Err(_) => {
                tracing::warn!(connection_id = %connection_id, "心跳推送超时");
                false
            }
        }
    }

    /// 回收单条记录，失败只记日志，不影响其余记录的清扫
    async fn reap(&self, record: &OnlineUser, connection_id: &str, now: DateTime<Utc>) {
        match self
            .users
            .mark_offline_by_connection(record.base.tenant_id, connection_id, now)
            .await
        {
            Ok(0) => {
                tracing::debug!(connection_id = %connection_id, "记录已在清扫期间离线");
            }
            Ok(_) => {
                tracing::info!(
                    user_id = %record.user_id,
                    connection_id = %connection_id,
                    "死连接已回收"
                );
            }
            Err(err) => {
                tracing::error!(
                    connection_id = %connection_id,
                    error = %err,
                    "回收连接记录失败"
                );
            }
        }
    }
}
