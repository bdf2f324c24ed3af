//! 在线用户连接记录实体
//!
//! 一条记录对应一个用户的一条活跃传输会话。同一用户可以同时持有
//! 多条记录（多端登录），但连接ID在非离线记录中必须唯一。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::entity::BaseEntity;
use crate::errors::{DomainError, DomainResult};

/// 设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Web,
    Android,
    Ios,
    Windows,
    Mac,
    Linux,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Web => "web",
            DeviceClass::Android => "android",
            DeviceClass::Ios => "ios",
            DeviceClass::Windows => "windows",
            DeviceClass::Mac => "mac",
            DeviceClass::Linux => "linux",
        }
    }

    /// 从 User-Agent 推导设备类型
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ua.contains("android") {
            DeviceClass::Android
        } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
            DeviceClass::Ios
        } else if ua.contains("windows") {
            DeviceClass::Windows
        } else if ua.contains("macintosh") || ua.contains("mac os") {
            DeviceClass::Mac
        } else if ua.contains("linux") {
            DeviceClass::Linux
        } else {
            DeviceClass::Web
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web" => Ok(DeviceClass::Web),
            "android" => Ok(DeviceClass::Android),
            "ios" => Ok(DeviceClass::Ios),
            "windows" => Ok(DeviceClass::Windows),
            "mac" => Ok(DeviceClass::Mac),
            "linux" => Ok(DeviceClass::Linux),
            other => Err(DomainError::validation(
                "device_class",
                format!("未知的设备类型: {other}"),
            )),
        }
    }
}

/// 在线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Offline,
    Online,
    Busy,
    Away,
}

impl OnlineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OnlineStatus::Offline => "offline",
            OnlineStatus::Online => "online",
            OnlineStatus::Busy => "busy",
            OnlineStatus::Away => "away",
        }
    }
}

impl fmt::Display for OnlineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnlineStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(OnlineStatus::Offline),
            "online" => Ok(OnlineStatus::Online),
            "busy" => Ok(OnlineStatus::Busy),
            "away" => Ok(OnlineStatus::Away),
            other => Err(DomainError::validation(
                "status",
                format!("未知的在线状态: {other}"),
            )),
        }
    }
}

/// 在线用户连接记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUser {
    #[serde(flatten)]
    pub base: BaseEntity,
    /// 用户ID
    pub user_id: Uuid,
    /// 用户显示名称
    pub user_name: String,
    /// 用户头像
    pub avatar: Option<String>,
    /// 传输层分配的连接ID，离线后清空
    pub connection_id: Option<String>,
    /// 设备指纹
    pub device_fingerprint: String,
    /// 设备类型
    pub device_class: DeviceClass,
    /// 登录时间
    pub login_at: DateTime<Utc>,
    /// 最后活动时间
    pub last_active_at: DateTime<Utc>,
    /// 会话ID
    pub session_id: Uuid,
    /// 访问令牌引用
    pub access_token_hash: Option<String>,
    /// 刷新令牌引用
    pub refresh_token_hash: Option<String>,
    /// 令牌过期时间
    pub token_expires_at: Option<DateTime<Utc>>,
    /// 状态
    pub status: OnlineStatus,
}

impl OnlineUser {
    /// 创建一条新的连接记录，连接ID不能为空
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: Uuid,
        user_id: Uuid,
        user_name: impl Into<String>,
        avatar: Option<String>,
        connection_id: impl Into<String>,
        device_fingerprint: impl Into<String>,
        device_class: DeviceClass,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let connection_id = connection_id.into();
        if connection_id.is_empty() {
            return Err(DomainError::validation("connection_id", "连接ID不能为空"));
        }

        Ok(Self {
            base: BaseEntity::new(tenant_id, Some(user_id), now),
            user_id,
            user_name: user_name.into(),
            avatar,
            connection_id: Some(connection_id),
            device_fingerprint: device_fingerprint.into(),
            device_class,
            login_at: now,
            last_active_at: now,
            session_id: Uuid::new_v4(),
            access_token_hash: None,
            refresh_token_hash: None,
            token_expires_at: None,
            status: OnlineStatus::Online,
        })
    }

    /// 记录是否仍被视为活跃
    pub fn is_active(&self) -> bool {
        self.status != OnlineStatus::Offline && !self.base.is_deleted
    }

    /// 心跳或入站事件到达时刷新活动时间
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active_at = now;
    }

    /// 置为离线并清空连接ID，重复调用无效果
    pub fn mark_offline(&mut self, now: DateTime<Utc>) {
        if self.status == OnlineStatus::Offline {
            return;
        }
        self.status = OnlineStatus::Offline;
        self.connection_id = None;
        self.base.touch_updated(Some(self.user_id), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(now: DateTime<Utc>) -> OnlineUser {
        OnlineUser::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            None,
            "conn-1",
            "fp-1",
            DeviceClass::Web,
            now,
        )
        .unwrap()
    }

    #[test]
    fn new_record_is_online_with_connection() {
        let now = Utc::now();
        let user = sample_user(now);
        assert_eq!(user.status, OnlineStatus::Online);
        assert_eq!(user.connection_id.as_deref(), Some("conn-1"));
        assert_eq!(user.login_at, now);
        assert_eq!(user.last_active_at, now);
        assert!(user.is_active());
    }

    #[test]
    fn empty_connection_id_is_rejected() {
        let result = OnlineUser::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            None,
            "",
            "fp-1",
            DeviceClass::Web,
            Utc::now(),
        );
        assert!(matches!(
            result,
            Err(DomainError::Validation { field, .. }) if field == "connection_id"
        ));
    }

    #[test]
    fn touch_updates_last_active() {
        let now = Utc::now();
        let mut user = sample_user(now);
        let later = now + chrono::Duration::seconds(30);
        user.touch(later);
        assert_eq!(user.last_active_at, later);
        assert!(user.last_active_at >= user.login_at);
    }

    #[test]
    fn mark_offline_clears_connection_once() {
        let now = Utc::now();
        let mut user = sample_user(now);
        let later = now + chrono::Duration::seconds(10);

        user.mark_offline(later);
        assert_eq!(user.status, OnlineStatus::Offline);
        assert!(user.connection_id.is_none());
        assert!(!user.is_active());

        let first_updated = user.base.updated_at;
        user.mark_offline(later + chrono::Duration::seconds(10));
        assert_eq!(user.base.updated_at, first_updated);
    }

    #[test]
    fn device_class_from_user_agent() {
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (Linux; Android 14)"),
            DeviceClass::Android
        );
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)"),
            DeviceClass::Ios
        );
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (Windows NT 10.0; Win64)"),
            DeviceClass::Windows
        );
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X)"),
            DeviceClass::Mac
        );
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (X11; Linux x86_64)"),
            DeviceClass::Linux
        );
        assert_eq!(DeviceClass::from_user_agent("curl/8.0"), DeviceClass::Web);
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            OnlineStatus::Offline,
            OnlineStatus::Online,
            OnlineStatus::Busy,
            OnlineStatus::Away,
        ] {
            assert_eq!(status.as_str().parse::<OnlineStatus>().unwrap(), status);
        }
        assert!("unknown".parse::<OnlineStatus>().is_err());
    }
}
