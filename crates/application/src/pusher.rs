//! 连接推送抽象
//!
//! 出站推送永远按连接ID寻址，不按用户ID寻址；对一个用户多端
//! 设备的扇出由调用方遍历其活跃连接记录完成。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use domain::{MessageKind, OnlineMessage};

/// 推送错误
///
/// 推送失败始终可恢复：消息已经落库，接收方下次拉取未读即可补偿。
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PushError {
    #[error("connection {0} is gone")]
    ConnectionGone(String),
    #[error("push to connection {0} timed out")]
    Timeout(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// 推送到单个连接的出站事件
///
/// 序列化形态即客户端依赖的线上契约：`type` 标签加 camelCase 字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    /// 新消息到达
    #[serde(rename_all = "camelCase")]
    ReceiveMessage {
        message_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        receiver_id: Uuid,
        message_type: MessageKind,
        message_content: String,
        send_time: DateTime<Utc>,
    },
    /// 服务端心跳
    #[serde(rename_all = "camelCase")]
    Heartbeat { server_time: DateTime<Utc> },
    /// 未读消息列表（对 GetUnreadMessages 的应答）
    UnreadMessages { messages: Vec<OnlineMessage> },
    /// 错误通知
    Error { code: String, message: String },
}

impl OutboundEvent {
    /// 从已落库的消息构造推送事件
    pub fn receive_message(message: &OnlineMessage) -> Self {
        OutboundEvent::ReceiveMessage {
            message_id: message.base.id,
            sender_id: message.sender_id,
            sender_name: message.sender_name.clone(),
            receiver_id: message.receiver_id,
            message_type: message.kind,
            message_content: message.content.clone(),
            send_time: message.sent_at,
        }
    }

    pub fn heartbeat(server_time: DateTime<Utc>) -> Self {
        OutboundEvent::Heartbeat { server_time }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        OutboundEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// 连接推送接口，由传输层（Hub）实现
#[async_trait]
pub trait ConnectionPusher: Send + Sync {
    /// 向指定连接推送一个事件
    ///
    /// 连接不存在或传输层报告失败时返回错误，调用方决定如何降级。
    async fn push(&self, connection_id: &str, event: OutboundEvent) -> Result<(), PushError>;
}
