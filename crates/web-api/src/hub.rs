//! 实时 Hub
//!
//! 单一的 WebSocket 升级入口。连接建立后认证身份、采集设备信号、
//! 在注册表登记；之后把入站事件分发给应用服务，把出站事件经
//! 连接表推送给各自的发送任务。
//!
//! 入站契约：`SendMessage` / `MarkAsRead` / `GetUnreadMessages` / `Heartbeat`；
//! 出站契约：`ReceiveMessage` / `Heartbeat` / `UnreadMessages` / `Error`。

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use application::{ApplicationError, OutboundEvent, SendMessageCommand};
use domain::{DeviceClass, MessageKind, TenantContext};

use crate::error::ApiError;
use crate::state::AppState;

/// Hub 升级查询参数
#[derive(Debug, Deserialize)]
pub struct HubQuery {
    /// JWT access token
    pub token: String,
}

/// 客户端入站事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    /// 发送消息
    #[serde(rename_all = "camelCase")]
    SendMessage {
        receiver_id: Uuid,
        message_type: String,
        message_content: String,
    },
    /// 标记已读
    #[serde(rename_all = "camelCase")]
    MarkAsRead { message_id: Uuid },
    /// 拉取未读消息
    GetUnreadMessages,
    /// 心跳确认
    Heartbeat,
}

/// 处理 WebSocket 连接升级
pub async fn hub_upgrade(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<HubQuery>,
    headers: HeaderMap,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> Result<Response, ApiError> {
    // 升级前完成认证，Hub 本身只接触已验证的身份
    let ctx = state.jwt_service.context_from_token(&query.token)?;

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    tracing::info!(user_id = %ctx.user_id, "WebSocket 升级");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, ctx, user_agent, remote_addr)))
}

/// 单个连接的完整生命周期
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    ctx: TenantContext,
    user_agent: String,
    remote_addr: SocketAddr,
) {
    let connection_id = Uuid::new_v4().to_string();
    let connected_at = state.clock.now();
    let device_fingerprint =
        state
            .fingerprint
            .fingerprint(&user_agent, &remote_addr.to_string(), connected_at);
    let device_class = DeviceClass::from_user_agent(&user_agent);

    let registered = state
        .presence_service
        .register(
            &ctx,
            application::RegisterConnection {
                connection_id: connection_id.clone(),
                avatar: None,
                device_fingerprint,
                device_class,
            },
        )
        .await;
    if let Err(err) = registered {
        tracing::error!(user_id = %ctx.user_id, error = %err, "连接注册失败");
        return;
    }

    let (mut socket_tx, mut socket_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEvent>();
    state
        .connections
        .register_sender(connection_id.clone(), tx.clone())
        .await;

    // 发送任务：统一处理本连接的全部出站事件
    let send_connection_id = connection_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::error!(error = %err, "出站事件序列化失败");
                    continue;
                }
            };
            if socket_tx.send(WsMessage::Text(payload.into())).await.is_err() {
                break;
            }
        }
        tracing::debug!(connection_id = %send_connection_id, "发送任务结束");
    });

    // 接收任务：按到达顺序分发入站事件
    let recv_state = state.clone();
    let recv_ctx = ctx.clone();
    let recv_connection_id = connection_id.clone();
    let reader_ip = remote_addr.ip().to_string();
    let recv_task = tokio::spawn(async move {
        while let Some(message) = socket_rx.next().await {
            match message {
                Ok(WsMessage::Text(text)) => {
                    handle_text_frame(&recv_state, &recv_ctx, &reader_ip, &tx, text.as_str())
                        .await;
                }
                Ok(WsMessage::Pong(_)) => {
                    // 传输层 pong 同样算作活动
                    if let Err(err) = recv_state
                        .presence_service
                        .heartbeat(&recv_ctx, recv_ctx.user_id)
                        .await
                    {
                        tracing::warn!(error = %err, "刷新活动时间失败");
                    }
                }
                Ok(WsMessage::Ping(_)) => {
                    // 协议层自动回复 pong
                }
                Ok(WsMessage::Binary(_)) => {
                    tracing::debug!(connection_id = %recv_connection_id, "忽略二进制帧");
                }
                Ok(WsMessage::Close(_)) => {
                    tracing::info!(connection_id = %recv_connection_id, "客户端关闭连接");
                    break;
                }
                Err(err) => {
                    tracing::warn!(connection_id = %recv_connection_id, error = %err, "WebSocket 错误");
                    break;
                }
            }
        }
        tracing::debug!(connection_id = %recv_connection_id, "接收任务结束");
    });

    // 任一任务结束即视为连接断开
    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    // 清理在 select 之后顺序执行，每个连接生命周期恰好一次；
    // 注销本身幂等，传输层重复报告断开也安全
    state.connections.unregister_sender(&connection_id).await;
    if let Err(err) = state
        .presence_service
        .deregister_connection(&ctx, &connection_id)
        .await
    {
        tracing::error!(connection_id = %connection_id, error = %err, "连接注销失败");
    }

    tracing::info!(
        user_id = %ctx.user_id,
        connection_id = %connection_id,
        "WebSocket 连接已清理"
    );
}

/// 分发一帧入站文本事件
async fn handle_text_frame(
    state: &AppState,
    ctx: &TenantContext,
    reader_ip: &str,
    tx: &mpsc::UnboundedSender<OutboundEvent>,
    text: &str,
) {
    let event: InboundEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!(error = %err, "无法解析的入站帧");
            let _ = tx.send(OutboundEvent::error("BAD_FRAME", "unrecognized frame"));
            return;
        }
    };

    // 每个入站事件都刷新活动时间
    if let Err(err) = state.presence_service.heartbeat(ctx, ctx.user_id).await {
        tracing::warn!(error = %err, "刷新活动时间失败");
    }

    match event {
        InboundEvent::SendMessage {
            receiver_id,
            message_type,
            message_content,
        } => {
            let kind = match message_type.parse::<MessageKind>() {
                Ok(kind) => kind,
                Err(err) => {
                    let _ = tx.send(OutboundEvent::error("VALIDATION_FAILED", err.to_string()));
                    return;
                }
            };
            let command = SendMessageCommand {
                receiver_id,
                kind,
                content: message_content,
            };
            if let Err(err) = state.message_service.send(ctx, command).await {
                let _ = tx.send(error_event(err));
            }
        }
        InboundEvent::MarkAsRead { message_id } => {
            if let Err(err) = state
                .message_service
                .mark_read(ctx, message_id, Some(reader_ip.to_string()))
                .await
            {
                let _ = tx.send(error_event(err));
            }
        }
        InboundEvent::GetUnreadMessages => {
            match state.message_service.list_unread(ctx, ctx.user_id).await {
                Ok(messages) => {
                    let _ = tx.send(OutboundEvent::UnreadMessages { messages });
                }
                Err(err) => {
                    let _ = tx.send(error_event(err));
                }
            }
        }
        InboundEvent::Heartbeat => {
            // 活动时间已在入口刷新
        }
    }
}

fn error_event(err: ApplicationError) -> OutboundEvent {
    let api_err: ApiError = err.into();
    OutboundEvent::error(api_err.code(), api_err.message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn inbound_frames_follow_wire_contract() {
        let receiver = Uuid::new_v4();
        let frame = json!({
            "type": "SendMessage",
            "receiverId": receiver,
            "messageType": "text",
            "messageContent": "hello"
        });
        let event: InboundEvent = serde_json::from_value(frame).unwrap();
        assert_eq!(
            event,
            InboundEvent::SendMessage {
                receiver_id: receiver,
                message_type: "text".to_string(),
                message_content: "hello".to_string(),
            }
        );

        let message_id = Uuid::new_v4();
        let frame = json!({"type": "MarkAsRead", "messageId": message_id});
        let event: InboundEvent = serde_json::from_value(frame).unwrap();
        assert_eq!(event, InboundEvent::MarkAsRead { message_id });

        let event: InboundEvent =
            serde_json::from_value(json!({"type": "GetUnreadMessages"})).unwrap();
        assert_eq!(event, InboundEvent::GetUnreadMessages);

        let event: InboundEvent = serde_json::from_value(json!({"type": "Heartbeat"})).unwrap();
        assert_eq!(event, InboundEvent::Heartbeat);
    }

    #[test]
    fn outbound_heartbeat_uses_camel_case_fields() {
        let event = OutboundEvent::heartbeat(Utc::now());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "Heartbeat");
        assert!(value.get("serverTime").is_some());
    }

    #[test]
    fn outbound_receive_message_carries_full_payload() {
        let message = domain::OnlineMessage::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            None,
            Uuid::new_v4(),
            "bob",
            MessageKind::Text,
            "hello",
            Utc::now(),
        )
        .unwrap();

        let value = serde_json::to_value(OutboundEvent::receive_message(&message)).unwrap();
        assert_eq!(value["type"], "ReceiveMessage");
        assert_eq!(value["messageId"], json!(message.base.id));
        assert_eq!(value["senderId"], json!(message.sender_id));
        assert_eq!(value["senderName"], "alice");
        assert_eq!(value["receiverId"], json!(message.receiver_id));
        assert_eq!(value["messageType"], "text");
        assert_eq!(value["messageContent"], "hello");
        assert!(value.get("sendTime").is_some());
    }

    #[test]
    fn unknown_frame_type_fails_to_parse() {
        let result: Result<InboundEvent, _> =
            serde_json::from_value(json!({"type": "SelfDestruct"}));
        assert!(result.is_err());
    }
}
