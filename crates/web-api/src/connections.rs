//! Hub 连接表
//!
//! 连接ID到出站通道的进程内映射。这不是权威状态：权威的连接
//! 记录在存储里，这张表只是把推送事件交给对应连接的发送任务。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use application::{ConnectionPusher, OutboundEvent, PushError};

/// 进程内连接表
#[derive(Default)]
pub struct HubConnections {
    senders: RwLock<HashMap<String, mpsc::UnboundedSender<OutboundEvent>>>,
}

impl HubConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册连接的出站通道
    pub async fn register_sender(
        &self,
        connection_id: impl Into<String>,
        sender: mpsc::UnboundedSender<OutboundEvent>,
    ) {
        let mut senders = self.senders.write().await;
        senders.insert(connection_id.into(), sender);
    }

    /// 移除连接的出站通道，重复调用无效果
    pub async fn unregister_sender(&self, connection_id: &str) {
        let mut senders = self.senders.write().await;
        senders.remove(connection_id);
    }

    /// 当前持有的连接数
    pub async fn len(&self) -> usize {
        self.senders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.senders.read().await.is_empty()
    }
}

#[async_trait]
impl ConnectionPusher for HubConnections {
    async fn push(&self, connection_id: &str, event: OutboundEvent) -> Result<(), PushError> {
        let senders = self.senders.read().await;
        match senders.get(connection_id) {
            Some(sender) => sender
                .send(event)
                .map_err(|_| PushError::ConnectionGone(connection_id.to_string())),
            None => Err(PushError::ConnectionGone(connection_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn push_to_unknown_connection_fails() {
        let connections = HubConnections::new();
        let result = connections
            .push("missing", OutboundEvent::heartbeat(Utc::now()))
            .await;
        assert!(matches!(result, Err(PushError::ConnectionGone(_))));
    }

    #[tokio::test]
    async fn push_reaches_registered_sender() {
        let connections = HubConnections::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections.register_sender("c1", tx).await;

        let event = OutboundEvent::heartbeat(Utc::now());
        connections.push("c1", event.clone()).await.unwrap();
        assert_eq!(rx.recv().await, Some(event));
    }

    #[tokio::test]
    async fn push_after_unregister_fails() {
        let connections = HubConnections::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        connections.register_sender("c1", tx).await;
        connections.unregister_sender("c1").await;
        assert!(connections.is_empty().await);

        let result = connections
            .push("c1", OutboundEvent::heartbeat(Utc::now()))
            .await;
        assert!(matches!(result, Err(PushError::ConnectionGone(_))));
    }

    #[tokio::test]
    async fn push_to_dropped_receiver_fails() {
        let connections = HubConnections::new();
        let (tx, rx) = mpsc::unbounded_channel();
        connections.register_sender("c1", tx).await;
        drop(rx);

        let result = connections
            .push("c1", OutboundEvent::heartbeat(Utc::now()))
            .await;
        assert!(matches!(result, Err(PushError::ConnectionGone(_))));
    }
}
