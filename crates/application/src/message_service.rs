//! 消息存储与投递服务
//!
//! 先持久化，再尽力实时推送。推送失败不会影响发送结果：
//! 消息已经落库，接收方重连后通过未读拉取补偿。

use std::sync::Arc;
use uuid::Uuid;

use domain::{
    DomainError, MessageKind, MessageQuery, OnlineMessage, OnlineMessageRepository,
    OnlineUserRepository, PaginatedResult, Pagination, ReadStatus, Reader, TenantContext,
    UserDirectory,
};

use crate::clock::Clock;
use crate::error::ApplicationResult;
use crate::pusher::{ConnectionPusher, OutboundEvent};

/// 发送消息命令
#[derive(Debug, Clone)]
pub struct SendMessageCommand {
    /// 接收者ID
    pub receiver_id: Uuid,
    /// 消息类型
    pub kind: MessageKind,
    /// 消息内容
    pub content: String,
}

/// 消息服务依赖
pub struct MessageServiceDependencies {
    pub messages: Arc<dyn OnlineMessageRepository>,
    pub users: Arc<dyn OnlineUserRepository>,
    pub directory: Arc<dyn UserDirectory>,
    pub pusher: Arc<dyn ConnectionPusher>,
    pub clock: Arc<dyn Clock>,
}

/// 消息存储与投递服务
pub struct MessageService {
    messages: Arc<dyn OnlineMessageRepository>,
    users: Arc<dyn OnlineUserRepository>,
    directory: Arc<dyn UserDirectory>,
    pusher: Arc<dyn ConnectionPusher>,
    clock: Arc<dyn Clock>,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self {
            messages: deps.messages,
            users: deps.users,
            directory: deps.directory,
            pusher: deps.pusher,
            clock: deps.clock,
        }
    }

    /// 发送一条消息：校验、落库、然后尽力推送
    ///
    /// 接收者不存在返回 NotFound；持久化失败向上传播并且不会发起
    /// 任何推送；推送失败只记日志。
    pub async fn send(
        &self,
        ctx: &TenantContext,
        command: SendMessageCommand,
    ) -> ApplicationResult<OnlineMessage> {
        let receiver = self
            .directory
            .find_ref(ctx.tenant_id, command.receiver_id)
            .await?
            .ok_or_else(|| {
                DomainError::not_found("user", command.receiver_id.to_string())
            })?;

        // 发送者显示信息优先取目录，目录没有时退回令牌里的名称
        let sender = self.directory.find_ref(ctx.tenant_id, ctx.user_id).await?;
        let (sender_name, sender_avatar) = match sender {
            Some(user) => (user.user_name, user.avatar),
            None => (ctx.user_name.clone(), None),
        };

        let now = self.clock.now();
        let message = OnlineMessage::new(
            ctx.tenant_id,
            ctx.user_id,
            sender_name,
            sender_avatar,
            receiver.user_id,
            receiver.user_name,
            command.kind,
            command.content,
            now,
        )?;

        // 持久化必须先于推送
        let message = self.messages.insert(&message).await?;
        self.push_to_receiver(&message).await;

        Ok(message)
    }

    /// 向接收者的全部活跃连接推送，失败只降级不传播
    async fn push_to_receiver(&self, message: &OnlineMessage) {
        let records = match self
            .users
            .find_active_by_user(message.base.tenant_id, message.receiver_id)
            .await
        {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(
                    message_id = %message.base.id,
                    error = %err,
                    "查询接收者连接记录失败，等待离线拉取"
                );
                return;
            }
        };

        let mut delivered = 0usize;
        for record in &records {
            let Some(connection_id) = record.connection_id.as_deref() else {
                continue;
            };
            match self
                .pusher
                .push(connection_id, OutboundEvent::receive_message(message))
                .await
            {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = %err,
                        "实时推送失败，消息已落库等待拉取"
                    );
                }
            }
        }

        tracing::debug!(
            message_id = %message.base.id,
            receiver_id = %message.receiver_id,
            connections = records.len(),
            delivered,
            "消息推送完成"
        );
    }

    /// 标记消息已读
    ///
    /// 未读到已读只发生一次；已读消息上的重复调用是无操作，
    /// 不存在的消息ID返回 NotFound。
    pub async fn mark_read(
        &self,
        ctx: &TenantContext,
        message_id: Uuid,
        reader_ip: Option<String>,
    ) -> ApplicationResult<()> {
        let message = self
            .messages
            .find_by_id(ctx.tenant_id, message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id.to_string()))?;

        if message.read_status != ReadStatus::Unread {
            return Ok(());
        }

        let reader = Reader {
            reader_id: ctx.user_id,
            reader_name: ctx.user_name.clone(),
            reader_ip,
        };
        let now = self.clock.now();
        let transitioned = self
            .messages
            .mark_read(ctx.tenant_id, message_id, &reader, now)
            .await?;
        if !transitioned {
            // 与另一个读取方并发，先到者生效
            tracing::debug!(message_id = %message_id, "消息已被并发标记为已读");
        }
        Ok(())
    }

    /// 某用户的全部未读消息，按发送时间升序，供重连客户端按序补偿
    pub async fn list_unread(
        &self,
        ctx: &TenantContext,
        user_id: Uuid,
    ) -> ApplicationResult<Vec<OnlineMessage>> {
        Ok(self.messages.list_unread(ctx.tenant_id, user_id).await?)
    }

    /// 某用户的未读消息数
    pub async fn unread_count(&self, ctx: &TenantContext, user_id: Uuid) -> ApplicationResult<u64> {
        Ok(self.messages.count_unread(ctx.tenant_id, user_id).await?)
    }

    /// 按ID查询消息
    pub async fn get(
        &self,
        ctx: &TenantContext,
        message_id: Uuid,
    ) -> ApplicationResult<OnlineMessage> {
        self.messages
            .find_by_id(ctx.tenant_id, message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id.to_string()).into())
    }

    /// 消息历史分页查询
    pub async fn history(
        &self,
        ctx: &TenantContext,
        query: MessageQuery,
        pagination: Pagination,
    ) -> ApplicationResult<PaginatedResult<OnlineMessage>> {
        Ok(self
            .messages
            .list_paged(ctx.tenant_id, &query, pagination)
            .await?)
    }
}
