//! 在线消息实体
//!
//! 两个用户之间的一条定向消息。消息一经存储即不可变，
//! 唯一允许的后续变更是未读到已读的一次性状态转换。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::entity::BaseEntity;
use crate::errors::{DomainError, DomainResult};

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
            MessageKind::System => "system",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "file" => Ok(MessageKind::File),
            "system" => Ok(MessageKind::System),
            other => Err(DomainError::validation(
                "message_type",
                format!("未知的消息类型: {other}"),
            )),
        }
    }
}

/// 已读状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    Unread,
    Read,
    Recalled,
}

impl ReadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStatus::Unread => "unread",
            ReadStatus::Read => "read",
            ReadStatus::Recalled => "recalled",
        }
    }
}

impl fmt::Display for ReadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(ReadStatus::Unread),
            "read" => Ok(ReadStatus::Read),
            "recalled" => Ok(ReadStatus::Recalled),
            other => Err(DomainError::validation(
                "read_status",
                format!("未知的已读状态: {other}"),
            )),
        }
    }
}

/// 标记已读时的读取者信息
#[derive(Debug, Clone, PartialEq)]
pub struct Reader {
    pub reader_id: Uuid,
    pub reader_name: String,
    pub reader_ip: Option<String>,
}

/// 在线消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineMessage {
    #[serde(flatten)]
    pub base: BaseEntity,
    /// 发送者
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    /// 接收者
    pub receiver_id: Uuid,
    pub receiver_name: String,
    /// 消息类型
    pub kind: MessageKind,
    /// 消息内容
    pub content: String,
    /// 发送时间
    pub sent_at: DateTime<Utc>,
    /// 已读状态
    pub read_status: ReadStatus,
    /// 已读时间，仅在转换为已读时设置
    pub read_at: Option<DateTime<Utc>>,
    pub reader_id: Option<Uuid>,
    pub reader_name: Option<String>,
    pub reader_ip: Option<String>,
}

impl OnlineMessage {
    /// 创建一条新消息，内容不能为空
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: Uuid,
        sender_id: Uuid,
        sender_name: impl Into<String>,
        sender_avatar: Option<String>,
        receiver_id: Uuid,
        receiver_name: impl Into<String>,
        kind: MessageKind,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(DomainError::validation("content", "消息内容不能为空"));
        }

        Ok(Self {
            base: BaseEntity::new(tenant_id, Some(sender_id), now),
            sender_id,
            sender_name: sender_name.into(),
            sender_avatar,
            receiver_id,
            receiver_name: receiver_name.into(),
            kind,
            content,
            sent_at: now,
            read_status: ReadStatus::Unread,
            read_at: None,
            reader_id: None,
            reader_name: None,
            reader_ip: None,
        })
    }

    /// 未读到已读的一次性状态转换
    ///
    /// 返回是否发生了转换；已读或已撤回的消息不再变化。
    pub fn mark_read(&mut self, reader: Reader, now: DateTime<Utc>) -> bool {
        if self.read_status != ReadStatus::Unread {
            return false;
        }
        self.read_status = ReadStatus::Read;
        self.read_at = Some(now);
        self.reader_id = Some(reader.reader_id);
        self.reader_name = Some(reader.reader_name);
        self.reader_ip = reader.reader_ip;
        self.base.touch_updated(self.reader_id, now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message(now: DateTime<Utc>) -> OnlineMessage {
        OnlineMessage::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            None,
            Uuid::new_v4(),
            "bob",
            MessageKind::Text,
            "hello",
            now,
        )
        .unwrap()
    }

    fn sample_reader() -> Reader {
        Reader {
            reader_id: Uuid::new_v4(),
            reader_name: "bob".to_string(),
            reader_ip: Some("10.0.0.1".to_string()),
        }
    }

    #[test]
    fn new_message_is_unread() {
        let message = sample_message(Utc::now());
        assert_eq!(message.read_status, ReadStatus::Unread);
        assert!(message.read_at.is_none());
        assert!(message.reader_id.is_none());
    }

    #[test]
    fn empty_content_is_rejected() {
        let result = OnlineMessage::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            None,
            Uuid::new_v4(),
            "bob",
            MessageKind::Text,
            "   ",
            Utc::now(),
        );
        assert!(matches!(
            result,
            Err(DomainError::Validation { field, .. }) if field == "content"
        ));
    }

    #[test]
    fn mark_read_sets_reader_fields_once() {
        let now = Utc::now();
        let mut message = sample_message(now);
        let reader = sample_reader();
        let read_at = now + chrono::Duration::seconds(3);

        assert!(message.mark_read(reader.clone(), read_at));
        assert_eq!(message.read_status, ReadStatus::Read);
        assert_eq!(message.read_at, Some(read_at));
        assert_eq!(message.reader_id, Some(reader.reader_id));
        assert_eq!(message.reader_name.as_deref(), Some("bob"));
        assert_eq!(message.reader_ip.as_deref(), Some("10.0.0.1"));

        // 第二次标记已读没有任何效果
        let second = Reader {
            reader_id: Uuid::new_v4(),
            reader_name: "mallory".to_string(),
            reader_ip: None,
        };
        assert!(!message.mark_read(second, read_at + chrono::Duration::seconds(1)));
        assert_eq!(message.reader_id, Some(reader.reader_id));
        assert_eq!(message.read_at, Some(read_at));
    }

    #[test]
    fn recalled_message_cannot_be_marked_read() {
        let now = Utc::now();
        let mut message = sample_message(now);
        message.read_status = ReadStatus::Recalled;
        assert!(!message.mark_read(sample_reader(), now));
        assert_eq!(message.read_status, ReadStatus::Recalled);
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::File,
            MessageKind::System,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
        assert!("video".parse::<MessageKind>().is_err());
    }
}
