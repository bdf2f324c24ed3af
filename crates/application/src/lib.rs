//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：连接注册表、消息存储与投递、
//! 心跳清扫，以及对外部适配器（连接推送、时钟）的抽象。

pub mod clock;
pub mod error;
pub mod memory;
pub mod message_service;
pub mod presence_service;
pub mod pusher;
pub mod sweeper;

#[cfg(test)]
mod presence_service_tests;
#[cfg(test)]
mod sweeper_tests;

pub use clock::{Clock, SystemClock};
pub use error::{ApplicationError, ApplicationResult};
pub use message_service::{MessageService, MessageServiceDependencies, SendMessageCommand};
pub use presence_service::{PresenceService, RegisterConnection};
pub use pusher::{ConnectionPusher, OutboundEvent, PushError};
pub use sweeper::{HeartbeatSweeper, SweepReport, SweeperConfig};
