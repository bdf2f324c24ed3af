//! PostgreSQL 仓储实现

mod online_message_repository_impl;
mod online_user_repository_impl;
mod user_directory_impl;

pub use online_message_repository_impl::PgOnlineMessageRepository;
pub use online_user_repository_impl::PgOnlineUserRepository;
pub use user_directory_impl::PgUserDirectory;
