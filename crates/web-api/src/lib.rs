//! Web API 层
//!
//! 实时 Hub（WebSocket）与常规 REST 查询两套入口，共享同一组
//! 应用服务。认证由 bearer token 中间件式的 JWT 校验完成。

pub mod auth;
pub mod connections;
pub mod error;
pub mod hub;
pub mod response;
pub mod routes;
pub mod state;

pub use auth::{Claims, JwtService};
pub use connections::HubConnections;
pub use error::ApiError;
pub use response::ApiResponse;
pub use routes::router;
pub use state::AppState;
