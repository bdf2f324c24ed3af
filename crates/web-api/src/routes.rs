//! REST 路由
//!
//! 在线用户与消息两张表的常规查询入口，以及供外部 CRUD 模块
//! 产生通知的消息发送入口。全部返回统一信封。

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, put},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use application::SendMessageCommand;
use domain::{MessageKind, MessageQuery, OnlineMessage, OnlineUser, PaginatedResult, Pagination};

use crate::error::ApiError;
use crate::hub;
use crate::response::ApiResponse;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/signalr/hub", get(hub::hub_upgrade))
        .nest("/api", api_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/online-users", get(list_online_users))
        .route("/messages", get(list_messages).post(send_message))
        .route("/messages/unread", get(list_unread_messages))
        .route("/messages/unread/count", get(unread_count))
        .route("/messages/{message_id}", get(get_message))
        .route("/messages/{message_id}/read", put(mark_message_read))
}

/// 分页查询参数
#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    keyword: Option<String>,
    sender_id: Option<Uuid>,
    receiver_id: Option<Uuid>,
    message_type: Option<String>,
}

impl PageQuery {
    fn pagination(&self) -> Pagination {
        Pagination::new(self.page.unwrap_or(1), self.page_size.unwrap_or(20))
    }
}

/// 分页响应
#[derive(Debug, Serialize)]
struct PageDto<T> {
    items: Vec<T>,
    total: u64,
    page: u32,
    page_size: u32,
    total_pages: u64,
}

impl<T: Serialize> From<PaginatedResult<T>> for PageDto<T> {
    fn from(result: PaginatedResult<T>) -> Self {
        let total_pages = result.total_pages();
        Self {
            items: result.items,
            total: result.total,
            page: result.page,
            page_size: result.page_size,
            total_pages,
        }
    }
}

/// 发送消息请求体
#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    receiver_id: Uuid,
    message_type: String,
    message_content: String,
}

async fn health() -> ApiResponse<&'static str> {
    ApiResponse::ok("up")
}

async fn list_online_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse<PageDto<OnlineUser>>, ApiError> {
    let ctx = state.jwt_service.context_from_headers(&headers)?;
    let page = state
        .presence_service
        .list_active_paged(&ctx, query.keyword.as_deref(), query.pagination())
        .await?;
    Ok(ApiResponse::ok(page.into()))
}

async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse<PageDto<OnlineMessage>>, ApiError> {
    let ctx = state.jwt_service.context_from_headers(&headers)?;
    let kind = match &query.message_type {
        Some(raw) => Some(raw.parse::<MessageKind>().map_err(ApiError::from)?),
        None => None,
    };
    let message_query = MessageQuery {
        sender_id: query.sender_id,
        receiver_id: query.receiver_id,
        kind,
        keyword: query.keyword.clone(),
    };
    let page = state
        .message_service
        .history(&ctx, message_query, query.pagination())
        .await?;
    Ok(ApiResponse::ok(page.into()))
}

async fn list_unread_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<ApiResponse<Vec<OnlineMessage>>, ApiError> {
    let ctx = state.jwt_service.context_from_headers(&headers)?;
    let messages = state.message_service.list_unread(&ctx, ctx.user_id).await?;
    Ok(ApiResponse::ok(messages))
}

async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<ApiResponse<u64>, ApiError> {
    let ctx = state.jwt_service.context_from_headers(&headers)?;
    let count = state
        .message_service
        .unread_count(&ctx, ctx.user_id)
        .await?;
    Ok(ApiResponse::ok(count))
}

async fn get_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<Uuid>,
) -> Result<ApiResponse<OnlineMessage>, ApiError> {
    let ctx = state.jwt_service.context_from_headers(&headers)?;
    let message = state.message_service.get(&ctx, message_id).await?;
    Ok(ApiResponse::ok(message))
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(payload): axum::Json<SendMessagePayload>,
) -> Result<ApiResponse<OnlineMessage>, ApiError> {
    let ctx = state.jwt_service.context_from_headers(&headers)?;
    let kind = payload
        .message_type
        .parse::<MessageKind>()
        .map_err(ApiError::from)?;
    let message = state
        .message_service
        .send(
            &ctx,
            SendMessageCommand {
                receiver_id: payload.receiver_id,
                kind,
                content: payload.message_content,
            },
        )
        .await?;
    Ok(ApiResponse::ok(message))
}

async fn mark_message_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(message_id): Path<Uuid>,
) -> Result<ApiResponse<()>, ApiError> {
    let ctx = state.jwt_service.context_from_headers(&headers)?;
    let reader_ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or(value).trim().to_string());
    state
        .message_service
        .mark_read(&ctx, message_id, reader_ip)
        .await?;
    Ok(ApiResponse::ok_empty())
}
