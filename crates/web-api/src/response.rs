//! 统一响应信封
//!
//! 所有 REST 路由返回同一个信封结构：
//! `{success, code, message, data, timestamp, requestId, error}`。

use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// 统一响应信封
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            code: "OK".to_string(),
            message: "success".to_string(),
            data: Some(data),
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    /// 无数据的成功响应
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            code: "OK".to_string(),
            message: "success".to_string(),
            data: None,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
            error: None,
        }
    }

    /// 失败响应
    pub fn fail(code: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            code: code.into(),
            message: message.clone(),
            data: None,
            timestamp: Utc::now(),
            request_id: Uuid::new_v4(),
            error: Some(message),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
