use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{DomainError, RepositoryError};

use crate::response::ApiResponse;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    // 便利方法
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::NotFound { resource, id } => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{resource} {id} not found"),
            ),
            DomainError::Conflict { message } => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", message)
            }
            DomainError::Validation { field, message } => ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                format!("{field}: {message}"),
            ),
            DomainError::Unauthorized { message } => {
                ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
            }
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(domain_err) => domain_err.into(),
            ApplicationError::Repository(repo_err) => match repo_err {
                RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                RepositoryError::Conflict => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
                }
                RepositoryError::Storage { message } => ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    format!("database error: {message}"),
                ),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::fail(self.code, self.message);
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_status() {
        let err: ApiError = DomainError::not_found("message", "m1").into();
        assert_eq!(err.code(), "NOT_FOUND");

        let err: ApiError = DomainError::conflict("duplicate connection").into();
        assert_eq!(err.code(), "CONFLICT");

        let err: ApiError = DomainError::validation("message_type", "unknown").into();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn repository_storage_maps_to_internal() {
        let err: ApiError =
            ApplicationError::Repository(RepositoryError::storage("connection refused")).into();
        assert_eq!(err.code(), "DATABASE_ERROR");
    }
}
