use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing X-API-Key header")]
    MissingApiKey,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("service or scope not found, or scope not allowed")]
    UnknownServiceOrScope,

    #[error("unknown request id")]
    RequestNotFound,

    #[error("vault error: {0}")]
    VaultFetch(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::MissingApiKey => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "missing_api_key",
                "missing X-API-Key header".to_string(),
            ),
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_api_key",
                "invalid API key".to_string(),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                "rate_limit_exceeded",
                "rate limit exceeded".to_string(),
            ),
            AppError::UnknownServiceOrScope => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "unknown_service_or_scope",
                "service or scope not found, or scope not allowed".to_string(),
            ),
            AppError::RequestNotFound => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                "unknown_request",
                "unknown request id".to_string(),
            ),
            AppError::VaultFetch(e) => {
                tracing::error!("vault fetch failed: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "vault_error",
                    "vault_fetch_failed",
                    "credential could not be fetched from the vault".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        let mut response = (status, body).into_response();

        // Add Retry-After header for rate limit errors
        if matches!(self, AppError::RateLimited) {
            response
                .headers_mut()
                .insert("retry-after", axum::http::HeaderValue::from_static("60"));
        }

        response
    }
}
