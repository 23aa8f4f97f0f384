//! Error types for pbd-tracker
//!
//! Every handler failure becomes a JSON body
//! `{"error": {"code": "...", "message": "..."}}` with a matching status.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::docparse::ParseError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Request body over the configured upload limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Well-formed request referencing rows that do not exist (422)
    #[error("Unprocessable request: {0}")]
    Unprocessable(String),

    /// Document parser returned an error or an unusable response (502)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Document parser did not answer in time (504)
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// Document parser quota exhausted (429)
    #[error("Upstream quota exceeded: {0}")]
    Quota(String),

    /// Feature not available in this deployment (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<pbd_common::Error> for ApiError {
    fn from(err: pbd_common::Error) -> Self {
        if err.is_foreign_key_violation() {
            return ApiError::Unprocessable(
                "Referenced class, student, subject or DSKP item does not exist".to_string(),
            );
        }
        if err.is_check_violation() {
            return ApiError::BadRequest(err.to_string());
        }
        match err {
            pbd_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            pbd_common::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            pbd_common::Error::Io(e) => ApiError::Io(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(err.body_text());
        }
        ApiError::BadRequest(format!("Malformed multipart body: {}", err.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(rejection.body_text());
        }
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Timeout(_) => ApiError::UpstreamTimeout(err.to_string()),
            ParseError::Quota(_) => ApiError::Quota(err.to_string()),
            ParseError::Network(_) | ParseError::Api { .. } | ParseError::Malformed(_) => {
                ApiError::Upstream(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::Unprocessable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            ApiError::UpstreamTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT"),
            ApiError::Quota(_) => (StatusCode::TOO_MANY_REQUESTS, "UPSTREAM_QUOTA"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        };

        if status.is_server_error() {
            error!(code = error_code, "{}", self);
        }

        let message = match &self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::Unprocessable(msg)
            | ApiError::Upstream(msg)
            | ApiError::UpstreamTimeout(msg)
            | ApiError::Quota(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::Io(err) => err.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
