use crate::admission::Rejection;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

/// Error response
#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            tier: None,
            retry_after: None,
        }
    }
}

/// Application error types
pub(crate) enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden,
    ServerError(String),
    Rejected(Rejection),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Rejected(Rejection::QuotaExceeded { tier, retry_after }) => {
                let secs = retry_after.as_secs();
                let body = Json(ErrorResponse {
                    error: "rate limit exceeded".to_string(),
                    tier: Some(tier.as_str()),
                    retry_after: Some(secs),
                });
                let mut resp = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                resp.headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                resp
            }
            // One message for every CSRF failure reason
            AppError::Rejected(Rejection::CsrfFailed) | AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::message("invalid or missing CSRF token")),
            )
                .into_response(),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::message(msg))).into_response()
            }
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, Json(ErrorResponse::message(msg))).into_response()
            }
            AppError::ServerError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::message(msg)),
            )
                .into_response(),
        }
    }
}
