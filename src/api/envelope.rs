//! Health and error bodies.
//!
//! Event results, stats and estimates go out bare. `/health` and every
//! failure carry a `meta` block next to either `data` or `error`, so a client
//! can branch on which key is present.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

/// Stamped onto health and error bodies.
#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    /// Crate version of the serving engine
    pub version: &'static str,
}

impl ResponseMeta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        enveloped(StatusCode::OK, Self { data, meta: ResponseMeta::now() })
    }
}

/// Failure classes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    InternalError,
}

impl ErrorCode {
    fn status(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl ApiErrorResponse {
    pub fn with_code(code: ErrorCode, message: impl Into<String>) -> Response {
        let body = Self {
            error: ErrorDetail { code, message: message.into() },
            meta: ResponseMeta::now(),
        };
        enveloped(code.status(), body)
    }

    /// Malformed batch, unknown event type, bad range or platform.
    pub fn bad_request(message: impl Into<String>) -> Response {
        Self::with_code(ErrorCode::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Response {
        Self::with_code(ErrorCode::InternalError, message)
    }
}

fn enveloped<B: Serialize>(status: StatusCode, body: B) -> Response {
    (status, axum::Json(body)).into_response()
}
