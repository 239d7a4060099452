//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! Caller-level query errors (such as reading someone else's listings) are
//! not `GatewayError`s; they travel inside the query response so they can be
//! diffed and streamed like any other result.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{CollectionKind, SessionId, SubscriptionId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2003,
///     "message": "subscription not found: 4",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category              | HTTP Status                  |
/// |-----------|-----------------------|------------------------------|
/// | 1000–1999 | Validation            | 400 Bad Request              |
/// | 2000–2999 | Not Found / Conflict  | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server                | 500 Internal Server Error    |
/// | 4000–4999 | Access and protocol   | 401 / 403 / 415              |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A marketplace record does not exist.
    #[error("{kind} record not found: {id}")]
    RecordNotFound {
        /// Collection searched.
        kind: CollectionKind,
        /// Missing record id.
        id: i64,
    },

    /// The bearer token does not name a live session.
    #[error("session not found")]
    SessionNotFound,

    /// The session has no subscription with this id.
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    /// The session already has a live event stream.
    #[error("session {0} already has a live event stream")]
    StreamConflict(SessionId),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// No bearer token was presented.
    #[error("session required")]
    SessionRequired,

    /// The session may not perform this operation.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The client cannot consume an incremental event stream.
    #[error("streaming unsupported: client must accept text/event-stream")]
    StreamingUnsupported,
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::RecordNotFound { .. } => 2001,
            Self::SessionNotFound => 2002,
            Self::SubscriptionNotFound(_) => 2003,
            Self::StreamConflict(_) => 2004,
            Self::Internal(_) => 3000,
            Self::SessionRequired => 4001,
            Self::AccessDenied(_) => 4002,
            Self::StreamingUnsupported => 4003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::RecordNotFound { .. } | Self::SubscriptionNotFound(_) => StatusCode::NOT_FOUND,
            Self::StreamConflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SessionNotFound | Self::SessionRequired => StatusCode::UNAUTHORIZED,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::StreamingUnsupported => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization failed: {err}"))
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
