//! HTTP error type: maps `ServiceError` to status codes, headers and JSON
//! error bodies.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use pricetrack_service::error::ServiceError;

/// Realm advertised in the `WWW-Authenticate` challenge.
pub const AUTH_REALM: &str = "price-tracking";

/// API error returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request input.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid Basic credentials.
    #[error("unauthorized")]
    Unauthorized { challenge: bool },

    /// Write rejected by the per-client rate limiter.
    #[error("too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    /// Method not supported on this resource.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// The blob store could not be read or written.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::BadRequest(msg) => ApiError::BadRequest(msg),
            ServiceError::Unauthorized { challenge } => ApiError::Unauthorized { challenge },
            ServiceError::TooManyRequests { retry_after_secs } => {
                ApiError::TooManyRequests { retry_after_secs }
            }
            ServiceError::StoreUnavailable(msg) => ApiError::StoreUnavailable(msg),
            ServiceError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    /// Error code (e.g. "bad_request", "too_many_requests", "internal_error").
    pub(crate) error: String,
    /// Human-readable error detail, if available.
    pub(crate) detail: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match &self {
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            ApiError::Unauthorized { .. } => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                Some("Authentication required".to_string()),
            ),
            ApiError::TooManyRequests { retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "too_many_requests",
                Some(format!(
                    "Too many requests, please try again in {retry_after_secs} seconds"
                )),
            ),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                Some("Method not allowed".to_string()),
            ),
            ApiError::StoreUnavailable(msg) => {
                tracing::error!(%msg, "tracking store unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    Some("Tracking data is temporarily unavailable".to_string()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(%msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorBody {
            error: error.to_string(),
            detail,
        };
        let mut response = (status, axum::Json(body)).into_response();

        match self {
            ApiError::TooManyRequests { retry_after_secs } => {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            }
            ApiError::Unauthorized { challenge: true } => {
                let challenge = format!("Basic realm=\"{AUTH_REALM}\", charset=\"UTF-8\"");
                if let Ok(value) = HeaderValue::from_str(&challenge) {
                    response
                        .headers_mut()
                        .insert(header::WWW_AUTHENTICATE, value);
                }
            }
            _ => {}
        }

        response
    }
}
