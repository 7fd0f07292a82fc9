//! Service-layer error types.
//!
//! `ServiceError` is transport-agnostic. The HTTP crate maps it to status
//! codes and response headers.

use crate::store::StoreError;

/// Service error shared by every transport.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed request input. Detected before any I/O.
    #[error("{0}")]
    BadRequest(String),

    /// Admission control rejected the request.
    #[error("too many requests, retry in {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: u64 },

    /// Missing or invalid credentials on the read path.
    ///
    /// `challenge` is set when no `Basic` credentials were presented at all,
    /// in which case the transport should advertise the scheme.
    #[error("unauthorized")]
    Unauthorized { challenge: bool },

    /// The blob store failed to read or write. The write was not recorded.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::StoreUnavailable(err.to_string())
    }
}
