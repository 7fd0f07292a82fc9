//! HTTP application state: wraps `ServiceState` with HTTP-specific fields.
//!
//! `AppState` provides transparent access to all `ServiceState` methods
//! via `Deref`, and adds transport-specific config like CORS origins.

use std::ops::Deref;
use std::sync::Arc;

use pricetrack_service::ServiceState;

/// Shared HTTP application state, cloneable across handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppInner>,
}

struct AppInner {
    service: ServiceState,
    cors_origins: Vec<String>,
}

impl Deref for AppState {
    type Target = ServiceState;

    fn deref(&self) -> &ServiceState {
        &self.inner.service
    }
}

impl AppState {
    /// Creates a new HTTP application state.
    pub fn new(service: ServiceState, cors_origins: Vec<String>) -> Self {
        Self {
            inner: Arc::new(AppInner {
                service,
                cors_origins,
            }),
        }
    }

    /// Creates an in-memory application state (for tests and ephemeral use).
    pub fn new_in_memory() -> Self {
        Self::new(ServiceState::new_in_memory(), vec![])
    }

    /// Creates an in-memory state with basic auth enabled (for tests).
    pub fn new_in_memory_with_basic_auth(user: String, password: String) -> Self {
        Self::new(
            ServiceState::new_in_memory_with_basic_auth(user, password),
            vec![],
        )
    }

    /// Returns the configured CORS allowed origins.
    pub fn cors_origins(&self) -> &[String] {
        &self.inner.cors_origins
    }

    /// Returns a reference to the underlying service state.
    pub fn service(&self) -> &ServiceState {
        &self.inner.service
    }
}
