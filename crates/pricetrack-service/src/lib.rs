//! Pricetrack Service: core logic for the price experiment tracking service.
//!
//! This crate contains all transport-agnostic pieces:
//! blob store adapters, the stats repository, the per-client rate limiter,
//! basic-auth verification and metrics.
//!
//! The HTTP transport (`pricetrack-http`) depends on this crate and
//! provides the protocol-specific adapter.
//!
//! **Zero transport dependencies**: no axum, no routing code.

pub mod auth;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod stats;
pub mod store;
pub mod track;

use std::sync::Arc;
use std::time::{Duration, Instant};

use auth::AuthProvider;
use metrics::Metrics;
use rate_limit::RateLimiter;
use stats::{DEFAULT_STATS_KEY, StatsRepository, WriteMode};
use store::{BlobStore, MemoryStore, StoreConfig, StoreError};

/// Configuration subset relevant to the service layer.
///
/// Transport-specific config (ports, CORS origins) stays in the binary
/// crate's `Config` struct.
pub struct ServiceConfig {
    pub store: StoreConfig,
    pub stats_key: String,
    pub store_timeout: u64,
    pub write_mode: WriteMode,
    pub rate_limit: u64,
    pub rate_limit_window: u64,
    pub auth_user: Option<String>,
    pub auth_password: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::Memory,
            stats_key: DEFAULT_STATS_KEY.to_string(),
            store_timeout: 10,
            write_mode: WriteMode::LastWriterWins,
            rate_limit: 20,
            rate_limit_window: 60,
            auth_user: None,
            auth_password: None,
        }
    }
}

/// Shared service state, cloneable across all transport handlers.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<Inner>,
}

struct Inner {
    stats: StatsRepository,
    rate_limiter: RateLimiter,
    metrics: Metrics,
    auth: Option<AuthProvider>,
    start_time: Instant,
}

impl ServiceState {
    /// Creates a new service state from config, opening the configured store.
    pub fn new(config: &ServiceConfig) -> Result<Self, StoreError> {
        let store = store::open(&config.store)?;
        Ok(Self::with_store(config, store))
    }

    /// Creates a service state around an already-built store.
    pub fn with_store(config: &ServiceConfig, store: Arc<dyn BlobStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                stats: StatsRepository::new(
                    store,
                    config.stats_key.clone(),
                    Duration::from_secs(config.store_timeout),
                    config.write_mode,
                ),
                rate_limiter: RateLimiter::new(
                    config.rate_limit,
                    Duration::from_secs(config.rate_limit_window),
                ),
                metrics: Metrics::new(),
                auth: AuthProvider::new(config.auth_user.clone(), config.auth_password.clone()),
                start_time: Instant::now(),
            }),
        }
    }

    /// Creates an in-memory service state (for tests and ephemeral use).
    pub fn new_in_memory() -> Self {
        Self::with_store(&ServiceConfig::default(), Arc::new(MemoryStore::new()))
    }

    /// Creates an in-memory state with basic auth enabled (for tests).
    pub fn new_in_memory_with_basic_auth(user: String, password: String) -> Self {
        let config = ServiceConfig {
            auth_user: Some(user),
            auth_password: Some(password),
            ..ServiceConfig::default()
        };
        Self::with_store(&config, Arc::new(MemoryStore::new()))
    }

    // --- Accessors ---

    pub fn stats(&self) -> &StatsRepository {
        &self.inner.stats
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    pub fn auth(&self) -> Option<&AuthProvider> {
        self.inner.auth.as_ref()
    }

    pub fn has_auth(&self) -> bool {
        self.inner.auth.is_some()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    // --- Maintenance ---

    /// Evict idle rate limiter entries. Returns count removed.
    pub fn cleanup_rate_limits(&self) -> usize {
        self.inner.rate_limiter.cleanup()
    }

    /// Render Prometheus metrics with live gauges filled in.
    pub fn render_metrics(&self) -> String {
        self.inner
            .metrics
            .render(self.inner.rate_limiter.len(), self.uptime_secs())
    }
}
