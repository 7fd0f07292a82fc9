//! Pricetrack Server - price experiment tracking service.
//!
//! The core (stats repository, blob stores, rate limiting, auth, metrics)
//! lives in `pricetrack-service`; the REST transport in `pricetrack-http`.
//! This crate wires both together behind a CLI.

pub mod config;

pub use pricetrack_http::{AppState, router, serve};
pub use pricetrack_service::{ServiceConfig, ServiceState};

use config::{Config, ConfigError};
use pricetrack_service::error::ServiceError;
use pricetrack_service::store::StoreError;

/// Startup and maintenance failures surfaced by the binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("invalid host address: {0}")]
    InvalidHost(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the HTTP application state from the parsed configuration.
pub fn build_state(config: &Config) -> Result<AppState, ServerError> {
    let service = ServiceState::new(&config.service_config()?)?;
    Ok(AppState::new(service, config.cors_origins.clone()))
}

/// Deletes the stats document. Returns whether one existed.
pub async fn reset_stats(service: &ServiceState) -> Result<bool, ServerError> {
    let existed = service.stats().exists().await?;
    service.stats().reset().await?;
    Ok(existed)
}
