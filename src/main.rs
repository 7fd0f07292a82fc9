//! Pricetrack Server entry point.

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use pricetrack_server::config::{Command, Config, LogFormat};
use pricetrack_server::{AppState, ServerError};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(env_filter).init(),
    }

    let result = match config.command() {
        Command::Serve => run_server(&config).await,
        Command::ResetStats => run_reset(&config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: &Config) -> Result<(), ServerError> {
    let state = pricetrack_server::build_state(config)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        store = state.stats().store().kind(),
        stats_key = state.stats().key(),
        write_mode = ?state.stats().mode(),
        "Pricetrack Server starting",
    );
    if !state.has_auth() {
        tracing::warn!("No read credentials configured; GET /api/track-price will always return 401");
    }

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| ServerError::InvalidHost(config.host.clone()))?;
    let addr = SocketAddr::new(host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    spawn_rate_limit_cleanup(state.clone(), config.rate_limit_window);

    let app = pricetrack_server::router(state);

    tracing::info!(%addr, "Pricetrack Server ready");

    pricetrack_server::serve(listener, app, shutdown_signal()).await?;

    tracing::info!("Pricetrack Server shut down");
    Ok(())
}

/// Periodically drops rate limiter entries whose window has long passed.
fn spawn_rate_limit_cleanup(state: AppState, window_secs: u64) {
    let period = Duration::from_secs(window_secs.max(1));
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            let removed = state.cleanup_rate_limits();
            if removed > 0 {
                tracing::debug!(removed, "Cleaned up idle rate limit entries");
            }
        }
    });
}

async fn run_reset(config: &Config) -> Result<(), ServerError> {
    let state = pricetrack_server::build_state(config)?;
    let existed = pricetrack_server::reset_stats(state.service()).await?;
    tracing::info!(
        key = state.stats().key(),
        existed,
        "Stats document deleted"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install signal handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
