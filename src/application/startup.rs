use std::future::Future;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    application::{
        config::{Args, RuntimeConfig},
        state::SharedState,
    },
    domain::error::DomainError,
    interfaces::http,
};

pub async fn run(args: Args) -> Result<(), DomainError> {
    let config = RuntimeConfig::from_args(args)
        .map_err(|error| DomainError::InvalidRequest(format!("configuration error: {error}")))?;

    init_logging(&config.log_filter, config.json_logs)?;
    let listener = TcpListener::bind(config.bind_addr())
        .await
        .map_err(|error| DomainError::Unavailable(format!("failed to bind listener: {error}")))?;

    let signal = shutdown_signal();
    run_with_listener(listener, config, signal).await
}

pub async fn run_with_listener(
    listener: TcpListener,
    config: RuntimeConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DomainError> {
    let state = SharedState::new(config)?;
    run_with_state(listener, state, shutdown).await
}

/// Serve with a caller-built state; tests use this to swap in a stub
/// session provider.
pub async fn run_with_state(
    listener: TcpListener,
    state: SharedState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DomainError> {
    info!(
        "starting funcbridge host={} port={} invoke_timeout_ms={}",
        state.config().host,
        state.config().port,
        state.config().invoke_timeout.as_millis()
    );

    http::serve(listener, state, shutdown).await
}

fn init_logging(filter: &str, json_logs: bool) -> Result<(), DomainError> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(env_filter).with_target(false);

    if json_logs {
        builder.json().try_init().map_err(|error| {
            DomainError::Unavailable(format!("failed to initialize logger: {error}"))
        })?;
    } else {
        builder.compact().try_init().map_err(|error| {
            DomainError::Unavailable(format!("failed to initialize logger: {error}"))
        })?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
