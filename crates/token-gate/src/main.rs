//! Token Gate
//!
//! Hosts the authorization gate behind HTTP for an API gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use token_gate::config::Config;
use token_gate::gate::TokenGate;
use token_gate::observability::metrics::init_metrics_recorder;
use token_gate::routes::{self, AppState};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Token Gate");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        region = %config.region,
        user_pool_id = %config.user_pool_id,
        jwks_url = %config.jwks_url,
        audience_claim = config.audience_claim.as_str(),
        jwks_cache_ttl_seconds = config.jwks_cache_ttl.as_secs(),
        verify_deadline_ms = config.verify_deadline.as_millis() as u64,
        bind_address = %config.bind_address,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    let gate = Arc::new(TokenGate::from_config(&config));

    // Parse bind address before moving config
    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let state = Arc::new(AppState { gate, config });
    let app = routes::build_routes(state, metrics_handle);

    info!("Token Gate listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Token Gate shutdown complete");

    Ok(())
}

/// `LOG_FORMAT=json` selects JSON output; `RUST_LOG` overrides the filter.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "token_gate=info,gate=info,tower_http=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sigterm) = signal::unix::signal(signal::unix::SignalKind::terminate()) else {
            error!("Cannot listen for SIGTERM");
            return std::future::pending::<()>().await;
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    };
    info!(signal = received, "Shutting down");
}
