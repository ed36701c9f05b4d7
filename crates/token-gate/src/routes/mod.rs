//! HTTP routes for the token gate.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::gate::TokenGate;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Headroom above the verification deadline before the HTTP layer gives up.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The gate every authorization runs through.
    pub gate: Arc<TokenGate>,

    /// Service configuration.
    pub config: Config,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/v1/authorize` - Authorize one gateway event
/// - `/health` - Liveness probe (simple "OK")
/// - `/metrics` - Prometheus metrics endpoint
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - Request timeout a few seconds above the verification deadline
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let request_timeout = state.config.verify_deadline + REQUEST_TIMEOUT_MARGIN;

    let gate_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/v1/authorize", post(handlers::authorize))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    gate_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(http_metrics_middleware))
}
