pub mod handlers;
pub mod state;

use crate::config::Config;
use axum::{
    Router,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use state::AppState;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};
use tracing::{error, info};

/// Build the proxy router for an application state.
///
/// Shared by `start` and the e2e tests, which boot several instances in
/// one process; only the first gets the process-global metrics recorder.
pub fn build_router(state: AppState) -> Router {
    let prometheus_handle = PrometheusBuilder::new().install_recorder().ok();

    // CORS: always permissive — manifests and segments must be fetchable
    // from any web player origin (dash.js, Shaka, etc.)
    let cors = CorsLayer::very_permissive();

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/metrics",
            get({
                let handle = prometheus_handle.clone();
                move || handlers::metrics::serve_metrics(handle)
            }),
        )
        .route("/settings", post(handlers::settings::update_settings))
        // everything else is proxy traffic
        .fallback(handlers::proxy::proxy_request)
        .layer(cors)
        // a panicking handler becomes a logged 500; the process keeps serving
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Start the Axum HTTP server
pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let listen = config.listen.clone();

    // Create shared application state
    let state = AppState::new(config);

    // Periodic occupancy logging and gauge refresh
    let streams = state.streams.clone();
    let throughput = state.throughput.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let stream_count = streams.stream_count();
            let client_count = throughput.client_count();
            crate::metrics::set_active_streams(stream_count);
            crate::metrics::set_known_clients(client_count);
            info!(
                "Steering state: {} streams, {} clients",
                stream_count, client_count
            );
        }
    });

    let app = build_router(state);

    // Bind TCP listener
    let listener = match tokio::net::TcpListener::bind(listen.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(
                "Failed to bind to {}: {}. Is the address already in use?",
                listen, e
            );
            return Err(e.into());
        }
    };

    info!("Proxy bound to {}", listen);
    info!("  Health:   http://{}/health", listen);
    info!("  Metrics:  http://{}/metrics", listen);
    info!("  Settings: POST http://{}/settings", listen);

    // Start serving with graceful shutdown
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
