use crate::server::state::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub policy: String,
    pub setup_mode: bool,
    pub prefetch_off: bool,
    pub active_streams: usize,
    pub known_clients: usize,
    pub uptime_seconds: u64,
}

/// Health check endpoint returning structured JSON diagnostics
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: VERSION,
        policy: state.controls.policy().as_ref().clone(),
        setup_mode: state.controls.setup_mode(),
        prefetch_off: state.controls.prefetch_off(),
        active_streams: state.streams.stream_count(),
        known_clients: state.throughput.client_count(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
