use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use metrics_exporter_prometheus::PrometheusHandle;

/// Serve Prometheus metrics in text exposition format.
///
/// The handle is absent when another instance in this process already owns
/// the global recorder (several servers booted by the test harness); those
/// instances answer 503 rather than report another server's numbers.
pub async fn serve_metrics(handle: Option<PrometheusHandle>) -> Response {
    match handle {
        Some(handle) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
