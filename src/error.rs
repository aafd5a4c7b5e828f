use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Domain-specific error types for Helmsman
#[derive(Error, Debug)]
pub enum HelmsmanError {
    #[error("failed to fetch from upstream: {0}")]
    UpstreamFetch(#[from] reqwest::Error),

    #[error("upstream transfer exceeded the request deadline")]
    UpstreamTimeout,

    #[error("failed to parse DASH MPD: {0}")]
    MpdParse(String),

    #[error("failed to serialize DASH MPD: {0}")]
    MpdSerialize(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

// Implement IntoResponse for HelmsmanError to handle HTTP responses
impl IntoResponse for HelmsmanError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            HelmsmanError::UpstreamFetch(ref e) => {
                tracing::error!("Upstream fetch error: {:?}", e);
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            HelmsmanError::UpstreamTimeout => {
                tracing::error!("Upstream transfer timed out");
                (StatusCode::GATEWAY_TIMEOUT, self.to_string())
            }
            HelmsmanError::MpdParse(ref e) => {
                tracing::error!("MPD parse error: {}", e);
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            HelmsmanError::MpdSerialize(ref e) => {
                tracing::error!("MPD serialize error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            HelmsmanError::Config(ref e) => {
                tracing::error!("Configuration error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            HelmsmanError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        (status, error_message).into_response()
    }
}

// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, HelmsmanError>;
