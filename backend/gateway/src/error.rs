//! Relay error taxonomy and its HTTP mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use glimpse_core::ErrorBody;
use glimpse_logging::redact_sensitive_data;
use glimpse_store::StoreError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Bad method, content type, or body. Nothing was read or written.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The vision provider failed or returned an unusable response.
    #[error("upstream analysis failed: {0}")]
    Upstream(String),

    /// Cache or audit log I/O failed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) | Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Upstream(_) => "upstream",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = redact_sensitive_data(&self.to_string());
        if status.is_server_error() {
            error!(reason = self.reason(), error = %message, "Analysis request failed");
        }
        let body = ErrorBody { error: message, reason: Some(self.reason().to_string()) };
        (status, Json(body)).into_response()
    }
}
