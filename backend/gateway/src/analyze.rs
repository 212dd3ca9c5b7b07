//! `POST /analyze` and `GET /status` handlers.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, header},
};
use glimpse_core::{AnalyzeRequest, STATUS_SENTINEL};
use glimpse_logging::abbreviate_image_ref;
use tracing::{info, warn};

use crate::error::RelayError;
use crate::server::GatewayState;

/// Handler for the analysis endpoint and its legacy aliases.
///
/// Accepts any method so that a wrong one is a 400 like every other
/// malformed request.
pub async fn analyze(
    State(state): State<GatewayState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<String>, RelayError> {
    let request = validate(&method, &headers, &body).inspect_err(|e| {
        warn!(method = %method, error = %e, "Invalid analysis request");
    })?;

    info!(
        src = %abbreviate_image_ref(&request.image_url),
        position = ?request.position,
        "Vision request"
    );
    let analysis = state.relay.analyze(&request.image_url).await?;
    info!(digest = %analysis.digest, source = ?analysis.source, "Vision request served");
    Ok(Json(analysis.content))
}

/// Handler for `GET /status`.
pub async fn status() -> &'static str {
    STATUS_SENTINEL
}

fn validate(method: &Method, headers: &HeaderMap, body: &[u8]) -> Result<AnalyzeRequest, RelayError> {
    if method != Method::POST {
        return Err(RelayError::Validation(format!("expected POST, got {method}")));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case("application/json") {
        return Err(RelayError::Validation(format!(
            "expected Content-Type application/json, got {:?}",
            content_type
        )));
    }

    let request: AnalyzeRequest = serde_json::from_slice(body)
        .map_err(|e| RelayError::Validation(format!("invalid body: {e}")))?;
    if request.image_url.trim().is_empty() {
        return Err(RelayError::Validation("imageUrl must not be empty".into()));
    }
    Ok(request)
}
