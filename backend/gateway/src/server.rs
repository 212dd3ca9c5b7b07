//! Main HTTP relay server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    routing::any,
};
use glimpse_core::{ANALYZE_PATH, STATUS_PATH};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::analyze;
use crate::cors;
use crate::relay::AnalysisRelay;

/// Inline image payloads are large; the axum default of 2 MiB is not enough.
pub const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub relay: Arc<AnalysisRelay>,
    pub max_body_bytes: usize,
}

impl GatewayState {
    pub fn new(relay: AnalysisRelay) -> Self {
        Self { relay: Arc::new(relay), max_body_bytes: DEFAULT_MAX_BODY_BYTES }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

pub fn build_router(state: GatewayState) -> Router {
    let body_limit = state.max_body_bytes;
    Router::new()
        .route(ANALYZE_PATH, any(analyze::analyze))
        .route(STATUS_PATH, any(analyze::status))
        // Legacy bookmarklet paths.
        .route("/api/gpt-4-vision", any(analyze::analyze))
        .route("/api/vision", any(analyze::analyze))
        .route("/api/status", any(analyze::status))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not Found") })
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(cors::cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
#[instrument(skip(state))]
pub async fn start_server(addr: SocketAddr, state: GatewayState) -> Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Relay listening on {}", listener.local_addr()?);
    serve(listener, state).await
}

pub async fn serve(listener: TcpListener, state: GatewayState) -> Result<()> {
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use glimpse_store::{AuditLog, CacheStore};
    use reqwest::{Client, Method, header::CONTENT_TYPE};
    use serde_json::{Value, json};

    use crate::cors::CORS_HEADERS;
    use crate::relay::tests::CountingVision;

    struct Harness {
        base: String,
        vision: Arc<CountingVision>,
        dir: tempfile::TempDir,
    }

    async fn harness(vision: CountingVision) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let vision = Arc::new(vision);
        let relay = AnalysisRelay::new(
            vision.clone(),
            CacheStore::new(dir.path().join("cached_responses")),
            AuditLog::new(dir.path().join("saved_data.json")),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = build_router(GatewayState::new(relay));
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Harness { base, vision, dir }
    }

    impl Harness {
        fn calls(&self) -> usize {
            self.vision.calls.load(Ordering::SeqCst)
        }

        fn cache_files(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("cached_responses"))
                .map(|d| d.count())
                .unwrap_or(0)
        }

        fn audit_exists(&self) -> bool {
            self.dir.path().join("saved_data.json").exists()
        }
    }

    fn assert_cors(resp: &reqwest::Response) {
        for (name, value) in CORS_HEADERS {
            assert_eq!(resp.headers().get(name.as_str()).unwrap(), value, "header {name}");
        }
    }

    #[tokio::test]
    async fn options_anywhere_is_204_with_cors() {
        let h = harness(CountingVision::default()).await;
        for path in ["/anything", "/analyze", "/status"] {
            let resp = Client::new()
                .request(Method::OPTIONS, format!("{}{path}", h.base))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 204);
            assert_cors(&resp);
        }
    }

    #[tokio::test]
    async fn status_reports_up() {
        let h = harness(CountingVision::default()).await;
        for path in ["/status", "/api/status"] {
            let resp = reqwest::get(format!("{}{path}", h.base)).await.unwrap();
            assert_eq!(resp.status(), 200);
            assert_cors(&resp);
            assert_eq!(resp.text().await.unwrap(), "up");
        }
    }

    #[tokio::test]
    async fn status_answers_any_method() {
        let h = harness(CountingVision::default()).await;
        let client = Client::new();
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let resp = client
                .request(method.clone(), format!("{}/status", h.base))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200, "method {method}");
            assert_cors(&resp);
            assert_eq!(resp.text().await.unwrap(), "up");
        }
    }

    #[tokio::test]
    async fn unknown_path_is_404_with_cors() {
        let h = harness(CountingVision::default()).await;
        let resp = reqwest::get(format!("{}/nope", h.base)).await.unwrap();
        assert_eq!(resp.status(), 404);
        assert_cors(&resp);
    }

    #[tokio::test]
    async fn repeated_image_is_served_from_cache() {
        let h = harness(CountingVision::default()).await;
        let client = Client::new();
        let mut payloads = Vec::new();
        for _ in 0..2 {
            let resp = client
                .post(format!("{}/analyze", h.base))
                .json(&json!({ "imageUrl": "data:image/jpeg;base64,AAAA" }))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
            assert_cors(&resp);
            payloads.push(resp.json::<Value>().await.unwrap());
        }
        assert_eq!(payloads[0], payloads[1]);
        assert_eq!(payloads[0], json!("description of data:image/jpeg;base64,AAAA"));
        assert_eq!(h.calls(), 1);
        assert_eq!(h.cache_files(), 1);
    }

    #[tokio::test]
    async fn legacy_paths_share_the_cache() {
        let h = harness(CountingVision::default()).await;
        let client = Client::new();
        for path in ["/api/gpt-4-vision", "/api/vision", "/analyze"] {
            let resp = client
                .post(format!("{}{path}", h.base))
                .json(&json!({ "imageUrl": "https://img/1.jpg", "position": 3 }))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200, "path {path}");
        }
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test]
    async fn text_plain_is_rejected_without_side_effects() {
        let h = harness(CountingVision::default()).await;
        let resp = Client::new()
            .post(format!("{}/analyze", h.base))
            .header(CONTENT_TYPE, "text/plain")
            .body(r#"{"imageUrl":"https://img/1.jpg"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_cors(&resp);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["reason"], "validation");
        assert!(body["error"].as_str().unwrap().contains("Content-Type"));
        assert_eq!(h.calls(), 0);
        assert_eq!(h.cache_files(), 0);
        assert!(!h.audit_exists());
    }

    #[tokio::test]
    async fn get_on_analyze_is_400() {
        let h = harness(CountingVision::default()).await;
        let resp = reqwest::get(format!("{}/analyze", h.base)).await.unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn upstream_failure_is_500_upstream() {
        let h = harness(CountingVision { fail: true, ..Default::default() }).await;
        let resp = Client::new()
            .post(format!("{}/analyze", h.base))
            .json(&json!({ "imageUrl": "https://img/1.jpg" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        assert_cors(&resp);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["reason"], "upstream");
        assert_eq!(h.cache_files(), 0);
    }

    #[tokio::test]
    async fn concurrent_identical_requests_do_not_corrupt_the_cache() {
        let h = harness(CountingVision { delay: Duration::from_millis(100), ..Default::default() }).await;
        let client = Client::new();
        let send = || {
            client
                .post(format!("{}/analyze", h.base))
                .json(&json!({ "imageUrl": "https://img/same.jpg" }))
                .send()
        };
        let (a, b) = tokio::join!(send(), send());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.status(), 200);
        assert_eq!(b.status(), 200);
        assert_eq!(a.json::<Value>().await.unwrap(), b.json::<Value>().await.unwrap());

        assert!(h.calls() >= 1);
        assert_eq!(h.cache_files(), 1);
        let cached = std::fs::read_dir(h.dir.path().join("cached_responses"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let record: Value = serde_json::from_slice(&std::fs::read(cached).unwrap()).unwrap();
        assert_eq!(record["image_url"], "https://img/same.jpg");
        assert_eq!(record["content"], "description of https://img/same.jpg");
    }

    #[tokio::test]
    async fn large_inline_payloads_fit_under_the_limit() {
        let h = harness(CountingVision::default()).await;
        let big = format!("data:image/jpeg;base64,{}", "A".repeat(3 * 1024 * 1024));
        let resp = Client::new()
            .post(format!("{}/analyze", h.base))
            .json(&json!({ "imageUrl": big }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}
