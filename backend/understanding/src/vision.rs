//! Vision understanding: describe an image reference with a vision LLM.
//!
//! The reference (an http(s) URL or an inline `data:` URL) is forwarded to the
//! provider as-is; nothing is downloaded here.
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

pub const DEFAULT_PROMPT: &str = "Describe this image in detail";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Result of one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionAnalysis {
    /// First choice message content.
    pub content: String,
    /// The full provider response.
    pub response: serde_json::Value,
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn describe(&self, image_ref: &str) -> Result<VisionAnalysis>;
}

/// OpenAI-compatible chat-completions vision provider.
pub struct OpenAiVision {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    prompt: String,
}

impl OpenAiVision {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_VISION_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Bound every upstream call.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build vision HTTP client")?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl VisionProvider for OpenAiVision {
    fn name(&self) -> &str {
        "openai"
    }

    async fn describe(&self, image_ref: &str) -> Result<VisionAnalysis> {
        info!("[Vision] Describing image via OpenAI {}", self.model);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": self.prompt },
                    { "type": "image_url", "image_url": { "url": image_ref } }
                ]
            }]
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("OpenAI vision request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!(
                "OpenAI vision error {}: {}",
                status,
                resp.text().await.unwrap_or_default()
            );
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .context("Failed to parse OpenAI vision response")?;
        let Some(content) = json["choices"][0]["message"]["content"].as_str() else {
            bail!("OpenAI vision response has no choices[0].message.content");
        };
        debug!(chars = content.len(), "[Vision] Description received");

        Ok(VisionAnalysis {
            content: content.to_string(),
            response: json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use serde_json::{Value, json};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/v1")
    }

    async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer test-key");
        let parts = &body["messages"][0]["content"];
        if !authorized || parts[0]["text"] != DEFAULT_PROMPT || body["model"] != "vision-test" {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad request shape" })));
        }
        let url = parts[1]["image_url"]["url"].as_str().unwrap_or_default();
        (
            StatusCode::OK,
            Json(json!({
                "id": "chatcmpl-1",
                "choices": [{ "index": 0, "message": { "role": "assistant", "content": format!("saw {url}") } }]
            })),
        )
    }

    #[tokio::test]
    async fn sends_prompt_and_image_and_extracts_content() {
        let base = spawn(Router::new().route("/v1/chat/completions", post(completions))).await;
        let provider = OpenAiVision::new("test-key")
            .with_model("vision-test")
            .with_base_url(format!("{base}/"));

        let analysis = provider.describe("https://img/cat.jpg").await.unwrap();
        assert_eq!(analysis.content, "saw https://img/cat.jpg");
        assert_eq!(analysis.response["id"], "chatcmpl-1");
    }

    #[tokio::test]
    async fn non_success_is_an_error() {
        let base = spawn(Router::new().route("/v1/chat/completions", post(completions))).await;
        let provider = OpenAiVision::new("wrong-key").with_model("vision-test").with_base_url(base);

        let err = provider.describe("https://img/cat.jpg").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let provider = OpenAiVision::new("k").with_base_url(spawn(app).await);
        assert!(provider.describe("x").await.is_err());
    }

    #[tokio::test]
    async fn timeout_bounds_a_hung_upstream() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let provider = OpenAiVision::new("k")
            .with_base_url(spawn(app).await)
            .with_timeout(Duration::from_millis(100))
            .unwrap();
        assert!(provider.describe("x").await.is_err());
    }
}
