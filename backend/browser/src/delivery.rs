//! Relay delivery client.
//!
//! One delivery is an advisory CORS preflight followed by the real POST.
//! Preflight failures are logged and otherwise ignored; the relay is expected
//! to be permissive.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method};
use thiserror::Error;
use tracing::{debug, warn};

use glimpse_core::AnalyzeRequest;
use glimpse_logging::abbreviate_image_ref;

use crate::discovery::TrackedImage;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("relay returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("relay response is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Destination for discovered images.
#[async_trait]
pub trait ImageSink: Send + Sync {
    async fn deliver(&self, image: &TrackedImage) -> Result<serde_json::Value, DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: Client,
    endpoint: String,
    send_position: bool,
}

impl DeliveryClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            send_position: false,
        }
    }

    /// Include the discovery position in each request body.
    pub fn with_position(mut self, send_position: bool) -> Self {
        self.send_position = send_position;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Preflight then POST `request`, returning the relay's JSON payload.
    pub async fn send(&self, request: &AnalyzeRequest) -> Result<serde_json::Value, DeliveryError> {
        self.preflight().await;

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DeliveryError::Status { status: status.as_u16(), body });
        }
        serde_json::from_str(&body).map_err(DeliveryError::Decode)
    }

    async fn preflight(&self) {
        let result = self
            .client
            .request(Method::OPTIONS, &self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                debug!(endpoint = %self.endpoint, "Preflight ok");
            }
            Ok(resp) => {
                warn!(endpoint = %self.endpoint, status = %resp.status(), "Preflight rejected; sending anyway");
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Preflight failed; sending anyway");
            }
        }
    }
}

#[async_trait]
impl ImageSink for DeliveryClient {
    async fn deliver(&self, image: &TrackedImage) -> Result<serde_json::Value, DeliveryError> {
        let mut request = AnalyzeRequest::new(image.source.clone());
        if self.send_position {
            request = request.with_position(image.position as u64);
        }
        debug!(
            src = %abbreviate_image_ref(&image.source),
            position = image.position,
            "Delivering image"
        );
        self.send(&request).await
    }
}
