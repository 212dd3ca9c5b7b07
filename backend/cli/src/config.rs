use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use glimpse_core::STATUS_PATH;
use glimpse_understanding::{DEFAULT_PROMPT, DEFAULT_VISION_MODEL};
use url::Url;

/// Glimpse runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address
    pub bind_address: String,
    /// HTTP server port
    pub port: u16,
    /// Directory holding one cached analysis per content digest
    pub cache_dir: PathBuf,
    /// Path of the JSON audit log
    pub audit_path: PathBuf,
    /// Relay endpoint used by `analyze`
    pub relay_url: String,
    pub prompt: String,
    pub vision_model: String,
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub upstream_timeout: Duration,
    /// Audit requests served from cache too
    pub audit_cache_hits: bool,
    /// Directory for daily-rolling JSON log files
    pub log_dir: Option<PathBuf>,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3103,
            cache_dir: PathBuf::from("public/cached_responses"),
            audit_path: PathBuf::from("saved_data.json"),
            relay_url: "http://localhost:3103/analyze".to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_api_key: None,
            upstream_timeout: Duration::from_secs(60),
            audit_cache_hits: true,
            log_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_address: var("GLIMPSE_BIND").unwrap_or(defaults.bind_address),
            port: var("GLIMPSE_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            cache_dir: var("GLIMPSE_CACHE_DIR").map(PathBuf::from).unwrap_or(defaults.cache_dir),
            audit_path: var("GLIMPSE_AUDIT_PATH").map(PathBuf::from).unwrap_or(defaults.audit_path),
            relay_url: var("GLIMPSE_RELAY_URL").unwrap_or(defaults.relay_url),
            prompt: var("GLIMPSE_PROMPT").unwrap_or(defaults.prompt),
            vision_model: var("GLIMPSE_VISION_MODEL").unwrap_or(defaults.vision_model),
            openai_base_url: var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            openai_api_key: var("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            upstream_timeout: var("GLIMPSE_UPSTREAM_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            audit_cache_hits: var("GLIMPSE_AUDIT_CACHE_HITS")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.audit_cache_hits),
            log_dir: var("GLIMPSE_LOG_DIR").map(PathBuf::from),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }

    /// Status endpoint of the relay that serves `relay_url`.
    pub fn status_url(&self) -> Result<Url> {
        let relay = Url::parse(&self.relay_url)
            .with_context(|| format!("invalid relay URL {:?}", self.relay_url))?;
        if !matches!(relay.scheme(), "http" | "https") {
            bail!("relay URL {:?} must be http or https", self.relay_url);
        }
        relay
            .join(STATUS_PATH)
            .with_context(|| format!("cannot derive status URL from {:?}", self.relay_url))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
