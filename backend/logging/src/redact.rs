//! Log Redaction
//!
//! Scrubs API keys and bearer tokens, and shortens image references before
//! they reach a log line.

use regex::Regex;
use std::sync::LazyLock;

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-[a-zA-Z0-9_\-]{20,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)").unwrap()
});

/// Maximum characters of an image reference kept in logs.
const IMAGE_REF_PREVIEW: usize = 50;

/// Redacts API keys and bearer tokens in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    API_KEY_RE.replace_all(input, "[REDACTED_TOKEN]").to_string()
}

/// First 50 characters of an image reference followed by `...`.
///
/// Inline `data:` payloads can run to megabytes.
pub fn abbreviate_image_ref(image_ref: &str) -> String {
    match image_ref.char_indices().nth(IMAGE_REF_PREVIEW) {
        Some((cut, _)) => format!("{}...", &image_ref[..cut]),
        None => image_ref.to_string(),
    }
}
