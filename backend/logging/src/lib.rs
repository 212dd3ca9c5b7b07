//! Structured logging for Glimpse.
//!
//! Console plus optional rolling NDJSON file output, and scrubbing helpers for
//! secrets and oversized image references.

pub mod logger;
pub mod redact;

pub use logger::init_logger;
pub use redact::{abbreviate_image_ref, redact_sensitive_data};
