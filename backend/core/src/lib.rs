//! Core types shared by the Glimpse discovery agent and analysis relay.

pub mod digest;
pub mod message;
pub mod types;

pub use digest::{content_digest, ContentDigest};
pub use message::{AnalyzeRequest, ErrorBody};
pub use types::{AnalysisRecord, AuditEntry};

/// Path of the relay's analysis endpoint.
pub const ANALYZE_PATH: &str = "/analyze";

/// Path of the relay's liveness endpoint.
pub const STATUS_PATH: &str = "/status";

/// Body returned by the status endpoint.
pub const STATUS_SENTINEL: &str = "up";
