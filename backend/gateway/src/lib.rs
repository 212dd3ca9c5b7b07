//! Glimpse analysis relay.
//!
//! Accepts image references from the discovery agent, analyzes each distinct
//! image content once, and keeps the cache and audit trail.

pub mod analyze;
pub mod cors;
pub mod error;
pub mod relay;
pub mod server;

pub use error::RelayError;
pub use relay::{Analysis, AnalysisRelay, AnalysisSource};
pub use server::{GatewayState, build_router, serve, start_server};
