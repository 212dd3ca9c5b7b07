//! File-backed persistence for the analysis relay.

pub mod audit;
pub mod cache;
pub mod error;
mod fs;

pub use audit::AuditLog;
pub use cache::CacheStore;
pub use error::StoreError;
