//! In-page side of the Glimpse pipeline.
//!
//! Watches a host document for qualifying images, records each distinct image
//! once, and hands new ones to the analysis relay.

pub mod delivery;
pub mod discovery;
pub mod dom;
pub mod element;
pub mod matcher;
pub mod monitor;
pub mod mutation;
pub mod session;

pub use delivery::{DeliveryClient, DeliveryError, ImageSink};
pub use discovery::{DiscoveryAgent, DiscoveryClass, DiscoveryError, TrackedImage};
pub use dom::{Document, DomError, ElementSnapshot, HostDocument, NodeId};
pub use element::{Dimensions, ElementLike};
pub use matcher::{ImageMatcher, MatchRule};
pub use monitor::ChangeMonitor;
pub use mutation::{AddedNode, Mutation, MutationBatch};
pub use session::{SessionError, TrackerConfig, TrackerSession};
