//! Decides whether a mutation batch warrants a re-scan, and performs it.

use tracing::trace;

use crate::discovery::{DiscoveryAgent, TrackedImage};
use crate::dom::HostDocument;
use crate::element::ElementLike;
use crate::matcher::ImageMatcher;
use crate::mutation::Mutation;

#[derive(Debug, Clone)]
pub struct ChangeMonitor {
    matcher: ImageMatcher,
    watched_attribute: &'static str,
}

impl ChangeMonitor {
    pub fn new(matcher: ImageMatcher) -> Self {
        let watched_attribute = matcher.rule().watched_attribute();
        Self { matcher, watched_attribute }
    }

    pub fn matcher(&self) -> &ImageMatcher {
        &self.matcher
    }

    pub fn watched_attribute(&self) -> &'static str {
        self.watched_attribute
    }

    /// True if any mutation in the batch touches a matching image.
    pub fn is_relevant<E: ElementLike>(&self, batch: &[Mutation<E>]) -> bool {
        batch.iter().any(|mutation| match mutation {
            Mutation::ChildList { added } => added.iter().any(|node| {
                self.matcher.matches(&node.node)
                    || node.descendant_images.iter().any(|img| self.matcher.matches(img))
            }),
            Mutation::Attributes { target, attribute } => {
                attribute == self.watched_attribute && self.matcher.matches(target)
            }
        })
    }

    /// Full document scan. Returns only images not tracked before.
    pub fn rescan<D: HostDocument>(&self, document: &D, agent: &mut DiscoveryAgent) -> Vec<TrackedImage> {
        let found: Vec<_> = document
            .images()
            .iter()
            .filter(|element| self.matcher.matches(*element))
            .filter_map(|element| agent.consider(element))
            .collect();
        trace!(discovered = found.len(), "Re-scan finished");
        found
    }
}
