//! Ordered, deduplicated record of images seen in one tracking session.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use glimpse_logging::abbreviate_image_ref;

use crate::dom::HostDocument;
use crate::element::{Dimensions, ElementLike};
use crate::matcher::ImageMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryClass {
    /// Present when the session started.
    PreExisting,
    /// Arrived after the initial scan.
    NewlyArrived,
}

/// An image the agent has seen. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedImage {
    pub source: String,
    pub position: usize,
    pub dimensions: Option<Dimensions>,
    pub class: DiscoveryClass,
}

impl TrackedImage {
    pub fn is_new(&self) -> bool {
        self.class == DiscoveryClass::NewlyArrived
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("discovery agent already initialized; reset it first")]
    AlreadyInitialized,
}

#[derive(Debug, Default)]
pub struct DiscoveryAgent {
    images: Vec<TrackedImage>,
    seen: HashSet<String>,
    initial_count: usize,
    initialized: bool,
}

impl DiscoveryAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the document once and mark everything found as pre-existing.
    ///
    /// Returns the number of images tracked at start.
    pub fn initialize<D: HostDocument>(
        &mut self,
        document: &D,
        matcher: &ImageMatcher,
    ) -> Result<usize, DiscoveryError> {
        if self.initialized {
            return Err(DiscoveryError::AlreadyInitialized);
        }
        for element in document.images() {
            if matcher.matches(&element) {
                self.consider(&element);
            }
        }
        self.initial_count = self.images.len();
        self.initialized = true;
        debug!(initial_count = self.initial_count, "Discovery agent initialized");
        Ok(self.initial_count)
    }

    /// Track `element` unless its source is already known.
    ///
    /// Identity is the exact source string. Elements without a source are
    /// ignored.
    pub fn consider<E: ElementLike + ?Sized>(&mut self, element: &E) -> Option<TrackedImage> {
        let source = element.source_reference()?;
        if self.seen.contains(source) {
            return None;
        }

        let position = self.images.len();
        let class = if self.initialized && position >= self.initial_count {
            DiscoveryClass::NewlyArrived
        } else {
            DiscoveryClass::PreExisting
        };
        let image = TrackedImage {
            source: source.to_string(),
            position,
            dimensions: element.dimensions(),
            class,
        };
        debug!(
            src = %abbreviate_image_ref(source),
            position,
            class = ?class,
            "Tracked image"
        );
        self.seen.insert(image.source.clone());
        self.images.push(image.clone());
        Some(image)
    }

    pub fn reset(&mut self) {
        self.images.clear();
        self.seen.clear();
        self.initial_count = 0;
        self.initialized = false;
    }

    pub fn images(&self) -> &[TrackedImage] {
        &self.images
    }

    pub fn initial_count(&self) -> usize {
        self.initial_count
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::matcher::MatchRule;

    fn matcher() -> ImageMatcher {
        ImageMatcher::new(MatchRule::markers(["m"]))
    }

    fn attach(doc: &mut Document, src: &str, classes: &[&str]) -> usize {
        let img = doc.create_image(src, classes);
        doc.append_child(doc.body(), img).unwrap();
        img
    }

    #[test]
    fn initial_scan_marks_pre_existing() {
        let mut doc = Document::new();
        attach(&mut doc, "a", &["m"]);
        attach(&mut doc, "b", &[]);
        attach(&mut doc, "c", &["m"]);

        let mut agent = DiscoveryAgent::new();
        assert_eq!(agent.initialize(&doc, &matcher()), Ok(2));
        assert_eq!(agent.initial_count(), 2);
        assert!(agent.images().iter().all(|i| i.class == DiscoveryClass::PreExisting));
        assert_eq!(agent.images()[1].source, "c");
        assert_eq!(agent.images()[1].position, 1);
    }

    #[test]
    fn later_images_are_new_and_positions_increase() {
        let mut doc = Document::new();
        attach(&mut doc, "a", &["m"]);
        let mut agent = DiscoveryAgent::new();
        agent.initialize(&doc, &matcher()).unwrap();

        let img = doc.create_image("b", &["m"]);
        let tracked = agent.consider(&doc.snapshot(img).unwrap()).unwrap();
        assert_eq!(tracked.position, 1);
        assert!(tracked.is_new());
    }

    #[test]
    fn duplicate_sources_are_ignored() {
        let mut doc = Document::new();
        let first = attach(&mut doc, "a", &["m"]);
        let mut agent = DiscoveryAgent::new();
        agent.initialize(&doc, &matcher()).unwrap();

        // A different element with the same source is the same image.
        let twin = doc.create_image("a", &["m"]);
        assert!(agent.consider(&doc.snapshot(first).unwrap()).is_none());
        assert!(agent.consider(&doc.snapshot(twin).unwrap()).is_none());
        assert_eq!(agent.len(), 1);
        assert_eq!(agent.images()[0].class, DiscoveryClass::PreExisting);
    }

    #[test]
    fn sourceless_elements_are_skipped() {
        let mut doc = Document::new();
        let img = doc.create_element("img");
        let mut agent = DiscoveryAgent::new();
        assert!(agent.consider(&doc.snapshot(img).unwrap()).is_none());
        assert!(agent.is_empty());
    }

    #[test]
    fn double_initialize_is_rejected_until_reset() {
        let doc = Document::new();
        let mut agent = DiscoveryAgent::new();
        agent.initialize(&doc, &matcher()).unwrap();
        assert_eq!(agent.initialize(&doc, &matcher()), Err(DiscoveryError::AlreadyInitialized));

        agent.reset();
        assert!(!agent.is_initialized());
        assert_eq!(agent.initialize(&doc, &matcher()), Ok(0));
    }

    #[test]
    fn reset_forgets_sources() {
        let mut doc = Document::new();
        let img = attach(&mut doc, "a", &["m"]);
        let mut agent = DiscoveryAgent::new();
        agent.initialize(&doc, &matcher()).unwrap();
        agent.reset();
        agent.initialize(&Document::new(), &matcher()).unwrap();

        let again = agent.consider(&doc.snapshot(img).unwrap()).unwrap();
        assert_eq!(again.position, 0);
        assert!(again.is_new());
    }
}
