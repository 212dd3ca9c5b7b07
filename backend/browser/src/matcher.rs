//! Image qualification rules.

use std::collections::BTreeSet;

use crate::element::{Dimensions, ElementLike};

/// Class tokens carried by post images on the target site.
pub const DEFAULT_MARKERS: [&str; 3] = ["xz74otr", "xmz0i5r", "x193iq5w"];

/// Inline JPEG payload signature used by the encoding rule.
pub const DEFAULT_ENCODING_PREFIX: &str = "data:image/jpeg";

pub const DEFAULT_MIN_SIZE: Dimensions = Dimensions { width: 50, height: 50 };

/// Which elements count as trackable images. Fixed for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRule {
    /// Every marker must appear in the element's class list.
    Markers(BTreeSet<String>),
    /// Source starts with `prefix`; if the size is already known it must be at
    /// least `min_size` in both dimensions.
    Encoding { prefix: String, min_size: Dimensions },
}

impl MatchRule {
    pub fn markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Markers(markers.into_iter().map(Into::into).collect())
    }

    pub fn encoding(prefix: impl Into<String>, min_size: Dimensions) -> Self {
        Self::Encoding { prefix: prefix.into(), min_size }
    }

    /// The attribute whose changes can turn an existing element into a match.
    pub fn watched_attribute(&self) -> &'static str {
        match self {
            Self::Markers(_) => "class",
            Self::Encoding { .. } => "src",
        }
    }
}

impl Default for MatchRule {
    fn default() -> Self {
        Self::markers(DEFAULT_MARKERS)
    }
}

#[derive(Debug, Clone)]
pub struct ImageMatcher {
    rule: MatchRule,
}

impl ImageMatcher {
    pub fn new(rule: MatchRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    pub fn matches<E: ElementLike + ?Sized>(&self, element: &E) -> bool {
        if !element.is_image() {
            return false;
        }
        match &self.rule {
            MatchRule::Markers(required) => {
                let present = element.attributes();
                required.iter().all(|m| present.contains(&m.as_str()))
            }
            MatchRule::Encoding { prefix, min_size } => {
                let Some(src) = element.source_reference() else {
                    return false;
                };
                src.starts_with(prefix.as_str())
                    && element.dimensions().map_or(true, |d| d.at_least(*min_size))
            }
        }
    }
}
