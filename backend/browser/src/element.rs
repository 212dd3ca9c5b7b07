//! Element capability interface.
//!
//! The host page is an opaque DOM. Everything the agent needs from an element
//! goes through [`ElementLike`], so any concrete element handle (a CDP node, a
//! wasm-bindgen `HtmlImageElement`, the in-memory [`crate::dom`] snapshot) can
//! be observed.

use serde::{Deserialize, Serialize};

/// Rendered size of an image, known only once it has loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn at_least(&self, min: Dimensions) -> bool {
        self.width >= min.width && self.height >= min.height
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub trait ElementLike {
    /// Tag name as reported by the host (`IMG`, `img`, ...).
    fn tag_name(&self) -> &str;

    /// The `src` of the element, `None` when unset.
    fn source_reference(&self) -> Option<&str>;

    /// Class-list tokens.
    fn attributes(&self) -> Vec<&str>;

    /// `None` until the image has finished loading.
    fn dimensions(&self) -> Option<Dimensions>;

    fn is_image(&self) -> bool {
        self.tag_name().eq_ignore_ascii_case("img")
    }
}

impl<T: ElementLike + ?Sized> ElementLike for &T {
    fn tag_name(&self) -> &str {
        (**self).tag_name()
    }
    fn source_reference(&self) -> Option<&str> {
        (**self).source_reference()
    }
    fn attributes(&self) -> Vec<&str> {
        (**self).attributes()
    }
    fn dimensions(&self) -> Option<Dimensions> {
        (**self).dimensions()
    }
}
