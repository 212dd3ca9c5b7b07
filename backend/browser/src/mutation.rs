//! Mutation notifications, shaped like a `MutationObserver` callback batch.

/// One observed change to the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<E> {
    /// Nodes were inserted under an observed parent.
    ChildList { added: Vec<AddedNode<E>> },
    /// An attribute changed on an existing element.
    Attributes { target: E, attribute: String },
}

/// An inserted node together with the images found inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct AddedNode<E> {
    pub node: E,
    pub descendant_images: Vec<E>,
}

impl<E> AddedNode<E> {
    pub fn leaf(node: E) -> Self {
        Self { node, descendant_images: Vec::new() }
    }
}

/// Everything delivered in one observer callback.
pub type MutationBatch<E> = Vec<Mutation<E>>;
