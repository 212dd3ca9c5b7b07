//! Host document interface and an in-memory arena document.
//!
//! [`Document`] records mutation batches the way a browser's mutation
//! observer would (child-list insertions under the body subtree and attribute
//! changes on connected nodes). Embedders that drive a real browser implement
//! [`HostDocument`] for their own element handles instead.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::element::{Dimensions, ElementLike};
use crate::mutation::{AddedNode, Mutation, MutationBatch};

/// Read access to the observed document.
pub trait HostDocument {
    type Element: ElementLike;

    /// Every `<img>` in the document, in document order.
    fn images(&self) -> Vec<Self::Element>;
}

impl<D: HostDocument> HostDocument for std::sync::Mutex<D> {
    type Element = D::Element;

    fn images(&self) -> Vec<D::Element> {
        match self.lock() {
            Ok(doc) => doc.images(),
            Err(poisoned) => poisoned.into_inner().images(),
        }
    }
}

pub type NodeId = usize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("cannot insert node {child} under its own descendant {parent}")]
    HierarchyRequest { parent: NodeId, child: NodeId },
}

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    dimensions: Option<Dimensions>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Owned view of one element at the moment it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub id: NodeId,
    pub tag: String,
    pub src: Option<String>,
    pub classes: Vec<String>,
    pub dimensions: Option<Dimensions>,
}

impl ElementLike for ElementSnapshot {
    fn tag_name(&self) -> &str {
        &self.tag
    }

    fn source_reference(&self) -> Option<&str> {
        self.src.as_deref()
    }

    fn attributes(&self) -> Vec<&str> {
        self.classes.iter().map(String::as_str).collect()
    }

    fn dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }
}

pub struct Document {
    nodes: Vec<NodeData>,
    pending: MutationBatch<ElementSnapshot>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document holding only an empty `BODY`.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                tag: "BODY".into(),
                attrs: BTreeMap::new(),
                dimensions: None,
                parent: None,
                children: Vec::new(),
            }],
            pending: Vec::new(),
        }
    }

    pub fn body(&self) -> NodeId {
        0
    }

    /// Create a detached element. Detached nodes produce no mutations.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(NodeData {
            tag: tag.to_ascii_uppercase(),
            attrs: BTreeMap::new(),
            dimensions: None,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// Create a detached `<img>` with the given source and class tokens.
    pub fn create_image(&mut self, src: &str, classes: &[&str]) -> NodeId {
        let id = self.create_element("img");
        let node = &mut self.nodes[id];
        node.attrs.insert("src".into(), src.into());
        if !classes.is_empty() {
            node.attrs.insert("class".into(), classes.join(" "));
        }
        id
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.node_mut(id)?.attrs.insert(name.into(), value.into());
        if self.is_connected(id) {
            let target = self.snapshot(id)?;
            self.pending.push(Mutation::Attributes { target, attribute: name.into() });
        }
        Ok(())
    }

    /// Record that an image finished loading at the given size.
    ///
    /// Load completion is not a DOM mutation and is never reported.
    pub fn set_dimensions(&mut self, id: NodeId, dimensions: Dimensions) -> Result<(), DomError> {
        self.node_mut(id)?.dimensions = Some(dimensions);
        Ok(())
    }

    /// Move `child` to the end of `parent`'s children.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.node(parent)?;
        self.node(child)?;
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }

        if let Some(old_parent) = self.nodes[child].parent.take() {
            self.nodes[old_parent].children.retain(|&c| c != child);
        }
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);

        if self.is_connected(parent) {
            let node = self.snapshot(child)?;
            let mut descendant_images = Vec::new();
            for &c in &self.nodes[child].children {
                self.collect_images(c, &mut descendant_images);
            }
            self.pending.push(Mutation::ChildList {
                added: vec![AddedNode { node, descendant_images }],
            });
        }
        Ok(())
    }

    /// Drain the mutations recorded since the previous call, as one batch.
    pub fn take_mutations(&mut self) -> MutationBatch<ElementSnapshot> {
        std::mem::take(&mut self.pending)
    }

    pub fn snapshot(&self, id: NodeId) -> Result<ElementSnapshot, DomError> {
        let node = self.node(id)?;
        Ok(ElementSnapshot {
            id,
            tag: node.tag.clone(),
            src: node.attrs.get("src").cloned(),
            classes: node
                .attrs
                .get("class")
                .map(|c| c.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            dimensions: node.dimensions,
        })
    }

    fn node(&self, id: NodeId) -> Result<&NodeData, DomError> {
        self.nodes.get(id).ok_or(DomError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData, DomError> {
        self.nodes.get_mut(id).ok_or(DomError::UnknownNode(id))
    }

    fn is_connected(&self, id: NodeId) -> bool {
        self.is_inclusive_ancestor(self.body(), id)
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.nodes.get(id).and_then(|n| n.parent) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    fn collect_images(&self, id: NodeId, out: &mut Vec<ElementSnapshot>) {
        let node = &self.nodes[id];
        if node.tag.eq_ignore_ascii_case("img") {
            if let Ok(snapshot) = self.snapshot(id) {
                out.push(snapshot);
            }
        }
        for &child in &node.children {
            self.collect_images(child, out);
        }
    }
}

impl HostDocument for Document {
    type Element = ElementSnapshot;

    fn images(&self) -> Vec<ElementSnapshot> {
        let mut out = Vec::new();
        self.collect_images(self.body(), &mut out);
        out
    }
}
