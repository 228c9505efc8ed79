//! Surface node arena types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to a node in a [`Surface`](super::Surface).
///
/// Handles stay valid after a node is detached; detached nodes remain
/// inspectable so mutation records can still be classified.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    /// Raw arena index.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
    },
    Text(String),
}

/// One node in the arena.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub(crate) fn element(tag: &str) -> Self {
        Self {
            kind: NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attributes: BTreeMap::new(),
            },
            parent: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn text(text: &str) -> Self {
        Self {
            kind: NodeKind::Text(text.to_string()),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Whether this node is an element.
    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }

    /// Lowercase tag name for elements.
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    /// Attribute value for elements.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            NodeKind::Text(_) => None,
        }
    }

    /// Whether the element's `class` attribute lists `class`.
    pub fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .map(|list| list.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}
