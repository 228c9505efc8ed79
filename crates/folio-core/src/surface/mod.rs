//! Rendering surface model.
//!
//! A small arena tree of element and text nodes hanging off one working
//! area. It stands in for the document the editor renders into:
//!
//! - Every structural, attribute and text change to a node connected to the
//!   working area is journaled as a [`MutationRecord`]. Changes to detached
//!   subtrees (a section being composed, a fragment being built) are not.
//! - User events (`input`, `focusin`, keyboard, drag) are queued as
//!   [`SurfaceEvent`]s.
//! - The journal and event queue are drained by the owner (the section
//!   manager's `flush`), never from inside the mutating call.
//!
//! # Concurrency Model
//!
//! Shared as [`SharedSurface`] (`Arc<parking_lot::RwLock<Surface>>`). Guards
//! are held only for the duration of a surface operation; no guard is held
//! while a tool or tune method runs unless that method receives the
//! `&mut Surface` explicitly.

mod mutation;
mod node;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

pub use mutation::{InteractionKind, MutationKind, MutationRecord, SurfaceEvent};
pub use node::{Node, NodeId, NodeKind};

/// Class of the working area element.
pub const WORKING_AREA_CLASS: &str = "folio-redactor";

/// Thread-safe handle to a surface.
pub type SharedSurface = Arc<RwLock<Surface>>;

/// Create a new shared surface with an empty working area.
pub fn shared_surface() -> SharedSurface {
    Arc::new(RwLock::new(Surface::new()))
}

/// Tags whose presence makes a subtree non-empty even without text.
const MEDIA_TAGS: &[&str] = &["img", "iframe", "video", "audio", "source", "input", "textarea", "twitterwidget"];

/// Arena tree with a mutation journal.
#[derive(Debug)]
pub struct Surface {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
    working_area: NodeId,
    journal: Vec<MutationRecord>,
    events: Vec<SurfaceEvent>,
    seq: u64,
    selection: Option<NodeId>,
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface {
    /// Create a surface containing only the working area.
    pub fn new() -> Self {
        let mut surface = Self {
            nodes: HashMap::new(),
            next_id: 0,
            working_area: NodeId(0),
            journal: Vec::new(),
            events: Vec::new(),
            seq: 0,
            selection: None,
        };
        let area = surface.create_element("div");
        if let Some(node) = surface.nodes.get_mut(&area) {
            if let NodeKind::Element { attributes, .. } = &mut node.kind {
                attributes.insert("class".into(), WORKING_AREA_CLASS.into());
            }
        }
        surface.working_area = area;
        surface
    }

    /// The element whose children are section holders.
    pub fn working_area(&self) -> NodeId {
        self.working_area
    }

    // =========================================================================
    // Construction
    // =========================================================================

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(Node::element(tag))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(Node::text(text))
    }

    /// Create a detached element with attributes already set.
    pub fn make(&mut self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
        let mut node = Node::element(tag);
        if let NodeKind::Element { attributes: attrs, .. } = &mut node.kind {
            for (name, value) in attributes {
                attrs.insert((*name).to_string(), (*value).to_string());
            }
        }
        self.alloc(node)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Whether the handle refers to a node of this surface.
    pub fn exists(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.node(id).map(Node::is_element).unwrap_or(false)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id).and_then(Node::tag)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children of a node (empty for unknown nodes).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id).and_then(|n| n.attribute(name))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.node(id).map(|n| n.has_class(class)).unwrap_or(false)
    }

    /// Whether the node hangs off the working area.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(self.working_area, id)
    }

    /// Inclusive descendant test.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// The node itself when it is an element, otherwise its parent element.
    pub fn element_of(&self, id: NodeId) -> Option<NodeId> {
        if self.is_element(id) {
            Some(id)
        } else {
            self.parent(id).filter(|p| self.is_element(*p))
        }
    }

    /// Closest inclusive element ancestor matching `pred`.
    pub fn closest(&self, id: NodeId, pred: impl Fn(&Node) -> bool) -> Option<NodeId> {
        let mut current = self.element_of(id);
        while let Some(el) = current {
            if self.node(el).map(&pred).unwrap_or(false) {
                return Some(el);
            }
            current = self.parent(el);
        }
        None
    }

    /// Closest inclusive element ancestor whose attribute `name` equals `value`.
    pub fn closest_with_attribute(&self, id: NodeId, name: &str, value: &str) -> Option<NodeId> {
        self.closest(id, |n| n.attribute(name) == Some(value))
    }

    /// Descendants in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Inclusive descendants matching `pred`, in document order.
    pub fn find_all(&self, id: NodeId, pred: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        std::iter::once(id)
            .chain(self.descendants(id))
            .filter(|n| self.node(*n).map(&pred).unwrap_or(false))
            .collect()
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in std::iter::once(id).chain(self.descendants(id)) {
            if let Some(Node { kind: NodeKind::Text(text), .. }) = self.node(node) {
                out.push_str(text);
            }
        }
        out
    }

    /// Whether any inclusive descendant is a media element.
    pub fn has_media(&self, id: NodeId) -> bool {
        !self
            .find_all(id, |n| n.tag().map(|t| MEDIA_TAGS.contains(&t)).unwrap_or(false))
            .is_empty()
    }

    /// No visible text and no media. Native inputs are judged by `value`.
    pub fn is_empty(&self, id: NodeId) -> bool {
        match self.tag(id) {
            Some("input") | Some("textarea") => self.attribute(id, "value").map(is_blank).unwrap_or(true),
            _ => is_blank(&self.text_content(id)),
        }
    }

    /// Whether the node is a native text input.
    pub fn is_native_input(&self, id: NodeId) -> bool {
        match self.tag(id) {
            Some("textarea") => true,
            Some("input") => matches!(
                self.attribute(id, "type"),
                None | Some("text") | Some("search") | Some("email") | Some("url") | Some("tel") | Some("number")
            ),
            _ => false,
        }
    }

    /// Whether the node is an editable element.
    pub fn is_content_editable(&self, id: NodeId) -> bool {
        matches!(self.attribute(id, "contenteditable"), Some("true") | Some(""))
    }

    /// Focusable inputs under `id`: native inputs plus the deepest
    /// content-editable elements.
    pub fn find_all_inputs(&self, id: NodeId) -> Vec<NodeId> {
        let candidates = self.find_all(id, |_| true);
        candidates
            .iter()
            .copied()
            .filter(|n| {
                if self.is_native_input(*n) {
                    return true;
                }
                self.is_content_editable(*n)
                    && !self
                        .descendants(*n)
                        .into_iter()
                        .any(|d| self.is_content_editable(d))
            })
            .collect()
    }

    /// Serialize a subtree as markup.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.node(id).map(|n| &n.kind) {
            Some(NodeKind::Text(text)) => out.push_str(&escape_text(text)),
            Some(NodeKind::Element { tag, attributes }) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_text(value).replace('"', "&quot;"));
                    out.push('"');
                }
                out.push('>');
                for child in self.children(id) {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            None => {}
        }
    }

    // =========================================================================
    // Journal
    // =========================================================================

    /// Sequence number of the latest journaled record.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Number of undrained records.
    pub fn pending_records(&self) -> usize {
        self.journal.len()
    }

    /// Drain the mutation journal.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.journal)
    }

    fn record(&mut self, kind: MutationKind, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        if !self.is_connected(target) {
            return;
        }
        self.seq += 1;
        self.journal.push(MutationRecord {
            seq: self.seq,
            kind,
            target,
            added_nodes: added,
            removed_nodes: removed,
        });
    }

    // =========================================================================
    // Events and selection
    // =========================================================================

    /// Queue a user event.
    pub fn dispatch(&mut self, event: SurfaceEvent) {
        self.events.push(event);
    }

    /// Drain queued user events.
    pub fn take_events(&mut self) -> Vec<SurfaceEvent> {
        std::mem::take(&mut self.events)
    }

    /// Move the selection anchor.
    pub fn set_selection(&mut self, anchor: Option<NodeId>) {
        self.selection = anchor;
    }

    pub fn selection(&self) -> Option<NodeId> {
        self.selection
    }

    /// Whether the selection anchor lies inside `container`.
    pub fn selection_inside(&self, container: NodeId) -> bool {
        self.selection.map(|a| self.contains(container, a)).unwrap_or(false)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Set an attribute. No record when the value is unchanged.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        let changed = match self.nodes.get_mut(&id).map(|n| &mut n.kind) {
            Some(NodeKind::Element { attributes, .. }) => {
                if attributes.get(name).map(String::as_str) == Some(value) {
                    false
                } else {
                    attributes.insert(name.to_string(), value.to_string());
                    true
                }
            }
            _ => false,
        };
        if changed {
            self.record(MutationKind::Attributes { name: name.to_string() }, id, vec![], vec![]);
        }
    }

    /// Remove an attribute if present.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) {
        let changed = match self.nodes.get_mut(&id).map(|n| &mut n.kind) {
            Some(NodeKind::Element { attributes, .. }) => attributes.remove(name).is_some(),
            _ => false,
        };
        if changed {
            self.record(MutationKind::Attributes { name: name.to_string() }, id, vec![], vec![]);
        }
    }

    /// Add or remove one class.
    pub fn toggle_class(&mut self, id: NodeId, class: &str, on: bool) {
        if self.has_class(id, class) == on {
            return;
        }
        let mut classes: Vec<String> = self
            .attribute(id, "class")
            .map(|list| list.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        if on {
            classes.push(class.to_string());
        } else {
            classes.retain(|c| c != class);
        }
        self.set_attribute(id, "class", &classes.join(" "));
    }

    /// Replace text. Text nodes change in place; elements get their children
    /// replaced by one text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        match self.nodes.get_mut(&id).map(|n| &mut n.kind) {
            Some(NodeKind::Text(current)) => {
                if current != text {
                    *current = text.to_string();
                    self.record(MutationKind::CharacterData, id, vec![], vec![]);
                }
            }
            Some(NodeKind::Element { .. }) => {
                let removed = self.clear_children_silently(id);
                let text_node = self.create_text(text);
                self.link(id, text_node, None);
                self.record(MutationKind::ChildList, id, vec![text_node], removed);
            }
            None => {}
        }
    }

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.append_children(parent, &[child]);
    }

    /// Append several nodes in one record.
    pub fn append_children(&mut self, parent: NodeId, nodes: &[NodeId]) {
        if !self.can_adopt(parent, nodes) {
            return;
        }
        for node in nodes {
            self.detach(*node);
            self.link(parent, *node, None);
        }
        self.record(MutationKind::ChildList, parent, nodes.to_vec(), vec![]);
    }

    /// Insert several nodes before the first child of `parent` in one record.
    pub fn prepend_children(&mut self, parent: NodeId, nodes: &[NodeId]) {
        if !self.can_adopt(parent, nodes) {
            return;
        }
        for node in nodes {
            self.detach(*node);
        }
        for (offset, node) in nodes.iter().enumerate() {
            self.link(parent, *node, Some(offset));
        }
        self.record(MutationKind::ChildList, parent, nodes.to_vec(), vec![]);
    }

    /// Insert `node` as the previous sibling of `reference`.
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        let Some(parent) = self.parent(reference) else {
            tracing::warn!(?reference, "insert_before on a node without parent");
            return;
        };
        if !self.can_adopt(parent, &[node]) || node == reference {
            return;
        }
        self.detach(node);
        let position = self.position_in_parent(reference).unwrap_or(0);
        self.link(parent, node, Some(position));
        self.record(MutationKind::ChildList, parent, vec![node], vec![]);
    }

    /// Insert `node` as the next sibling of `reference`.
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) {
        self.insert_all_after(reference, &[node]);
    }

    /// Insert several nodes after `reference` in one record.
    pub fn insert_all_after(&mut self, reference: NodeId, nodes: &[NodeId]) {
        let Some(parent) = self.parent(reference) else {
            tracing::warn!(?reference, "insert_after on a node without parent");
            return;
        };
        if !self.can_adopt(parent, nodes) || nodes.contains(&reference) {
            return;
        }
        for node in nodes {
            self.detach(*node);
        }
        let start = self.position_in_parent(reference).map(|p| p + 1).unwrap_or(0);
        for (offset, node) in nodes.iter().enumerate() {
            self.link(parent, *node, Some(start + offset));
        }
        self.record(MutationKind::ChildList, parent, nodes.to_vec(), vec![]);
    }

    /// Detach `id` from its parent.
    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
    }

    /// Detach `id` and free it with all its descendants.
    ///
    /// Handles into the released subtree stop resolving.
    pub fn drop_subtree(&mut self, id: NodeId) {
        if id == self.working_area {
            tracing::warn!(?id, "refusing to drop the working area");
            return;
        }
        if !self.exists(id) {
            return;
        }
        self.detach(id);
        let released = self.descendants(id);
        self.nodes.remove(&id);
        for node in &released {
            self.nodes.remove(node);
        }
        self.forget_released_selection();
        tracing::trace!(?id, released = released.len() + 1, "subtree dropped");
    }

    /// Number of live nodes, working area included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Put `new` where `old` is, detaching `old`, in one record.
    pub fn replace_with(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.parent(old) else {
            tracing::warn!(?old, "replace_with on a node without parent");
            return;
        };
        if old == new || !self.can_adopt(parent, &[new]) {
            return;
        }
        self.detach(new);
        let Some(position) = self.position_in_parent(old) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children[position] = new;
        }
        if let Some(n) = self.nodes.get_mut(&old) {
            n.parent = None;
        }
        if let Some(n) = self.nodes.get_mut(&new) {
            n.parent = Some(parent);
        }
        self.record(MutationKind::ChildList, parent, vec![new], vec![old]);
    }

    /// Detach every child of `parent` in one record. Text children are freed.
    pub fn clear_children(&mut self, parent: NodeId) {
        let removed = self.clear_children_silently(parent);
        if !removed.is_empty() {
            self.record(MutationKind::ChildList, parent, vec![], removed);
        }
    }

    // =========================================================================
    // Internal linking
    // =========================================================================

    fn can_adopt(&self, parent: NodeId, nodes: &[NodeId]) -> bool {
        if !self.is_element(parent) {
            tracing::warn!(?parent, "cannot insert into a missing or non-element node");
            return false;
        }
        for node in nodes {
            if !self.exists(*node) || self.contains(*node, parent) {
                tracing::warn!(?parent, ?node, "refusing insertion that would break the tree");
                return false;
            }
        }
        true
    }

    fn position_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    fn link(&mut self, parent: NodeId, child: NodeId, position: Option<usize>) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            match position {
                Some(i) if i <= p.children.len() => p.children.insert(i, child),
                _ => p.children.push(child),
            }
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.nodes.get_mut(&id) {
            n.parent = None;
        }
        self.record(MutationKind::ChildList, parent, vec![], vec![id]);
    }

    fn clear_children_silently(&mut self, parent: NodeId) -> Vec<NodeId> {
        let removed = self
            .nodes
            .get_mut(&parent)
            .map(|p| std::mem::take(&mut p.children))
            .unwrap_or_default();
        for child in &removed {
            let is_text = match self.nodes.get_mut(child) {
                Some(c) => {
                    c.parent = None;
                    !c.is_element()
                }
                None => false,
            };
            if is_text {
                self.nodes.remove(child);
            }
        }
        self.forget_released_selection();
        removed
    }

    fn forget_released_selection(&mut self) {
        if self.selection.is_some_and(|anchor| !self.exists(anchor)) {
            self.selection = None;
        }
    }
}

fn is_blank(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_whitespace() || c == '\u{200B}' || c == '\u{FEFF}')
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
