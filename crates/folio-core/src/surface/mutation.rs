//! Mutation records and user events produced by the surface.

use serde::{Deserialize, Serialize};

use super::NodeId;

/// Kind of low-level change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MutationKind {
    /// Children were added to or removed from `target`.
    ChildList,
    /// An attribute of `target` changed.
    Attributes { name: String },
    /// The text of the text node `target` changed.
    CharacterData,
}

/// One journaled change, in the shape of a DOM mutation record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Journal sequence number, strictly increasing.
    pub seq: u64,
    pub kind: MutationKind,
    pub target: NodeId,
    #[serde(default)]
    pub added_nodes: Vec<NodeId>,
    #[serde(default)]
    pub removed_nodes: Vec<NodeId>,
}

impl MutationRecord {
    /// Added, removed and target nodes, in that order.
    pub fn changed_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.added_nodes
            .iter()
            .chain(self.removed_nodes.iter())
            .copied()
            .chain(std::iter::once(self.target))
    }

    /// Attribute name for attribute records.
    pub fn attribute_name(&self) -> Option<&str> {
        match &self.kind {
            MutationKind::Attributes { name } => Some(name),
            _ => None,
        }
    }
}

/// Interaction events forwarded to external keyboard/drag handling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionKind {
    KeyDown { key: String },
    KeyUp { key: String },
    DragOver,
    DragLeave,
}

/// User-originated events queued on the surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SurfaceEvent {
    /// Native `input` event on an editable element.
    Input { target: NodeId },
    /// Focus moved into `target`.
    FocusIn { target: NodeId },
    /// Keyboard or drag interaction.
    Interaction { target: NodeId, kind: InteractionKind },
}

impl SurfaceEvent {
    /// Node the event was dispatched on.
    pub fn target(&self) -> NodeId {
        match self {
            Self::Input { target }
            | Self::FocusIn { target }
            | Self::Interaction { target, .. } => *target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_nodes_order() {
        let record = MutationRecord {
            seq: 1,
            kind: MutationKind::ChildList,
            target: NodeId(1),
            added_nodes: vec![NodeId(2)],
            removed_nodes: vec![NodeId(3)],
        };
        let nodes: Vec<_> = record.changed_nodes().collect();
        assert_eq!(nodes, vec![NodeId(2), NodeId(3), NodeId(1)]);
        assert!(record.attribute_name().is_none());
    }

    #[test]
    fn test_event_target() {
        let event = SurfaceEvent::Interaction {
            target: NodeId(7),
            kind: InteractionKind::KeyDown { key: "Enter".into() },
        };
        assert_eq!(event.target(), NodeId(7));
    }
}
