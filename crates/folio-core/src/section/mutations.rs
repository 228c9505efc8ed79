//! Mutation classification for one section.
//!
//! A batch fires a change unless every changed node of every record sits
//! under a `data-mutation-free="true"` element.

use crate::surface::{MutationRecord, NodeId, Surface};

use super::{EMPTY_ATTR, MUTATION_FREE_ATTR};

/// Records for the section's content subtree observed after watching began.
///
/// `data-empty` bookkeeping is never a content change.
pub(crate) fn relevant_records<'a>(
    surface: &Surface,
    content: NodeId,
    watch_from: u64,
    records: &'a [MutationRecord],
) -> Vec<&'a MutationRecord> {
    records
        .iter()
        .filter(|r| r.seq > watch_from)
        .filter(|r| r.attribute_name() != Some(EMPTY_ATTR))
        .filter(|r| surface.contains(content, r.target))
        .collect()
}

/// Follow the tool root through records that swapped it out.
pub(crate) fn replaced_root(records: &[&MutationRecord], root: NodeId) -> Option<NodeId> {
    let mut current = root;
    for record in records {
        if record.removed_nodes.contains(&current) {
            if let Some(new_root) = record.added_nodes.last() {
                current = *new_root;
            }
        }
    }
    (current != root).then_some(current)
}

/// Whether a changed node is covered by the exemption marker.
///
/// Text nodes are judged by their parent element; a node with no element
/// to judge by is never exempt.
pub(crate) fn is_exempt(surface: &Surface, node: NodeId) -> bool {
    match surface.element_of(node) {
        Some(element) => surface
            .closest_with_attribute(element, MUTATION_FREE_ATTR, "true")
            .is_some(),
        None => false,
    }
}

/// Whether a batch represents a content edit.
pub(crate) fn should_fire(surface: &Surface, records: &[&MutationRecord]) -> bool {
    if records.is_empty() {
        return false;
    }
    let all_exempt = records
        .iter()
        .all(|record| record.changed_nodes().all(|node| is_exempt(surface, node)));
    !all_exempt
}
