//! Ordered section container synchronized with the working area.
//!
//! `sections[i]` always owns the working area's child `i`. Every structural
//! primitive updates the surface and the vector together, then runs the
//! tool lifecycle hook with no lock held.

use folio_types::SectionId;
use serde_json::Value;

use crate::error::{EditorError, Result};
use crate::section::Section;
use crate::surface::{NodeId, SharedSurface};
use crate::tools::ToolMethod;

/// Ordered sequence of sections mirrored on the surface.
#[derive(Debug)]
pub struct SectionCollection {
    sections: Vec<Section>,
    surface: SharedSurface,
    working_area: NodeId,
}

impl SectionCollection {
    pub fn new(surface: SharedSurface) -> Self {
        let working_area = surface.read().working_area();
        Self {
            sections: Vec::new(),
            surface,
            working_area,
        }
    }

    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    pub fn working_area(&self) -> NodeId {
        self.working_area
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Section> {
        self.sections.iter()
    }

    pub fn as_slice(&self) -> &[Section] {
        &self.sections
    }

    pub fn index_of(&self, section: &Section) -> Option<usize> {
        self.sections.iter().position(|s| s == section)
    }

    pub fn index_of_id(&self, id: &SectionId) -> Option<usize> {
        self.sections.iter().position(|s| s.id() == id)
    }

    pub fn index_of_holder(&self, holder: NodeId) -> Option<usize> {
        self.sections.iter().position(|s| s.holder() == holder)
    }

    /// Index of the section whose holder contains `node`.
    pub fn index_of_node(&self, node: NodeId) -> Option<usize> {
        let holders: Vec<NodeId> = self.sections.iter().map(Section::holder).collect();
        let surface = self.surface.read();
        holders.iter().position(|holder| surface.contains(*holder, node))
    }

    // ========================================================================
    // Structural Primitives
    // ========================================================================

    /// Insert `section` at `index` (clamped), replacing the section there if
    /// `replace` is set.
    pub fn insert(&mut self, index: usize, section: Section, replace: bool) {
        let index = index.min(self.sections.len());
        let holder = section.holder();

        let displaced = if replace && index < self.sections.len() {
            let old = self.sections[index].clone();
            self.surface.write().remove(old.holder());
            old.call(ToolMethod::Removed.as_ref(), &Value::Null);
            Some(old)
        } else {
            None
        };

        {
            let mut surface = self.surface.write();
            if index > 0 {
                let previous = self.sections[index - 1].holder();
                surface.insert_after(previous, holder);
            } else if let Some(next) = self.neighbor_after(index, displaced.is_some()) {
                surface.insert_before(next.holder(), holder);
            } else {
                surface.append_child(self.working_area, holder);
            }
        }

        if displaced.is_some() {
            self.sections[index] = section.clone();
        } else {
            self.sections.insert(index, section.clone());
        }
        tracing::trace!(section = %section.id(), index, replace, "section inserted");

        section.call(ToolMethod::Rendered.as_ref(), &Value::Null);
    }

    /// Section that will follow a head insertion.
    fn neighbor_after(&self, index: usize, replacing: bool) -> Option<&Section> {
        let next = if replacing { index + 1 } else { index };
        self.sections.get(next)
    }

    /// Insert several sections at `index` (clamped) in one surface change.
    pub fn insert_many(&mut self, sections: Vec<Section>, index: usize) {
        if sections.is_empty() {
            return;
        }
        let index = index.min(self.sections.len());
        let holders: Vec<NodeId> = sections.iter().map(Section::holder).collect();

        {
            let mut surface = self.surface.write();
            if self.sections.is_empty() {
                surface.append_children(self.working_area, &holders);
            } else if index > 0 {
                let previous = self.sections[(index - 1).min(self.sections.len() - 1)].holder();
                surface.insert_all_after(previous, &holders);
            } else {
                surface.prepend_children(self.working_area, &holders);
            }
        }

        let count = sections.len();
        self.sections.splice(index..index, sections.iter().cloned());
        tracing::trace!(index, count, "sections inserted");

        for section in &sections {
            section.call(ToolMethod::Rendered.as_ref(), &Value::Null);
        }
    }

    /// Remove and return the section at `index`.
    pub fn remove(&mut self, index: usize) -> Result<Section> {
        if index >= self.sections.len() {
            return Err(EditorError::out_of_range(index, self.sections.len()));
        }
        let section = self.sections[index].clone();
        self.surface.write().remove(section.holder());
        section.call(ToolMethod::Removed.as_ref(), &Value::Null);
        self.sections.remove(index);
        tracing::trace!(section = %section.id(), index, "section removed");
        Ok(section)
    }

    /// Detach every section and return them in order.
    pub fn remove_all(&mut self) -> Vec<Section> {
        self.surface.write().clear_children(self.working_area);
        let sections = std::mem::take(&mut self.sections);
        for section in &sections {
            section.call(ToolMethod::Removed.as_ref(), &Value::Null);
        }
        sections
    }

    /// Move the section at `from_index` so it ends up at `to_index`.
    pub fn move_section(&mut self, to_index: usize, from_index: usize) -> Result<()> {
        let len = self.sections.len();
        if from_index >= len {
            return Err(EditorError::out_of_range(from_index, len));
        }
        if to_index >= len {
            return Err(EditorError::out_of_range(to_index, len));
        }

        let section = self.sections.remove(from_index);
        let holder = section.holder();
        {
            let mut surface = self.surface.write();
            surface.remove(holder);
            match self.sections.get(to_index.saturating_sub(1)) {
                Some(neighbor) if to_index > 0 => surface.insert_after(neighbor.holder(), holder),
                Some(neighbor) => surface.insert_before(neighbor.holder(), holder),
                None => surface.append_child(self.working_area, holder),
            }
        }
        self.sections.insert(to_index, section.clone());
        tracing::trace!(section = %section.id(), from_index, to_index, "section moved");

        section.notify_moved(from_index, to_index);
        Ok(())
    }

    /// Swap the section at `index` for `section` in place.
    pub fn replace(&mut self, index: usize, section: Section) -> Result<Section> {
        let Some(old) = self.sections.get(index).cloned() else {
            return Err(EditorError::out_of_range(index, self.sections.len()));
        };
        self.surface.write().replace_with(old.holder(), section.holder());
        self.sections[index] = section.clone();
        tracing::trace!(old = %old.id(), new = %section.id(), index, "section replaced");

        section.call(ToolMethod::Rendered.as_ref(), &Value::Null);
        Ok(old)
    }

    /// Whether the vector and the working area's children agree.
    pub fn is_synchronized(&self) -> bool {
        let holders: Vec<NodeId> = self.sections.iter().map(Section::holder).collect();
        self.surface.read().children(self.working_area) == holders.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::IdleScheduler;
    use crate::section::SectionParams;
    use crate::surface::shared_surface;
    use crate::tools::ToolRegistry;
    use folio_types::{SectionData, TunesData};
    use serde_json::json;

    struct Fixture {
        collection: SectionCollection,
        registry: ToolRegistry,
        scheduler: IdleScheduler,
    }

    fn fixture() -> Fixture {
        Fixture {
            collection: SectionCollection::new(shared_surface()),
            registry: ToolRegistry::with_builtins(),
            scheduler: IdleScheduler::new(),
        }
    }

    impl Fixture {
        fn section(&self, text: &str) -> Section {
            let mut data = SectionData::new();
            data.insert("text".into(), json!(text));
            Section::new(
                SectionParams {
                    id: Some(SectionId::new(text)),
                    data,
                    tool: self.registry.get("paragraph").unwrap(),
                    read_only: false,
                    tunes_data: TunesData::new(),
                    event_bus: None,
                },
                self.collection.surface(),
                &self.scheduler,
            )
            .unwrap()
        }

        fn ids(&self) -> Vec<String> {
            self.collection.iter().map(|s| s.id().to_string()).collect()
        }

        fn fill(&mut self, names: &[&str]) {
            for name in names {
                let section = self.section(name);
                let len = self.collection.len();
                self.collection.insert(len, section, false);
            }
        }
    }

    #[test]
    fn test_insert_positions() {
        let mut f = fixture();
        f.fill(&["b", "d"]);
        let a = f.section("a");
        f.collection.insert(0, a, false);
        let c = f.section("c");
        f.collection.insert(2, c, false);
        let e = f.section("e");
        f.collection.insert(99, e, false);
        assert_eq!(f.ids(), vec!["a", "b", "c", "d", "e"]);
        assert!(f.collection.is_synchronized());
    }

    #[test]
    fn test_insert_replace() {
        let mut f = fixture();
        f.fill(&["a", "b", "c"]);
        let old_b = f.collection.get(1).unwrap().holder();
        let x = f.section("x");
        f.collection.insert(1, x, true);
        assert_eq!(f.ids(), vec!["a", "x", "c"]);
        assert!(f.collection.is_synchronized());
        assert!(!f.collection.surface().read().is_connected(old_b));

        let y = f.section("y");
        f.collection.insert(0, y, true);
        assert_eq!(f.ids(), vec!["y", "x", "c"]);
        assert!(f.collection.is_synchronized());
    }

    #[test]
    fn test_insert_many_is_one_record() {
        let mut f = fixture();
        f.fill(&["a", "d"]);
        f.collection.surface().write().take_records();
        let batch = vec![f.section("b"), f.section("c")];
        f.collection.insert_many(batch, 1);
        assert_eq!(f.ids(), vec!["a", "b", "c", "d"]);
        assert!(f.collection.is_synchronized());
        assert_eq!(f.collection.surface().write().take_records().len(), 1);

        let head = vec![f.section("0")];
        f.collection.insert_many(head, 0);
        assert_eq!(f.ids()[0], "0");
        assert!(f.collection.is_synchronized());
    }

    #[test]
    fn test_remove_and_remove_all() {
        let mut f = fixture();
        f.fill(&["a", "b", "c"]);
        let removed = f.collection.remove(1).unwrap();
        assert_eq!(removed.id().as_str(), "b");
        assert_eq!(f.ids(), vec!["a", "c"]);
        assert!(f.collection.is_synchronized());
        assert!(matches!(
            f.collection.remove(5),
            Err(EditorError::IndexOutOfRange { index: 5, len: 2 })
        ));

        let all = f.collection.remove_all();
        assert_eq!(all.len(), 2);
        assert!(f.collection.is_empty());
        assert!(f.collection.is_synchronized());
    }

    #[test]
    fn test_move_matches_list_semantics() {
        let names = ["a", "b", "c", "d"];
        for from in 0..names.len() {
            for to in 0..names.len() {
                let mut f = fixture();
                f.fill(&names);
                f.collection.move_section(to, from).unwrap();

                let mut expected: Vec<&str> = names.to_vec();
                let item = expected.remove(from);
                expected.insert(to, item);
                assert_eq!(f.ids(), expected, "move {from} -> {to}");
                assert!(f.collection.is_synchronized(), "move {from} -> {to}");
            }
        }
    }

    #[test]
    fn test_move_rejects_invalid_indices() {
        let mut f = fixture();
        f.fill(&["a"]);
        assert!(f.collection.move_section(1, 0).is_err());
        assert!(f.collection.move_section(0, 1).is_err());
    }

    #[test]
    fn test_replace_swaps_in_place() {
        let mut f = fixture();
        f.fill(&["a", "b"]);
        let z = f.section("z");
        let old = f.collection.replace(0, z).unwrap();
        assert_eq!(old.id().as_str(), "a");
        assert_eq!(f.ids(), vec!["z", "b"]);
        assert!(f.collection.is_synchronized());

        let w = f.section("w");
        assert!(f.collection.replace(2, w).is_err());
    }

    #[test]
    fn test_index_of_node() {
        let mut f = fixture();
        f.fill(&["a", "b"]);
        let root = f.collection.get(1).unwrap().tool_root();
        assert_eq!(f.collection.index_of_node(root), Some(1));
        let stray = f.collection.surface().write().create_element("p");
        assert_eq!(f.collection.index_of_node(stray), None);
    }
}
