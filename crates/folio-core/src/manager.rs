//! Section manager: the editor-facing façade over the collection.
//!
//! Owns the current index, composes sections through the registry and
//! rebroadcasts section-level changes as indexed [`MutationFlow`] events.
//!
//! # Event Flow
//!
//! ```text
//! surface journal ──flush()──► Section::deliver_mutations
//!                                   │ (fires)
//!                                   ▼
//!                      editor bus: editor.section.mutated
//!                                   │
//!                               pump()
//!                                   ▼
//!                mutation bus: section.changed { index }
//! ```
//!
//! Structural operations take `&mut self`, so two of them can never
//! interleave on one manager.

use std::collections::HashSet;
use std::sync::Arc;

use folio_types::{SectionData, SectionId, TunesData};
use futures::StreamExt;

use crate::collection::SectionCollection;
use crate::config::EditorConfig;
use crate::conversion::{self, ConversionDirection};
use crate::error::{EditorError, Result};
use crate::flows::{
    shared_editor_flow_bus, shared_mutation_flow_bus, EditorFlow, MutationFlow, SharedEditorFlowBus,
    SharedMutationFlowBus, Subscription,
};
use crate::scheduler::IdleScheduler;
use crate::section::{Section, SectionParams};
use crate::surface::{shared_surface, NodeId, SharedSurface, SurfaceEvent};
use crate::tools::ToolRegistry;

/// What to compose.
#[derive(Clone, Debug, Default)]
pub struct ComposeParams {
    pub tool: String,
    /// Generated when absent.
    pub id: Option<SectionId>,
    pub data: SectionData,
    pub tunes: TunesData,
}

impl ComposeParams {
    pub fn new(tool: impl Into<String>, data: SectionData) -> Self {
        Self {
            tool: tool.into(),
            data,
            ..Default::default()
        }
    }
}

/// What to insert and where.
#[derive(Clone, Debug)]
pub struct InsertParams {
    pub id: Option<SectionId>,
    /// Defaults to the configured default tool.
    pub tool: Option<String>,
    pub data: SectionData,
    pub tunes: TunesData,
    /// Defaults to after the current section, or onto it when replacing.
    pub index: Option<usize>,
    pub need_to_focus: bool,
    pub replace: bool,
}

impl Default for InsertParams {
    fn default() -> Self {
        Self {
            id: None,
            tool: None,
            data: SectionData::new(),
            tunes: TunesData::new(),
            index: None,
            need_to_focus: true,
            replace: false,
        }
    }
}

impl InsertParams {
    pub fn tool(name: impl Into<String>) -> Self {
        Self {
            tool: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: SectionData) -> Self {
        self.data = data;
        self
    }

    pub fn with_id(mut self, id: SectionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_tunes(mut self, tunes: TunesData) -> Self {
        self.tunes = tunes;
        self
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn replacing(mut self) -> Self {
        self.replace = true;
        self
    }

    pub fn without_focus(mut self) -> Self {
        self.need_to_focus = false;
        self
    }
}

/// Orchestrates section composition and structural edits.
pub struct SectionManager {
    registry: Arc<ToolRegistry>,
    config: EditorConfig,
    collection: SectionCollection,
    current_index: Option<usize>,
    scheduler: IdleScheduler,
    mutation_bus: SharedMutationFlowBus,
    editor_bus: SharedEditorFlowBus,
    mutated: Subscription<EditorFlow>,
}

impl std::fmt::Debug for SectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionManager")
            .field("sections", &self.collection.len())
            .field("current_index", &self.current_index)
            .field("read_only", &self.config.read_only)
            .finish()
    }
}

impl SectionManager {
    /// Manager over a fresh surface.
    pub fn new(registry: ToolRegistry) -> Self {
        Self::with_surface(registry, shared_surface())
    }

    /// Manager rendering into an existing surface.
    pub fn with_surface(registry: ToolRegistry, surface: SharedSurface) -> Self {
        let config = registry.config().clone();
        let scheduler = match config.idle_timeout() {
            Some(timeout) => IdleScheduler::with_timeout(timeout),
            None => IdleScheduler::new(),
        };
        let mutation_bus = shared_mutation_flow_bus(config.event_capacity);
        let editor_bus = shared_editor_flow_bus(config.event_capacity);
        let mutated = editor_bus.subscribe("editor.section.mutated");
        Self {
            registry: Arc::new(registry),
            config,
            collection: SectionCollection::new(surface),
            current_index: None,
            scheduler,
            mutation_bus,
            editor_bus,
            mutated,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn surface(&self) -> &SharedSurface {
        self.collection.surface()
    }

    pub fn collection(&self) -> &SectionCollection {
        &self.collection
    }

    pub fn scheduler(&self) -> &IdleScheduler {
        &self.scheduler
    }

    pub fn mutation_bus(&self) -> &SharedMutationFlowBus {
        &self.mutation_bus
    }

    pub fn editor_bus(&self) -> &SharedEditorFlowBus {
        &self.editor_bus
    }

    /// Subscribe to indexed mutation events (`section.*`).
    pub fn subscribe(&self, pattern: &str) -> Subscription<MutationFlow> {
        self.mutation_bus.subscribe(pattern)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }

    pub fn sections(&self) -> &[Section] {
        self.collection.as_slice()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Point at a section. Out-of-range indices clear the pointer.
    pub fn set_current_index(&mut self, index: Option<usize>) {
        self.current_index = index.filter(|i| *i < self.collection.len());
    }

    pub fn get_by_index(&self, index: usize) -> Option<Section> {
        self.collection.get(index).cloned()
    }

    pub fn get_by_id(&self, id: &SectionId) -> Option<Section> {
        self.collection.index_of_id(id).and_then(|i| self.get_by_index(i))
    }

    pub fn index_of(&self, section: &Section) -> Option<usize> {
        self.collection.index_of(section)
    }

    /// Section whose holder contains `node`.
    pub fn section_by_node(&self, node: NodeId) -> Option<Section> {
        self.collection.index_of_node(node).and_then(|i| self.get_by_index(i))
    }

    pub fn current_section(&self) -> Option<Section> {
        self.current_index.and_then(|i| self.get_by_index(i))
    }

    pub fn next_section(&self) -> Option<Section> {
        self.current_index.and_then(|i| self.get_by_index(i + 1))
    }

    pub fn previous_section(&self) -> Option<Section> {
        self.current_index
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.get_by_index(i))
    }

    pub fn first_section(&self) -> Option<Section> {
        self.get_by_index(0)
    }

    pub fn last_section(&self) -> Option<Section> {
        self.collection.len().checked_sub(1).and_then(|i| self.get_by_index(i))
    }

    /// Make the section containing `node` current and sync its input.
    pub fn set_current_by_node(&mut self, node: NodeId) -> Option<Section> {
        let index = self.collection.index_of_node(node)?;
        self.current_index = Some(index);
        let section = self.get_by_index(index)?;
        section.update_current_input();
        Some(section)
    }

    /// Whether every section is empty.
    pub fn is_editor_empty(&self) -> bool {
        self.collection.iter().all(Section::is_empty)
    }

    // ========================================================================
    // Composition and Insertion
    // ========================================================================

    /// Construct a section for a registered tool.
    pub fn compose_section(&self, params: ComposeParams) -> Result<Section> {
        let tool = self
            .registry
            .get(&params.tool)
            .ok_or_else(|| EditorError::ToolNotFound(params.tool.clone()))?;
        let section = Section::new(
            SectionParams {
                id: params.id,
                data: params.data,
                tool,
                read_only: self.config.read_only,
                tunes_data: params.tunes,
                event_bus: Some(self.editor_bus.clone()),
            },
            self.collection.surface(),
            &self.scheduler,
        )?;

        if !self.config.read_only {
            let api = section.api();
            self.scheduler.schedule("section.interactions", move || {
                if let Some(section) = api.section() {
                    section.bind_interactions();
                }
            });
        }
        Ok(section)
    }

    /// Compose and insert a section.
    pub fn insert(&mut self, params: InsertParams) -> Result<Section> {
        let InsertParams {
            id,
            tool,
            data,
            tunes,
            index,
            need_to_focus,
            replace,
        } = params;
        let len = self.collection.len();
        let index = index
            .or_else(|| self.current_index.map(|c| if replace { c } else { c + 1 }))
            .unwrap_or(0)
            .min(len);

        if let Some(id) = &id {
            let taken = self
                .collection
                .index_of_id(id)
                .is_some_and(|existing| !(replace && existing == index));
            if taken {
                return Err(EditorError::DuplicateId(id.to_string()));
            }
        }

        let tool = tool.unwrap_or_else(|| self.config.default_tool.clone());
        let section = self.compose_section(ComposeParams { tool, id, data, tunes })?;

        let displaced = if replace { self.collection.get(index).cloned() } else { None };
        if let Some(displaced) = &displaced {
            self.emit(MutationFlow::Removed {
                index,
                section: displaced.snapshot(),
            });
        }
        self.collection.insert(index, section.clone(), replace);
        if let Some(displaced) = displaced {
            self.release(&[displaced]);
        }
        self.emit(MutationFlow::Added {
            index,
            section: section.snapshot(),
        });
        self.shift_current_for_insert(index, need_to_focus);
        Ok(section)
    }

    fn shift_current_for_insert(&mut self, index: usize, need_to_focus: bool) {
        if need_to_focus {
            self.current_index = Some(index);
        } else if let Some(current) = self.current_index {
            if index <= current {
                self.current_index = Some(current + 1);
            }
        }
    }

    /// Insert an empty default-tool section at `index`.
    pub fn insert_default_at(&mut self, index: usize, need_to_focus: bool) -> Result<Section> {
        let index = index.min(self.collection.len());
        let section = self.compose_section(ComposeParams::new(self.config.default_tool.clone(), SectionData::new()))?;
        self.collection.insert(index, section.clone(), false);
        self.emit(MutationFlow::Added {
            index,
            section: section.snapshot(),
        });
        self.shift_current_for_insert(index, need_to_focus);
        Ok(section)
    }

    /// Append an empty default-tool section and focus it.
    pub fn insert_at_end(&mut self) -> Result<Section> {
        self.current_index = self.collection.len().checked_sub(1);
        self.insert(InsertParams::default())
    }

    /// Insert already composed sections without per-section events.
    ///
    /// Nothing is inserted when an id repeats within the batch or is already
    /// in the collection.
    pub fn insert_many(&mut self, sections: Vec<Section>, index: usize) -> Result<()> {
        let mut ids: HashSet<&SectionId> = self.collection.iter().map(Section::id).collect();
        if let Some(duplicate) = sections.iter().find(|s| !ids.insert(s.id())) {
            return Err(EditorError::DuplicateId(duplicate.id().to_string()));
        }
        self.collection.insert_many(sections, index);
        Ok(())
    }

    /// Rebuild a section with merged data under the same id.
    pub async fn update(
        &mut self,
        section: &Section,
        data: Option<SectionData>,
        tunes: Option<TunesData>,
    ) -> Result<Section> {
        let index = self
            .collection
            .index_of(section)
            .ok_or_else(|| EditorError::SectionNotFound(section.id().to_string()))?;
        let saved = section
            .save()
            .await
            .ok_or_else(|| EditorError::DataUnavailable(section.id().to_string()))?;

        let mut merged = saved.data;
        if let Some(data) = data {
            merged.extend(data);
        }
        let replacement = self.compose_section(ComposeParams {
            tool: section.name().to_string(),
            id: Some(section.id().clone()),
            data: merged,
            tunes: tunes.unwrap_or(saved.tunes),
        })?;

        let displaced = self.collection.replace(index, replacement.clone())?;
        self.release(&[displaced]);
        self.emit(MutationFlow::Changed {
            index,
            section: replacement.snapshot(),
        });
        Ok(replacement)
    }

    /// Replace `section` with a new section of `tool`.
    pub fn replace(&mut self, section: &Section, tool: &str, data: SectionData) -> Result<Section> {
        let index = self
            .collection
            .index_of(section)
            .ok_or_else(|| EditorError::SectionNotFound(section.id().to_string()))?;
        self.insert(InsertParams::tool(tool).with_data(data).at(index).replacing())
    }

    // ========================================================================
    // Merge and Convert
    // ========================================================================

    /// Merge `source` into `target` and remove `source`.
    ///
    /// Both sections must be in the collection; otherwise nothing is touched.
    /// A no-op when neither the same-tool path nor the conversion path
    /// applies.
    pub async fn merge_sections(&mut self, target: &Section, source: &Section) -> Result<()> {
        for section in [target, source] {
            if self.collection.index_of(section).is_none() {
                return Err(EditorError::SectionNotFound(section.id().to_string()));
            }
        }
        if target == source {
            tracing::debug!(section = %target.id(), "merge skipped: section merged into itself");
            return Ok(());
        }
        if !target.is_mergeable() {
            tracing::debug!(target = %target.name(), "merge skipped: target is not mergeable");
            return Ok(());
        }

        let data = if target.name() == source.name() {
            let Some(saved) = source.save().await else {
                tracing::warn!(section = %source.id(), "merge skipped: source data unavailable");
                return Ok(());
            };
            target.tool().sanitize_data(&saved.data)
        } else if source.tool().can_export() && target.tool().can_import() {
            let exported = match source.export_data_as_string().await {
                Ok(exported) => exported,
                Err(e) => {
                    tracing::warn!(section = %source.id(), error = %e, "merge skipped: export failed");
                    return Ok(());
                }
            };
            let Some(rule) = target.tool().conversion_config().and_then(|c| c.import) else {
                return Ok(());
            };
            let cleaned = target.tool().sanitize_import(&exported);
            conversion::string_to_data(&cleaned, &rule, target.config())
        } else {
            tracing::debug!(
                target = %target.name(),
                source = %source.name(),
                "merge skipped: no conversion path"
            );
            return Ok(());
        };

        target.merge_with(data).await.map_err(|source_err| EditorError::ToolFailed {
            tool: target.name().to_string(),
            source: source_err,
        })?;
        self.remove_section(source, true).await?;
        self.current_index = self.collection.index_of(target);
        tracing::debug!(target = %target.id(), source = %source.id(), "sections merged");
        Ok(())
    }

    /// Convert `section` to `tool`, optionally overriding converted fields.
    pub async fn convert(
        &mut self,
        section: &Section,
        tool: &str,
        overrides: Option<SectionData>,
    ) -> Result<Section> {
        let saved = section
            .save()
            .await
            .ok_or_else(|| EditorError::DataUnavailable(section.id().to_string()))?;
        let target = self
            .registry
            .get(tool)
            .ok_or_else(|| EditorError::ToolNotFound(tool.to_string()))?;

        let export = section
            .tool()
            .conversion_config()
            .and_then(|c| c.export)
            .ok_or_else(|| EditorError::not_convertible(section.name(), ConversionDirection::Export))?;
        let import = target
            .conversion_config()
            .and_then(|c| c.import)
            .ok_or_else(|| EditorError::not_convertible(tool, ConversionDirection::Import))?;

        let exported = conversion::data_to_string(&saved.data, &export);
        let cleaned = target.sanitize_import(&exported);
        let mut data = conversion::string_to_data(&cleaned, &import, target.config());
        if let Some(overrides) = overrides {
            data.extend(overrides);
        }

        tracing::debug!(section = %section.id(), from = %section.name(), to = %tool, "converting section");
        self.replace(section, tool, data)
    }

    // ========================================================================
    // Removal and Moves
    // ========================================================================

    /// Destroy and remove `section`.
    ///
    /// Fails when the section is not in the collection.
    pub async fn remove_section(&mut self, section: &Section, add_default_if_empty: bool) -> Result<()> {
        let index = self
            .collection
            .index_of(section)
            .ok_or_else(|| EditorError::SectionNotFound(section.id().to_string()))?;

        section.destroy().await;
        let removed = self.collection.remove(index)?;
        self.emit(MutationFlow::Removed {
            index,
            section: removed.snapshot(),
        });
        self.release(&[removed]);

        if let Some(current) = self.current_index {
            if current >= index {
                self.current_index = current.checked_sub(1);
            }
        }

        if self.collection.is_empty() {
            self.current_index = None;
            if add_default_if_empty {
                self.insert(InsertParams::default())?;
            }
        } else if index == 0 {
            self.current_index = Some(0);
        }
        Ok(())
    }

    /// Move a section from `from_index` to `to_index`.
    pub fn move_section(&mut self, to_index: usize, from_index: usize) {
        let len = self.collection.len();
        if to_index >= len || from_index >= len {
            tracing::warn!(to_index, from_index, len, "move skipped: index out of range");
            return;
        }
        if let Err(e) = self.collection.move_section(to_index, from_index) {
            tracing::warn!(error = %e, "move failed");
            return;
        }
        self.current_index = Some(to_index);
        if let Some(section) = self.collection.get(to_index) {
            let section = section.snapshot();
            self.emit(MutationFlow::Moved {
                from_index,
                to_index,
                section,
            });
        }
    }

    /// Remove every section, tearing them down through a bounded queue.
    pub async fn clear(&mut self, add_default_if_empty: bool) -> Result<()> {
        let mut removed = Vec::with_capacity(self.collection.len());
        while !self.collection.is_empty() {
            let section = self.collection.remove(0)?;
            self.emit(MutationFlow::Removed {
                index: 0,
                section: section.snapshot(),
            });
            removed.push(section);
        }
        let count = removed.len();
        self.teardown(&removed).await;
        self.release(&removed);
        self.current_index = None;
        tracing::debug!(count, "editor cleared");

        if add_default_if_empty {
            self.insert(InsertParams::default())?;
        }
        Ok(())
    }

    /// Tear down every section and free its surface nodes.
    ///
    /// Publishes no events; the manager is left empty.
    pub async fn destroy(&mut self) {
        let sections = self.collection.remove_all();
        self.current_index = None;
        self.teardown(&sections).await;
        self.release(&sections);
        tracing::debug!(count = sections.len(), "editor destroyed");
    }

    async fn teardown(&self, sections: &[Section]) {
        let limit = self.config.teardown_concurrency.max(1);
        futures::stream::iter(sections)
            .for_each_concurrent(limit, |section| section.destroy())
            .await;
    }

    /// Free the surface subtrees of sections that left the collection.
    fn release(&self, sections: &[Section]) {
        let holders: Vec<NodeId> = sections.iter().map(Section::holder).collect();
        let mut surface = self.collection.surface().write();
        for holder in holders {
            surface.drop_subtree(holder);
        }
    }

    // ========================================================================
    // Event Delivery
    // ========================================================================

    /// Run deferred tasks, deliver journaled mutations and queued user
    /// events, then rebroadcast resulting changes.
    ///
    /// Returns the number of `section.changed` events published.
    pub fn flush(&mut self) -> usize {
        self.scheduler.run_pending();
        let (records, events) = {
            let mut surface = self.collection.surface().write();
            (surface.take_records(), surface.take_events())
        };

        if !records.is_empty() {
            for section in self.collection.iter() {
                section.deliver_mutations(&records);
            }
        }
        for event in &events {
            self.route_event(event);
        }
        self.pump()
    }

    fn route_event(&self, event: &SurfaceEvent) {
        let Some(index) = self.collection.index_of_node(event.target()) else {
            tracing::trace!(?event, "event outside any section");
            return;
        };
        if let Some(section) = self.collection.get(index) {
            section.handle_event(event);
        }
    }

    /// Turn section change notifications into indexed `changed` events.
    pub fn pump(&mut self) -> usize {
        let mut published = 0;
        for message in self.mutated.drain() {
            let EditorFlow::SectionMutated { section_id, holder } = &message.payload else {
                continue;
            };
            let Some(index) = self.collection.index_of_holder(*holder) else {
                tracing::trace!(section = %section_id, "change from a section no longer in the collection");
                continue;
            };
            if let Some(section) = self.collection.get(index) {
                let section = section.snapshot();
                self.emit(MutationFlow::Changed { index, section });
                published += 1;
            }
        }
        published
    }

    fn emit(&self, event: MutationFlow) {
        tracing::trace!(subject = event.subject(), index = event.index(), "mutation event");
        self.mutation_bus.publish(event);
    }
}
