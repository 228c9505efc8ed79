//! Section: one content unit wrapping a tool instance.
//!
//! A section owns the holder subtree on the surface:
//!
//! ```text
//! div.ce-block[data-id]
//! └── div.ce-block__content
//!     └── tune wrappers (user tunes innermost, then internal tunes)
//!         └── tool root
//! ```
//!
//! It owns its tool and tune instances, extracts data through `save`,
//! and turns observed surface mutations into change notifications on the
//! editor bus. Mutation watching and input listeners are registered from
//! an idle task, so a freshly composed section is not yet listening.
//!
//! # Locking
//!
//! Section state and the surface are never locked across a tool or tune
//! call, except for `render`, `wrap` and `render_settings`, which receive
//! the locked surface explicitly. State is always taken before the surface
//! when both are needed, and never both at once from outside this module.

mod api;
mod mutations;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use folio_types::{SavedSection, SectionData, SectionId, TunesData};
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::conversion::{self, ConversionDirection};
use crate::error::{EditorError, Result};
use crate::flows::{EditorFlow, SectionSnapshot, SharedEditorFlowBus};
use crate::scheduler::IdleScheduler;
use crate::surface::{NodeId, SharedSurface, SurfaceEvent};
use crate::tools::{
    BlockTool, BlockTune, MenuItem, ToolAdapter, ToolContext, ToolMethod, ToolboxEntry, TuneContext,
    TuneRender,
};

pub use api::SectionApi;

pub const HOLDER_CLASS: &str = "ce-block";
pub const CONTENT_CLASS: &str = "ce-block__content";
pub const SELECTED_CLASS: &str = "ce-block--selected";
pub const STRETCHED_CLASS: &str = "ce-block--stretched";
/// Elements carrying `data-mutation-free="true"` do not count as content.
pub const MUTATION_FREE_ATTR: &str = "data-mutation-free";
/// Emptiness mark maintained on every input.
pub const EMPTY_ATTR: &str = "data-empty";

/// Construction parameters.
#[derive(Clone, Debug)]
pub struct SectionParams {
    /// Generated when absent.
    pub id: Option<SectionId>,
    pub data: SectionData,
    pub tool: Arc<ToolAdapter>,
    pub read_only: bool,
    /// Saved tune data keyed by tune name.
    pub tunes_data: TunesData,
    pub event_bus: Option<SharedEditorFlowBus>,
}

/// Aggregated tune UI.
#[derive(Clone, Debug, PartialEq)]
pub struct SectionTunes {
    /// Items from the tool's own settings.
    pub tool_tunes: Vec<MenuItem>,
    /// Items from internal then user tunes.
    pub common_tunes: Vec<MenuItem>,
    /// Detached container holding every raw tune element.
    pub custom_html_tunes: NodeId,
}

pub(crate) struct SectionInner {
    id: SectionId,
    tool: Arc<ToolAdapter>,
    instance: Arc<dyn BlockTool>,
    /// User tunes keyed by name.
    tunes: IndexMap<String, Arc<dyn BlockTune>>,
    /// Internal tunes keyed by name.
    default_tunes: IndexMap<String, Arc<dyn BlockTune>>,
    /// Tune data with no registered tune, kept for re-save.
    unavailable_tunes_data: TunesData,
    surface: SharedSurface,
    event_bus: Option<SharedEditorFlowBus>,
    state: RwLock<SectionState>,
}

struct SectionState {
    holder: NodeId,
    content: NodeId,
    tool_root: NodeId,
    inputs: Option<Vec<NodeId>>,
    input_index: usize,
    /// Journal sequence at watch registration; `None` while not watching.
    watch_from: Option<u64>,
    listening: bool,
    interactions_bound: bool,
    destroyed: bool,
}

/// A live section. Clones share the same section.
#[derive(Clone)]
pub struct Section {
    inner: Arc<SectionInner>,
}

impl PartialEq for Section {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Section {}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("id", &self.inner.id)
            .field("tool", &self.inner.tool.name())
            .field("holder", &self.holder())
            .finish()
    }
}

impl Section {
    /// Compose a section: construct the tool and its tunes, render and wrap
    /// the content, and defer watcher registration to `scheduler`.
    pub fn new(params: SectionParams, surface: &SharedSurface, scheduler: &IdleScheduler) -> Result<Self> {
        let SectionParams {
            id,
            data,
            tool,
            read_only,
            tunes_data,
            event_bus,
        } = params;
        let id = id.unwrap_or_else(SectionId::generate);
        let api = SectionApi::new(id.clone(), tool.name());

        let instance = tool.create(ToolContext {
            data,
            api: api.clone(),
            config: tool.config().clone(),
            read_only,
            surface: surface.clone(),
        })?;

        let mut tunes = IndexMap::new();
        let mut default_tunes = IndexMap::new();
        for adapter in tool.tunes() {
            let ctx = TuneContext {
                api: api.clone(),
                data: tunes_data.get(adapter.name()).cloned(),
                config: adapter.config().clone(),
                read_only,
            };
            match adapter.create(ctx) {
                Ok(tune) if adapter.is_internal() => {
                    default_tunes.insert(adapter.name().to_string(), tune);
                }
                Ok(tune) => {
                    tunes.insert(adapter.name().to_string(), tune);
                }
                Err(e) => {
                    tracing::warn!(tool = %tool.name(), tune = %adapter.name(), error = %e, "tune construction failed");
                }
            }
        }
        let unavailable_tunes_data: TunesData = tunes_data
            .into_iter()
            .filter(|(name, _)| !tunes.contains_key(name) && !default_tunes.contains_key(name))
            .collect();

        let (holder, content, tool_root) = {
            let mut s = surface.write();
            let tool_root = instance.render(&mut s);
            let mut wrapped = tool_root;
            for (name, tune) in tunes.iter().chain(default_tunes.iter()) {
                match std::panic::catch_unwind(AssertUnwindSafe(|| tune.wrap(wrapped, &mut s))) {
                    Ok(Ok(node)) => wrapped = node,
                    Ok(Err(e)) => tracing::warn!(tool = %tool.name(), tune = %name, error = %e, "tune wrap failed"),
                    Err(_) => tracing::warn!(tool = %tool.name(), tune = %name, "tune wrap panicked"),
                }
            }
            let content = s.make("div", &[("class", CONTENT_CLASS)]);
            s.append_child(content, wrapped);
            let holder = s.make("div", &[("class", HOLDER_CLASS), ("data-id", id.as_str())]);
            s.append_child(holder, content);
            (holder, content, tool_root)
        };

        let inner = Arc::new(SectionInner {
            id,
            tool,
            instance,
            tunes,
            default_tunes,
            unavailable_tunes_data,
            surface: surface.clone(),
            event_bus,
            state: RwLock::new(SectionState {
                holder,
                content,
                tool_root,
                inputs: None,
                input_index: 0,
                watch_from: None,
                listening: false,
                interactions_bound: false,
                destroyed: false,
            }),
        });
        api.bind(&inner);

        let weak = Arc::downgrade(&inner);
        scheduler.schedule("section.watch", move || {
            if let Some(inner) = weak.upgrade() {
                Section::from_inner(inner).start_watching();
            }
        });

        let section = Section { inner };
        tracing::trace!(section = %section.id(), tool = %section.name(), "section composed");
        Ok(section)
    }

    pub(crate) fn from_inner(inner: Arc<SectionInner>) -> Self {
        Self { inner }
    }

    // ========================================================================
    // Façade
    // ========================================================================

    pub fn id(&self) -> &SectionId {
        &self.inner.id
    }

    /// Tool name.
    pub fn name(&self) -> &str {
        self.inner.tool.name()
    }

    pub fn tool(&self) -> &Arc<ToolAdapter> {
        &self.inner.tool
    }

    pub fn config(&self) -> &Value {
        self.inner.tool.config()
    }

    /// Outermost element of the section.
    pub fn holder(&self) -> NodeId {
        self.inner.state.read().holder
    }

    /// Root element the tool rendered (follows tool-side replacement).
    pub fn tool_root(&self) -> NodeId {
        self.inner.state.read().tool_root
    }

    pub fn api(&self) -> SectionApi {
        let api = SectionApi::new(self.inner.id.clone(), self.name());
        api.bind(&self.inner);
        api
    }

    /// No visible text and no media.
    pub fn is_empty(&self) -> bool {
        let root = self.tool_root();
        let surface = self.inner.surface.read();
        surface.is_empty(root) && !surface.has_media(root)
    }

    pub fn has_media(&self) -> bool {
        let root = self.tool_root();
        self.inner.surface.read().has_media(root)
    }

    pub fn selected(&self) -> bool {
        let holder = self.holder();
        self.inner.surface.read().has_class(holder, SELECTED_CLASS)
    }

    /// Toggle the selected mark and announce it on the editor bus.
    pub fn set_selected(&self, selected: bool) {
        let holder = self.holder();
        let changed = {
            let mut surface = self.inner.surface.write();
            let before = surface.has_class(holder, SELECTED_CLASS);
            surface.toggle_class(holder, SELECTED_CLASS, selected);
            before != selected
        };
        if changed {
            self.publish(EditorFlow::SelectionChanged {
                section_id: self.id().clone(),
                selected,
            });
        }
    }

    pub fn stretched(&self) -> bool {
        let holder = self.holder();
        self.inner.surface.read().has_class(holder, STRETCHED_CLASS)
    }

    pub fn set_stretched(&self, stretched: bool) {
        let holder = self.holder();
        self.inner.surface.write().toggle_class(holder, STRETCHED_CLASS, stretched);
    }

    /// Whether the section has at least one input.
    pub fn focusable(&self) -> bool {
        !self.inputs().is_empty()
    }

    /// Snapshot of the façade for event payloads.
    pub fn snapshot(&self) -> SectionSnapshot {
        SectionSnapshot {
            id: self.id().clone(),
            name: self.name().to_string(),
            holder: self.holder(),
            is_empty: self.is_empty(),
            selected: self.selected(),
            stretched: self.stretched(),
            focusable: self.focusable(),
        }
    }

    // ========================================================================
    // Tool Dispatch
    // ========================================================================

    /// Invoke a named tool method if the tool has it. Failures are logged.
    pub fn call(&self, method: &str, params: &Value) {
        let instance = &self.inner.instance;
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| instance.call(method, params)));
        match result {
            Ok(None) => tracing::trace!(tool = %self.name(), method, "tool has no such method"),
            Ok(Some(Ok(()))) => {}
            Ok(Some(Err(e))) => {
                tracing::warn!(tool = %self.name(), method, error = %e, "tool method failed");
            }
            Err(_) => tracing::warn!(tool = %self.name(), method, "tool method panicked"),
        }
    }

    /// Extract section data.
    ///
    /// Tune saves run concurrently with the tool save; a failing tune is
    /// logged and left out. `None` means the tool's save failed.
    pub async fn save(&self) -> Option<SavedSection> {
        let inner = &self.inner;
        let root = self.tool_root();
        let started = Instant::now();

        let tool_save = AssertUnwindSafe(inner.instance.save(root)).catch_unwind();
        let tune_saves = futures::future::join_all(inner.tunes.iter().chain(inner.default_tunes.iter()).map(
            |(name, tune)| async move { (name.clone(), AssertUnwindSafe(tune.save()).catch_unwind().await) },
        ));
        let (tool_result, tune_results) = futures::join!(tool_save, tune_saves);
        let time = started.elapsed().as_secs_f64() * 1000.0;

        let mut tunes = inner.unavailable_tunes_data.clone();
        for (name, result) in tune_results {
            match result {
                Ok(Some(Ok(value))) => {
                    tunes.insert(name, value);
                }
                Ok(None) => {}
                Ok(Some(Err(e))) => {
                    tracing::warn!(section = %inner.id, tune = %name, error = %e, "tune save failed");
                }
                Err(_) => tracing::warn!(section = %inner.id, tune = %name, "tune save panicked"),
            }
        }

        match tool_result {
            Ok(Ok(data)) => Some(SavedSection {
                id: inner.id.clone(),
                tool: self.name().to_string(),
                data,
                tunes,
                time,
            }),
            Ok(Err(e)) => {
                tracing::warn!(section = %inner.id, tool = %self.name(), error = %e, "saving section failed");
                None
            }
            Err(_) => {
                tracing::warn!(section = %inner.id, tool = %self.name(), "saving section panicked");
                None
            }
        }
    }

    /// Validate data with the tool's validator.
    pub async fn validate(&self, data: &SectionData) -> bool {
        self.inner.instance.validate(data).await
    }

    pub fn is_mergeable(&self) -> bool {
        self.inner.instance.is_mergeable()
    }

    /// Merge data into this section. Check [`Section::is_mergeable`] first.
    pub async fn merge_with(&self, data: SectionData) -> anyhow::Result<()> {
        self.inner.instance.merge(data).await
    }

    /// Export current data through the tool's conversion rules.
    pub async fn export_data_as_string(&self) -> Result<String> {
        let rule = self
            .inner
            .tool
            .conversion_config()
            .and_then(|c| c.export)
            .ok_or_else(|| EditorError::not_convertible(self.name(), ConversionDirection::Export))?;
        let saved = self
            .save()
            .await
            .ok_or_else(|| EditorError::DataUnavailable(self.id().to_string()))?;
        Ok(conversion::data_to_string(&saved.data, &rule))
    }

    /// Toolbox entry describing the section's current state.
    ///
    /// A single entry is returned as is. Otherwise an entry matches when it
    /// declares data and every declared property equals the saved data.
    pub async fn active_toolbox_entry(&self) -> Option<ToolboxEntry> {
        let toolbox = self.inner.tool.toolbox();
        if toolbox.len() == 1 {
            return toolbox.into_iter().next();
        }
        let saved = self.save().await?;
        toolbox.into_iter().find(|entry| match &entry.data {
            Some(declared) if !declared.is_empty() => declared
                .iter()
                .all(|(key, value)| saved.data.get(key) == Some(value)),
            _ => false,
        })
    }

    /// Aggregate tool settings and tune UI.
    pub fn get_tunes(&self) -> SectionTunes {
        let inner = &self.inner;
        let mut tool_tunes = Vec::new();
        let mut common_tunes = Vec::new();
        let mut surface = inner.surface.write();
        let container = surface.make("div", &[("class", "ce-block-tunes")]);

        if let Some(render) = inner.instance.render_settings(&mut surface) {
            match render {
                TuneRender::Items(items) => tool_tunes.extend(items),
                TuneRender::Element(node) => surface.append_child(container, node),
            }
        }
        for (name, tune) in inner.default_tunes.iter().chain(inner.tunes.iter()) {
            match std::panic::catch_unwind(AssertUnwindSafe(|| tune.render(&mut surface))) {
                Ok(TuneRender::Items(items)) => common_tunes.extend(items),
                Ok(TuneRender::Element(node)) => surface.append_child(container, node),
                Err(_) => tracing::warn!(tool = %self.name(), tune = %name, "tune render panicked"),
            }
        }

        SectionTunes {
            tool_tunes,
            common_tunes,
            custom_html_tunes: container,
        }
    }

    /// Saved data of registered-but-absent tunes.
    pub fn unavailable_tunes_data(&self) -> &TunesData {
        &self.inner.unavailable_tunes_data
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Focusable inputs inside the section, cached until the next change.
    pub fn inputs(&self) -> Vec<NodeId> {
        let holder = {
            let state = self.inner.state.read();
            if let Some(inputs) = &state.inputs {
                return inputs.clone();
            }
            state.holder
        };
        let found = self.inner.surface.read().find_all_inputs(holder);
        let mut state = self.inner.state.write();
        if state.input_index >= found.len() {
            state.input_index = found.len().saturating_sub(1);
        }
        state.inputs = Some(found.clone());
        found
    }

    fn input_at(&self, offset: isize) -> Option<NodeId> {
        let inputs = self.inputs();
        let index = self.inner.state.read().input_index as isize + offset;
        usize::try_from(index).ok().and_then(|i| inputs.get(i).copied())
    }

    pub fn current_input(&self) -> Option<NodeId> {
        self.input_at(0)
    }

    pub fn next_input(&self) -> Option<NodeId> {
        self.input_at(1)
    }

    pub fn previous_input(&self) -> Option<NodeId> {
        self.input_at(-1)
    }

    pub fn first_input(&self) -> Option<NodeId> {
        self.inputs().first().copied()
    }

    pub fn last_input(&self) -> Option<NodeId> {
        self.inputs().last().copied()
    }

    /// Make the input containing `node` current. Returns whether one did.
    pub fn set_current_input(&self, node: NodeId) -> bool {
        let inputs = self.inputs();
        let position = {
            let surface = self.inner.surface.read();
            inputs.iter().position(|input| surface.contains(*input, node))
        };
        match position {
            Some(index) => {
                self.inner.state.write().input_index = index;
                true
            }
            None => false,
        }
    }

    /// Point the current input at the selection anchor.
    pub fn update_current_input(&self) {
        let anchor = self.inner.surface.read().selection();
        if let Some(anchor) = anchor {
            self.set_current_input(anchor);
        }
    }

    fn drop_inputs_cache(&self) {
        self.inner.state.write().inputs = None;
    }

    fn toggle_empty_marks(&self) {
        let inputs = self.inputs();
        let mut surface = self.inner.surface.write();
        for input in inputs {
            let empty = if surface.is_empty(input) { "true" } else { "false" };
            surface.set_attribute(input, EMPTY_ATTR, empty);
        }
    }

    // ========================================================================
    // Change Detection
    // ========================================================================

    fn start_watching(&self) {
        let seq = self.inner.surface.read().seq();
        {
            let mut state = self.inner.state.write();
            if state.destroyed {
                return;
            }
            state.watch_from = Some(seq);
            state.listening = true;
        }
        self.toggle_empty_marks();
        tracing::trace!(section = %self.id(), seq, "watching section mutations");
    }

    pub(crate) fn bind_interactions(&self) {
        let mut state = self.inner.state.write();
        if !state.destroyed {
            state.interactions_bound = true;
        }
    }

    /// Whether mutation watching has been registered.
    pub fn is_watching(&self) -> bool {
        self.inner.state.read().watch_from.is_some()
    }

    /// Whether interaction listeners are bound.
    pub fn interactions_bound(&self) -> bool {
        self.inner.state.read().interactions_bound
    }

    /// Fire the change notification without an observed mutation.
    pub fn dispatch_change(&self) {
        self.did_mutate();
    }

    /// Classify a delivered mutation batch. Returns whether a change fired.
    pub(crate) fn deliver_mutations(&self, records: &[crate::surface::MutationRecord]) -> bool {
        let (content, root, watch_from) = {
            let state = self.inner.state.read();
            match state.watch_from {
                Some(seq) if !state.destroyed => (state.content, state.tool_root, seq),
                _ => return false,
            }
        };

        let (new_root, fire) = {
            let surface = self.inner.surface.read();
            let relevant = mutations::relevant_records(&surface, content, watch_from, records);
            if relevant.is_empty() {
                return false;
            }
            (
                mutations::replaced_root(&relevant, root),
                mutations::should_fire(&surface, &relevant),
            )
        };

        if let Some(new_root) = new_root {
            tracing::debug!(section = %self.id(), ?root, ?new_root, "tool replaced its root");
            self.inner.state.write().tool_root = new_root;
        }

        if fire {
            self.did_mutate();
        } else {
            tracing::trace!(section = %self.id(), "mutation batch is mutation-free, suppressed");
        }
        fire
    }

    /// Route a user event to this section. Returns whether it was handled.
    pub(crate) fn handle_event(&self, event: &SurfaceEvent) -> bool {
        let (listening, interactions_bound) = {
            let state = self.inner.state.read();
            (state.listening && !state.destroyed, state.interactions_bound)
        };
        match event {
            SurfaceEvent::Input { target } => {
                if !listening {
                    return false;
                }
                let inputs = self.inputs();
                let native = {
                    let surface = self.inner.surface.read();
                    inputs
                        .iter()
                        .any(|input| surface.contains(*input, *target) && surface.is_native_input(*input))
                };
                if native {
                    self.did_mutate();
                }
                native
            }
            SurfaceEvent::FocusIn { target } => listening && self.set_current_input(*target),
            SurfaceEvent::Interaction { kind, .. } => {
                if interactions_bound {
                    self.publish(EditorFlow::Interaction {
                        section_id: self.id().clone(),
                        kind: kind.clone(),
                    });
                }
                interactions_bound
            }
        }
    }

    fn did_mutate(&self) {
        self.drop_inputs_cache();
        self.update_current_input();
        self.toggle_empty_marks();
        self.call(ToolMethod::Updated.as_ref(), &Value::Null);
        self.publish(EditorFlow::SectionMutated {
            section_id: self.id().clone(),
            holder: self.holder(),
        });
    }

    fn publish(&self, event: EditorFlow) {
        if let Some(bus) = &self.inner.event_bus {
            bus.publish(event);
        }
    }

    /// Call the `moved` hook.
    pub(crate) fn notify_moved(&self, from_index: usize, to_index: usize) {
        self.call(
            ToolMethod::Moved.as_ref(),
            &json!({"fromIndex": from_index, "toIndex": to_index}),
        );
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Stop watching and listening, then run the tool's destroy hook.
    pub async fn destroy(&self) {
        {
            let mut state = self.inner.state.write();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.watch_from = None;
            state.listening = false;
            state.interactions_bound = false;
            state.inputs = None;
        }
        self.inner.instance.destroy().await;
        tracing::trace!(section = %self.id(), "section destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.read().destroyed
    }
}
