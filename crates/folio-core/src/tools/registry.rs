//! Registry of tool and tune factories.

use std::sync::Arc;

use indexmap::IndexMap;

use super::header::HeaderFactory;
use super::paragraph::ParagraphFactory;
use super::stub::{StubFactory, STUB_TOOL};
use super::tunes::{DeleteTuneFactory, MoveDownTuneFactory, MoveUpTuneFactory};
use super::{ToolAdapter, ToolFactory, TuneAdapter, TuneFactory};
use crate::config::EditorConfig;

/// Tool used when nothing else is configured.
pub const DEFAULT_TOOL: &str = "paragraph";

/// Registry of tools and tunes.
///
/// Adapters are resolved on lookup so they always reflect the current
/// configuration and registered tunes.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn ToolFactory>>,
    tunes: IndexMap<String, Arc<dyn TuneFactory>>,
    config: EditorConfig,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("tunes", &self.tunes.keys().collect::<Vec<_>>())
            .field("default_tool", &self.config.default_tool)
            .finish()
    }
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tools and internal tunes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_tool(DEFAULT_TOOL, Arc::new(ParagraphFactory));
        registry.register_tool("header", Arc::new(HeaderFactory));
        registry.register_tool(STUB_TOOL, Arc::new(StubFactory));
        registry.register_tune("move_up", Arc::new(MoveUpTuneFactory));
        registry.register_tune("delete", Arc::new(DeleteTuneFactory));
        registry.register_tune("move_down", Arc::new(MoveDownTuneFactory));
        registry
    }

    /// Register a tool factory, replacing any previous one.
    pub fn register_tool(&mut self, name: &str, factory: Arc<dyn ToolFactory>) {
        if self.tools.insert(name.to_string(), factory).is_some() {
            tracing::debug!(tool = %name, "replaced tool registration");
        }
    }

    /// Register a tune factory, replacing any previous one.
    pub fn register_tune(&mut self, name: &str, factory: Arc<dyn TuneFactory>) {
        if self.tunes.insert(name.to_string(), factory).is_some() {
            tracing::debug!(tune = %name, "replaced tune registration");
        }
    }

    /// Apply editor configuration.
    pub fn configure(&mut self, config: &EditorConfig) {
        for name in config.tunes.iter() {
            if !self.tunes.contains_key(name) {
                tracing::warn!(tune = %name, "configured tune is not registered");
            }
        }
        if !self.tools.contains_key(&config.default_tool) {
            tracing::warn!(tool = %config.default_tool, "default tool is not registered");
        }
        self.config = config.clone();
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Name of the tool used for fresh sections.
    pub fn default_tool(&self) -> &str {
        &self.config.default_tool
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Registered tune names, in registration order.
    pub fn list_tunes(&self) -> Vec<&str> {
        self.tunes.keys().map(String::as_str).collect()
    }

    /// Resolve a tool adapter.
    pub fn get(&self, name: &str) -> Option<Arc<ToolAdapter>> {
        let factory = self.tools.get(name)?;
        Some(Arc::new(ToolAdapter::new(
            name,
            factory.clone(),
            self.config.settings(name),
            &self.config.inline_sanitize,
            self.resolve_tunes(name),
        )))
    }

    /// Resolve a tune adapter.
    pub fn get_tune(&self, name: &str) -> Option<Arc<TuneAdapter>> {
        let factory = self.tunes.get(name)?;
        Some(Arc::new(TuneAdapter::new(
            name,
            factory.clone(),
            self.config.settings(name).config,
        )))
    }

    /// Tunes for a tool: its own list or the editor-wide user tunes, then
    /// every internal tune in registration order.
    pub fn resolve_tunes(&self, tool: &str) -> Vec<Arc<TuneAdapter>> {
        let user_names = self
            .config
            .tools
            .get(tool)
            .and_then(|s| s.tunes.clone())
            .unwrap_or_else(|| self.config.tunes.clone());

        let mut out = Vec::new();
        for name in user_names {
            match self.get_tune(&name) {
                Some(tune) if !tune.is_internal() => out.push(tune),
                Some(_) => {}
                None => tracing::warn!(tool = %tool, tune = %name, "tune is not registered, skipping"),
            }
        }
        out.extend(
            self.tunes
                .iter()
                .filter(|(_, f)| f.is_internal())
                .filter_map(|(name, _)| self.get_tune(name)),
        );
        out
    }
}
