//! Editor configuration.
//!
//! Loaded from RON. Every field has a default so an empty document `()` is
//! a valid configuration.
//!
//! ```ron
//! (
//!     default_tool: "paragraph",
//!     tunes: ["anchor"],
//!     tools: {
//!         "header": (config: {"levels": [2, 3]}, tunes: Some([])),
//!     },
//!     inline_sanitize: {"b": true, "a": {"href": true}},
//!     teardown_concurrency: 8,
//! )
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EditorError, Result};
use crate::sanitizer::TagRules;
use crate::tools::ToolboxEntry;

/// Per-tool (or per-tune) settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Configuration handed to the tool constructor.
    pub config: Value,
    /// Overrides the editor-wide user tune list for this tool.
    pub tunes: Option<Vec<String>>,
    /// Overrides the tool's own toolbox entries.
    pub toolbox: Option<Vec<ToolboxEntry>>,
}

/// Editor-wide configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Tool used for fresh sections.
    pub default_tool: String,
    pub read_only: bool,
    /// User tunes applied to every tool without its own list.
    pub tunes: Vec<String>,
    /// Settings keyed by tool or tune name.
    pub tools: HashMap<String, ToolSettings>,
    /// Inline tag rules merged into every tool's sanitize rules.
    pub inline_sanitize: TagRules,
    /// Capacity of each event bus.
    pub event_capacity: usize,
    /// Maximum simultaneous section teardowns.
    pub teardown_concurrency: usize,
    /// Deferred tasks run at the latest after this many milliseconds.
    pub idle_timeout_ms: Option<u64>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_tool: crate::tools::DEFAULT_TOOL.to_string(),
            read_only: false,
            tunes: Vec::new(),
            tools: HashMap::new(),
            inline_sanitize: TagRules::new(),
            event_capacity: 1024,
            teardown_concurrency: 4,
            idle_timeout_ms: None,
        }
    }
}

impl EditorConfig {
    /// Parse RON text.
    pub fn from_ron(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.ron` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&text)?;
        tracing::debug!(path = %path.display(), "loaded editor config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.default_tool.is_empty() {
            return Err(EditorError::Config("default_tool must not be empty".into()));
        }
        if self.event_capacity == 0 {
            return Err(EditorError::Config("event_capacity must be positive".into()));
        }
        if self.teardown_concurrency == 0 {
            return Err(EditorError::Config("teardown_concurrency must be positive".into()));
        }
        Ok(())
    }

    /// Settings for a tool or tune, default when not configured.
    pub fn settings(&self, name: &str) -> ToolSettings {
        self.tools.get(name).cloned().unwrap_or_default()
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}
