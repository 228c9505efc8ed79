//! Tool and tune contracts, adapters and the registry.
//!
//! A tool is the pluggable content type a section wraps; a tune is a
//! per-section behavior or menu extension. Both are constructed through a
//! factory so the registry can hold one factory per name and the section
//! can build fresh instances.
//!
//! Every optional capability has a default implementation that reports
//! absence (`None`, `false`, passthrough). The section checks presence and
//! contains failures, so a plugin never breaks the collection.

mod adapter;
pub mod header;
pub mod paragraph;
mod registry;
pub mod stub;
pub mod tunes;

use async_trait::async_trait;
use folio_types::SectionData;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::conversion::ConversionConfig;
use crate::sanitizer::SanitizeConfig;
use crate::section::SectionApi;
use crate::surface::{NodeId, SharedSurface, Surface};

pub use adapter::{ToolAdapter, TuneAdapter};
pub use registry::{ToolRegistry, DEFAULT_TOOL};

// ============================================================================
// Descriptors
// ============================================================================

/// Declarative menu entry rendered by a tune or a tool's settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl MenuItem {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            icon: None,
            is_active: false,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// What a tune or tool settings renderer produced.
#[derive(Clone, Debug, PartialEq)]
pub enum TuneRender {
    /// Menu item descriptors.
    Items(Vec<MenuItem>),
    /// A raw element built on the surface.
    Element(NodeId),
}

/// Toolbox entry a tool offers. `data` presets section data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolboxEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SectionData>,
}

impl ToolboxEntry {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: SectionData) -> Self {
        self.data = Some(data);
        self
    }
}

/// Named tool methods the core invokes through [`BlockTool::call`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum ToolMethod {
    /// Section attached to the surface.
    Rendered,
    /// Section content changed.
    Updated,
    /// Section detached from the surface.
    Removed,
    /// Section moved; params carry `fromIndex` and `toIndex`.
    Moved,
    /// Pasted content; params carry the pasted payload.
    OnPaste,
}

// ============================================================================
// Tool Contract
// ============================================================================

/// Everything a tool constructor receives.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub data: SectionData,
    pub api: SectionApi,
    /// Tool configuration from the editor config.
    pub config: Value,
    pub read_only: bool,
    pub surface: SharedSurface,
}

/// A live tool instance owned by one section.
#[async_trait]
pub trait BlockTool: Send + Sync {
    /// Build the content subtree (detached) and return its root.
    fn render(&self, surface: &mut Surface) -> NodeId;

    /// Extract data from the rendered root.
    async fn save(&self, root: NodeId) -> anyhow::Result<SectionData>;

    /// Validate saved data. Absence of a validator means valid.
    async fn validate(&self, _data: &SectionData) -> bool {
        true
    }

    /// Whether [`BlockTool::merge`] is implemented.
    fn is_mergeable(&self) -> bool {
        false
    }

    /// Append another section's data to this one.
    async fn merge(&self, _data: SectionData) -> anyhow::Result<()> {
        anyhow::bail!("tool does not support merging")
    }

    /// Tool-specific settings UI.
    fn render_settings(&self, _surface: &mut Surface) -> Option<TuneRender> {
        None
    }

    /// Invoke a named method. `None` means the tool has no such method.
    fn call(&self, _method: &str, _params: &Value) -> Option<anyhow::Result<()>> {
        None
    }

    /// Release resources. Called once when the section is destroyed.
    async fn destroy(&self) {}
}

/// Constructs tool instances and declares class-level capabilities.
pub trait ToolFactory: Send + Sync {
    fn create(&self, ctx: ToolContext) -> anyhow::Result<std::sync::Arc<dyn BlockTool>>;

    fn conversion_config(&self) -> Option<ConversionConfig> {
        None
    }

    fn sanitize_config(&self) -> SanitizeConfig {
        SanitizeConfig::new()
    }

    fn toolbox(&self) -> Vec<ToolboxEntry> {
        Vec::new()
    }

    /// Internal tools are registered by the editor itself.
    fn is_internal(&self) -> bool {
        false
    }
}

// ============================================================================
// Tune Contract
// ============================================================================

/// Everything a tune constructor receives.
#[derive(Clone, Debug)]
pub struct TuneContext {
    pub api: SectionApi,
    /// Saved data for this tune, if any.
    pub data: Option<Value>,
    pub config: Value,
    pub read_only: bool,
}

/// A live tune instance owned by one section.
#[async_trait]
pub trait BlockTune: Send + Sync {
    fn render(&self, surface: &mut Surface) -> TuneRender;

    /// Wrap the section content. Returns the new outer node.
    fn wrap(&self, content: NodeId, _surface: &mut Surface) -> anyhow::Result<NodeId> {
        Ok(content)
    }

    /// Tune data to persist. `None` means the tune saves nothing.
    async fn save(&self) -> Option<anyhow::Result<Value>> {
        None
    }
}

/// Constructs tune instances.
pub trait TuneFactory: Send + Sync {
    fn create(&self, ctx: TuneContext) -> anyhow::Result<std::sync::Arc<dyn BlockTune>>;

    fn is_internal(&self) -> bool {
        false
    }
}
