//! Header tool: an `h1`..`h6` editable heading.

use std::sync::Arc;

use async_trait::async_trait;
use folio_types::SectionData;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{BlockTool, ToolContext, ToolFactory, ToolMethod, ToolboxEntry};
use crate::conversion::{ConversionConfig, ExportRule, ImportRule};
use crate::sanitizer::{SanitizeConfig, SanitizeRule, TagRules};
use crate::surface::{NodeId, SharedSurface, Surface};

const ALL_LEVELS: [u64; 6] = [1, 2, 3, 4, 5, 6];
const DEFAULT_LEVEL: u64 = 2;

/// Factory for [`Header`].
#[derive(Debug, Default)]
pub struct HeaderFactory;

impl ToolFactory for HeaderFactory {
    fn create(&self, ctx: ToolContext) -> anyhow::Result<Arc<dyn BlockTool>> {
        Ok(Arc::new(Header::new(ctx)?))
    }

    fn conversion_config(&self) -> Option<ConversionConfig> {
        let import = ImportRule::Transform(Arc::new(|text: &str, config: &Value| {
            let mut data = SectionData::new();
            data.insert("text".into(), json!(text));
            data.insert("level".into(), json!(default_level(config)));
            data
        }));
        Some(ConversionConfig {
            export: Some(ExportRule::Field("text".into())),
            import: Some(import),
        })
    }

    fn sanitize_config(&self) -> SanitizeConfig {
        SanitizeConfig::from([
            ("level".to_string(), SanitizeRule::Allow(false)),
            ("text".to_string(), SanitizeRule::Tags(TagRules::new())),
        ])
    }

    fn toolbox(&self) -> Vec<ToolboxEntry> {
        ALL_LEVELS
            .iter()
            .map(|level| {
                let mut data = SectionData::new();
                data.insert("level".into(), json!(level));
                ToolboxEntry::titled(format!("Heading {level}")).with_data(data)
            })
            .collect()
    }
}

fn allowed_levels(config: &Value) -> Vec<u64> {
    config
        .get("levels")
        .and_then(Value::as_array)
        .map(|levels| levels.iter().filter_map(Value::as_u64).filter(|l| ALL_LEVELS.contains(l)).collect())
        .filter(|levels: &Vec<u64>| !levels.is_empty())
        .unwrap_or_else(|| ALL_LEVELS.to_vec())
}

fn default_level(config: &Value) -> u64 {
    let levels = allowed_levels(config);
    config
        .get("defaultLevel")
        .and_then(Value::as_u64)
        .filter(|l| levels.contains(l))
        .unwrap_or_else(|| {
            if levels.contains(&DEFAULT_LEVEL) {
                DEFAULT_LEVEL
            } else {
                levels[0]
            }
        })
}

/// Heading section. Config keys: `levels`, `defaultLevel`.
pub struct Header {
    text: String,
    level: u64,
    read_only: bool,
    surface: SharedSurface,
    root: Mutex<Option<NodeId>>,
}

impl Header {
    fn new(ctx: ToolContext) -> anyhow::Result<Self> {
        let levels = allowed_levels(&ctx.config);
        let requested = ctx.data.get("level").and_then(Value::as_u64);
        let level = match requested {
            Some(level) if levels.contains(&level) => level,
            Some(level) => {
                tracing::debug!(level, "header level not allowed, using default");
                default_level(&ctx.config)
            }
            None => default_level(&ctx.config),
        };
        let text = match ctx.data.get("text") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => anyhow::bail!("header text must be a string, got {other}"),
        };
        Ok(Self {
            text,
            level,
            read_only: ctx.read_only,
            surface: ctx.surface,
            root: Mutex::new(None),
        })
    }
}

#[async_trait]
impl BlockTool for Header {
    fn render(&self, surface: &mut Surface) -> NodeId {
        let root = surface.make(&format!("h{}", self.level), &[("class", "ce-header")]);
        if !self.read_only {
            surface.set_attribute(root, "contenteditable", "true");
        }
        if !self.text.is_empty() {
            let text = surface.create_text(&self.text);
            surface.append_child(root, text);
        }
        *self.root.lock() = Some(root);
        root
    }

    async fn save(&self, root: NodeId) -> anyhow::Result<SectionData> {
        let surface = self.surface.read();
        let level = surface
            .tag(root)
            .and_then(|t| t.strip_prefix('h'))
            .and_then(|l| l.parse::<u64>().ok())
            .unwrap_or(self.level);
        let mut data = SectionData::new();
        data.insert("text".into(), json!(surface.text_content(root)));
        data.insert("level".into(), json!(level));
        Ok(data)
    }

    async fn validate(&self, data: &SectionData) -> bool {
        data.get("text")
            .and_then(Value::as_str)
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }

    fn is_mergeable(&self) -> bool {
        true
    }

    async fn merge(&self, data: SectionData) -> anyhow::Result<()> {
        let root = (*self.root.lock()).ok_or_else(|| anyhow::anyhow!("header is not rendered"))?;
        let addition = data.get("text").and_then(Value::as_str).unwrap_or_default();
        let mut surface = self.surface.write();
        let merged = format!("{}{}", surface.text_content(root), addition);
        surface.set_text(root, &merged);
        Ok(())
    }

    fn call(&self, method: &str, params: &Value) -> Option<anyhow::Result<()>> {
        if method != ToolMethod::OnPaste.as_ref() {
            return None;
        }
        let root = (*self.root.lock())?;
        let text = params.get("data").and_then(Value::as_str).unwrap_or_default();
        self.surface.write().set_text(root, text);
        Some(Ok(()))
    }
}
