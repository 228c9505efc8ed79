//! Paragraph tool: one editable text element.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use folio_types::SectionData;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{BlockTool, ToolContext, ToolFactory, ToolMethod, ToolboxEntry};
use crate::conversion::ConversionConfig;
use crate::sanitizer::{SanitizeConfig, SanitizeRule, TagRule};
use crate::surface::{NodeId, SharedSurface, Surface};

pub const PARAGRAPH_CLASS: &str = "ce-paragraph";

/// Factory for [`Paragraph`].
#[derive(Debug, Default)]
pub struct ParagraphFactory;

impl ToolFactory for ParagraphFactory {
    fn create(&self, ctx: ToolContext) -> anyhow::Result<Arc<dyn BlockTool>> {
        Ok(Arc::new(Paragraph::new(ctx)))
    }

    fn conversion_config(&self) -> Option<ConversionConfig> {
        Some(ConversionConfig::field("text"))
    }

    fn sanitize_config(&self) -> SanitizeConfig {
        let tags = BTreeMap::from([("br".to_string(), TagRule::Allow(true))]);
        BTreeMap::from([("text".to_string(), SanitizeRule::Tags(tags))])
    }

    fn toolbox(&self) -> Vec<ToolboxEntry> {
        vec![ToolboxEntry::titled("Text")]
    }
}

/// Plain text section.
///
/// Config keys: `placeholder` (string), `preserveBlank` (keep empty
/// paragraphs on save).
pub struct Paragraph {
    text: String,
    placeholder: Option<String>,
    preserve_blank: bool,
    read_only: bool,
    surface: SharedSurface,
    root: Mutex<Option<NodeId>>,
}

impl Paragraph {
    fn new(ctx: ToolContext) -> Self {
        Self {
            text: ctx
                .data
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            placeholder: ctx.config.get("placeholder").and_then(Value::as_str).map(String::from),
            preserve_blank: ctx
                .config
                .get("preserveBlank")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            read_only: ctx.read_only,
            surface: ctx.surface,
            root: Mutex::new(None),
        }
    }

    fn set_content(&self, text: &str) -> anyhow::Result<()> {
        let root = (*self.root.lock()).ok_or_else(|| anyhow::anyhow!("paragraph is not rendered"))?;
        self.surface.write().set_text(root, text);
        Ok(())
    }
}

#[async_trait]
impl BlockTool for Paragraph {
    fn render(&self, surface: &mut Surface) -> NodeId {
        let root = surface.make("div", &[("class", "ce-paragraph cdx-block")]);
        if !self.read_only {
            surface.set_attribute(root, "contenteditable", "true");
        }
        if let Some(placeholder) = &self.placeholder {
            surface.set_attribute(root, "data-placeholder", placeholder);
        }
        if !self.text.is_empty() {
            let text = surface.create_text(&self.text);
            surface.append_child(root, text);
        }
        *self.root.lock() = Some(root);
        root
    }

    async fn save(&self, root: NodeId) -> anyhow::Result<SectionData> {
        let text = self.surface.read().text_content(root);
        let mut data = SectionData::new();
        data.insert("text".into(), json!(text));
        Ok(data)
    }

    async fn validate(&self, data: &SectionData) -> bool {
        let blank = data
            .get("text")
            .and_then(Value::as_str)
            .map(|t| t.trim().is_empty())
            .unwrap_or(true);
        !blank || self.preserve_blank
    }

    fn is_mergeable(&self) -> bool {
        true
    }

    async fn merge(&self, data: SectionData) -> anyhow::Result<()> {
        let root = (*self.root.lock()).ok_or_else(|| anyhow::anyhow!("paragraph is not rendered"))?;
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
        Some(match params.get("data").and_then(Value::as_str) {
            Some(text) => self.set_content(text),
            None => Err(anyhow::anyhow!("paste payload has no text")),
        })
    }
}
