//! Stub tool standing in for sections whose tool is missing or broken.
//!
//! The original payload is kept verbatim and handed back on save, so a
//! document round-trips even when it cannot be displayed.

use std::sync::Arc;

use async_trait::async_trait;
use folio_types::{OutputSection, SectionData, SectionId};
use serde_json::{json, Value};

use super::{BlockTool, ToolContext, ToolFactory};
use crate::surface::{NodeId, Surface};

/// Name the stub tool is registered under.
pub const STUB_TOOL: &str = "stub";

/// Build stub data for a section that could not be composed.
pub fn compose_stub_data(tool: &str, data: &SectionData, id: Option<&SectionId>, title: Option<&str>) -> SectionData {
    let mut saved = OutputSection::new(tool, data.clone());
    saved.id = id.cloned();
    let mut stub = SectionData::new();
    stub.insert("savedData".into(), serde_json::to_value(&saved).unwrap_or(Value::Null));
    stub.insert("title".into(), json!(title.unwrap_or(tool)));
    stub
}

/// Recover the original section shape from stub data.
pub fn saved_payload(data: &SectionData) -> Option<OutputSection> {
    data.get("savedData")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}

#[derive(Debug, Default)]
pub struct StubFactory;

impl ToolFactory for StubFactory {
    fn create(&self, ctx: ToolContext) -> anyhow::Result<Arc<dyn BlockTool>> {
        let title = ctx
            .data
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Error")
            .to_string();
        let saved = ctx.data.get("savedData").cloned().unwrap_or(Value::Null);
        Ok(Arc::new(Stub { title, saved }))
    }

    fn is_internal(&self) -> bool {
        true
    }
}

/// Read-only placeholder section.
pub struct Stub {
    title: String,
    saved: Value,
}

#[async_trait]
impl BlockTool for Stub {
    fn render(&self, surface: &mut Surface) -> NodeId {
        let root = surface.make("div", &[("class", "ce-stub")]);
        let title = surface.make("div", &[("class", "ce-stub__title")]);
        let title_text = surface.create_text(&self.title);
        surface.append_child(title, title_text);
        let subtitle = surface.make("div", &[("class", "ce-stub__subtitle")]);
        let subtitle_text = surface.create_text("The section can not be displayed correctly.");
        surface.append_child(subtitle, subtitle_text);
        surface.append_children(root, &[title, subtitle]);
        root
    }

    async fn save(&self, _root: NodeId) -> anyhow::Result<SectionData> {
        let mut data = SectionData::new();
        data.insert("savedData".into(), self.saved.clone());
        data.insert("title".into(), json!(self.title));
        Ok(data)
    }
}
