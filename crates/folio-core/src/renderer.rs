//! Document loading.

use std::collections::HashSet;

use folio_types::{OutputSection, SectionData, SectionId, TunesData};

use crate::error::Result;
use crate::manager::{ComposeParams, InsertParams, SectionManager};
use crate::section::Section;
use crate::tools::stub::{compose_stub_data, STUB_TOOL};

/// Turn saved sections into live ones at the top of the editor.
///
/// Sections whose tool is missing or whose constructor fails become stub
/// sections carrying the original payload. An empty document gets one
/// default section. Returns the number of sections inserted.
pub fn render_document(manager: &mut SectionManager, blocks: Vec<OutputSection>) -> Result<usize> {
    if blocks.is_empty() {
        manager.insert(InsertParams::default())?;
        manager.flush();
        return Ok(1);
    }

    let mut taken: HashSet<SectionId> = manager.sections().iter().map(|s| s.id().clone()).collect();
    let mut sections = Vec::with_capacity(blocks.len());
    for block in blocks {
        let section_id = match &block.id {
            Some(id) if taken.contains(id) => {
                tracing::warn!(section = %id, tool = %block.tool, "duplicate section id, assigning a fresh one");
                None
            }
            id => id.clone(),
        };
        let section = compose_or_stub(manager, block, section_id)?;
        taken.insert(section.id().clone());
        sections.push(section);
    }
    let count = sections.len();
    manager.insert_many(sections, 0)?;
    manager.flush();
    tracing::debug!(count, "document rendered");
    Ok(count)
}

/// Compose `block` under `section_id`. Stubs keep the block's own id in
/// their payload.
fn compose_or_stub(manager: &SectionManager, block: OutputSection, section_id: Option<SectionId>) -> Result<Section> {
    let OutputSection { id, tool, data, tunes } = block;

    if !manager.registry().has(&tool) {
        tracing::warn!(tool = %tool, "tool is not registered, rendering a stub");
        return compose_stub(manager, &tool, &data, id, section_id, tunes);
    }

    let params = ComposeParams {
        tool: tool.clone(),
        id: section_id.clone(),
        data: data.clone(),
        tunes: tunes.clone(),
    };
    match manager.compose_section(params) {
        Ok(section) => Ok(section),
        Err(e) => {
            tracing::error!(tool = %tool, error = %e, "section skipped because of tool error, rendering a stub");
            compose_stub(manager, &tool, &data, id, section_id, tunes)
        }
    }
}

fn compose_stub(
    manager: &SectionManager,
    tool: &str,
    data: &SectionData,
    original_id: Option<SectionId>,
    section_id: Option<SectionId>,
    tunes: TunesData,
) -> Result<Section> {
    let title = manager
        .registry()
        .get(tool)
        .and_then(|adapter| adapter.toolbox().into_iter().next())
        .and_then(|entry| entry.title);
    let stub_data = compose_stub_data(tool, data, original_id.as_ref(), title.as_deref());
    manager.compose_section(ComposeParams {
        tool: STUB_TOOL.to_string(),
        id: section_id,
        data: stub_data,
        tunes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saver::save_document;
    use crate::tools::ToolRegistry;
    use serde_json::json;

    fn block(tool: &str, data: serde_json::Value) -> OutputSection {
        OutputSection::new(tool, data.as_object().cloned().unwrap_or_else(SectionData::new))
    }

    #[test]
    fn test_empty_document_gets_default_section() {
        let mut manager = SectionManager::new(ToolRegistry::with_builtins());
        assert_eq!(render_document(&mut manager, Vec::new()).unwrap(), 1);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.first_section().unwrap().name(), "paragraph");
        assert_eq!(manager.current_index(), Some(0));
    }

    #[test]
    fn test_sections_render_in_order() {
        let mut manager = SectionManager::new(ToolRegistry::with_builtins());
        let blocks = vec![
            block("header", json!({"text": "Title", "level": 1})).with_id("h1"),
            block("paragraph", json!({"text": "Body"})).with_id("p1"),
        ];
        assert_eq!(render_document(&mut manager, blocks).unwrap(), 2);
        let ids: Vec<_> = manager.sections().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["h1", "p1"]);
        assert!(manager.collection().is_synchronized());
        assert!(manager.sections().iter().all(Section::is_watching));
    }

    #[tokio::test]
    async fn test_unknown_tool_round_trips_through_stub() {
        let mut manager = SectionManager::new(ToolRegistry::with_builtins());
        let original = block("kanban", json!({"columns": ["todo", "done"]}))
            .with_id("k1")
            .with_tune("color", json!("red"));
        render_document(&mut manager, vec![original.clone()]).unwrap();
        assert_eq!(manager.first_section().unwrap().name(), STUB_TOOL);

        let output = save_document(&manager).await;
        assert_eq!(output.blocks, vec![original]);
    }

    #[tokio::test]
    async fn test_failing_constructor_falls_back_to_stub() {
        let mut manager = SectionManager::new(ToolRegistry::with_builtins());
        let broken = block("header", json!({"text": 42})).with_id("bad");
        render_document(&mut manager, vec![broken.clone()]).unwrap();
        let section = manager.first_section().unwrap();
        assert_eq!(section.name(), STUB_TOOL);
        assert_eq!(section.id().as_str(), "bad");

        let output = save_document(&manager).await;
        assert_eq!(output.blocks, vec![broken]);
    }

    #[test]
    fn test_duplicate_ids_get_fresh_ids() {
        let mut manager = SectionManager::new(ToolRegistry::with_builtins());
        let blocks = vec![
            block("paragraph", json!({"text": "a"})).with_id("dup"),
            block("paragraph", json!({"text": "b"})).with_id("dup"),
        ];
        assert_eq!(render_document(&mut manager, blocks).unwrap(), 2);
        let first = manager.get_by_index(0).unwrap();
        let second = manager.get_by_index(1).unwrap();
        assert_eq!(first.id().as_str(), "dup");
        assert_ne!(second.id(), first.id());
        assert_eq!(manager.get_by_id(first.id()), Some(first));
    }
}
