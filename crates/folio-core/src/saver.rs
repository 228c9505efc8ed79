//! Document extraction.

use folio_types::{now_millis, OutputData, OutputSection, SavedSection};

use crate::manager::SectionManager;
use crate::section::Section;
use crate::tools::stub::{saved_payload, STUB_TOOL};

/// Save every section into a document.
///
/// Sections are saved concurrently. A section whose data is unavailable or
/// fails validation is left out. Stub sections give back the payload they
/// were created from.
pub async fn save_document(manager: &SectionManager) -> OutputData {
    let sections = manager.sections().to_vec();
    let results = futures::future::join_all(sections.iter().map(extract)).await;

    let mut blocks = Vec::with_capacity(results.len());
    for (section, result) in sections.iter().zip(results) {
        let Some(saved) = result else {
            continue;
        };
        if saved.tool == STUB_TOOL {
            match saved_payload(&saved.data) {
                Some(mut payload) => {
                    if payload.tunes.is_empty() {
                        payload.tunes = saved.tunes;
                    }
                    blocks.push(payload);
                }
                None => tracing::warn!(section = %saved.id, "stub section has no saved payload"),
            }
            continue;
        }
        let data = section.tool().sanitize_data(&saved.data);
        blocks.push(OutputSection { data, ..saved.into_output() });
    }

    tracing::debug!(sections = sections.len(), blocks = blocks.len(), "document saved");
    OutputData {
        time: now_millis(),
        blocks,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

async fn extract(section: &Section) -> Option<SavedSection> {
    let saved = section.save().await?;
    if !section.validate(&saved.data).await {
        tracing::info!(section = %saved.id, tool = %saved.tool, "section skipped: invalid data");
        return None;
    }
    Some(saved)
}
