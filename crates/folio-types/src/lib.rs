//! Shared identity and saved-data types for Folio.
//!
//! This crate is the leaf of the workspace: section identifiers and the
//! shapes sections take once they leave the editor. It has **no internal
//! folio dependencies**.
//!
//! # Key Types
//!
//! |---------------------|-----------------------------------------------|
//! | Type                | Purpose                                       |
//! |---------------------|-----------------------------------------------|
//! | [`SectionId`]       | Section identity, unique within a collection  |
//! | [`SavedSection`]    | In-memory result of saving one section        |
//! | [`OutputSection`]   | Persisted `{id, type, data, tunes}` shape     |
//! | [`OutputData`]      | Whole document `{time, blocks, version}`      |
//! |---------------------|-----------------------------------------------|

pub mod ids;
pub mod section;

pub use ids::SectionId;
pub use section::{OutputData, OutputSection, SavedSection, SectionData, TunesData};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
