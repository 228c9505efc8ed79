//! Saved and persisted section shapes.
//!
//! Two shapes exist on purpose:
//!
//! - [`SavedSection`] is what a live section produces on save: it carries the
//!   tool name under `tool` and the extraction time.
//! - [`OutputSection`] is the exchanged form `{id, type, data, tunes}` that
//!   documents are stored and loaded as.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::SectionId;

/// Tool-defined section data. Always a mapping.
pub type SectionData = Map<String, Value>;

/// Tune data keyed by tune name, in tune order.
pub type TunesData = IndexMap<String, Value>;

/// Result of saving one live section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedSection {
    pub id: SectionId,
    /// Tool name.
    pub tool: String,
    pub data: SectionData,
    #[serde(default)]
    pub tunes: TunesData,
    /// Milliseconds spent waiting on the tool's extraction.
    #[serde(default)]
    pub time: f64,
}

impl SavedSection {
    /// Convert into the exchanged shape.
    pub fn into_output(self) -> OutputSection {
        OutputSection {
            id: Some(self.id),
            tool: self.tool,
            data: self.data,
            tunes: self.tunes,
        }
    }
}

/// Persisted/exchanged per-section shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SectionId>,
    #[serde(rename = "type")]
    pub tool: String,
    #[serde(default)]
    pub data: SectionData,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub tunes: TunesData,
}

impl OutputSection {
    /// Build a section shape with no id and no tunes.
    pub fn new(tool: impl Into<String>, data: SectionData) -> Self {
        Self {
            id: None,
            tool: tool.into(),
            data,
            tunes: TunesData::new(),
        }
    }

    /// Attach an id.
    pub fn with_id(mut self, id: impl Into<SectionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach tune data.
    pub fn with_tune(mut self, name: impl Into<String>, data: Value) -> Self {
        self.tunes.insert(name.into(), data);
        self
    }
}

/// A whole saved document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    /// Unix milliseconds at save time.
    #[serde(default)]
    pub time: u64,
    pub blocks: Vec<OutputSection>,
    #[serde(default)]
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(v: Value) -> SectionData {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_output_section_uses_type_key() {
        let section = OutputSection::new("paragraph", data(json!({"text": "hi"}))).with_id("a1");
        let value = serde_json::to_value(&section).unwrap();
        assert_eq!(value, json!({"id": "a1", "type": "paragraph", "data": {"text": "hi"}}));
    }

    #[test]
    fn test_output_section_tunes_roundtrip_in_order() {
        let section = OutputSection::new("paragraph", SectionData::new())
            .with_tune("zeta", json!(1))
            .with_tune("alpha", json!(2));
        let text = serde_json::to_string(&section).unwrap();
        let back: OutputSection = serde_json::from_str(&text).unwrap();
        let names: Vec<_> = back.tunes.keys().cloned().collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_missing_id_and_data_default() {
        let section: OutputSection = serde_json::from_str(r#"{"type":"delimiter"}"#).unwrap();
        assert!(section.id.is_none());
        assert!(section.data.is_empty());
        assert!(section.tunes.is_empty());
    }

    #[test]
    fn test_saved_into_output() {
        let saved = SavedSection {
            id: SectionId::new("s1"),
            tool: "header".into(),
            data: data(json!({"text": "Title", "level": 2})),
            tunes: TunesData::new(),
            time: 0.5,
        };
        let out = saved.into_output();
        assert_eq!(out.id, Some(SectionId::new("s1")));
        assert_eq!(out.tool, "header");
        assert_eq!(out.data["level"], json!(2));
    }
}
