//! Conversion rules between tool data shapes.
//!
//! A tool exports its data to a plain string and imports a string into its
//! own data shape. Either side is a field name or a transform. Merging
//! across tools and `convert` both go through the string form.

use std::fmt;
use std::sync::Arc;

use folio_types::SectionData;
use serde_json::Value;
use strum::{Display, EnumString};

/// Which side of a conversion a tool must provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ConversionDirection {
    Export,
    Import,
}

/// Data to string.
#[derive(Clone)]
pub enum ExportRule {
    /// Read this field.
    Field(String),
    Transform(Arc<dyn Fn(&SectionData) -> String + Send + Sync>),
}

/// String to data. Transforms also receive the tool's config.
#[derive(Clone)]
pub enum ImportRule {
    /// Store the string under this field.
    Field(String),
    Transform(Arc<dyn Fn(&str, &Value) -> SectionData + Send + Sync>),
}

impl fmt::Debug for ExportRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Self::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

impl fmt::Debug for ImportRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Self::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// A tool's declared conversion capabilities.
#[derive(Clone, Debug, Default)]
pub struct ConversionConfig {
    pub export: Option<ExportRule>,
    pub import: Option<ImportRule>,
}

impl ConversionConfig {
    /// Export and import through the same field.
    pub fn field(name: &str) -> Self {
        Self {
            export: Some(ExportRule::Field(name.to_string())),
            import: Some(ImportRule::Field(name.to_string())),
        }
    }

    pub fn with_export(mut self, rule: ExportRule) -> Self {
        self.export = Some(rule);
        self
    }

    pub fn with_import(mut self, rule: ImportRule) -> Self {
        self.import = Some(rule);
        self
    }

    pub fn can_export(&self) -> bool {
        self.export.is_some()
    }

    pub fn can_import(&self) -> bool {
        self.import.is_some()
    }
}

/// Export `data` to its string form.
///
/// A missing export field yields an empty string. Non-string field values
/// are rendered as JSON.
pub fn data_to_string(data: &SectionData, rule: &ExportRule) -> String {
    match rule {
        ExportRule::Field(field) => match data.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => {
                tracing::warn!(field = %field, "export field missing from section data");
                String::new()
            }
            Some(other) => other.to_string(),
        },
        ExportRule::Transform(f) => f(data),
    }
}

/// Import a string into a tool's data shape.
pub fn string_to_data(value: &str, rule: &ImportRule, tool_config: &Value) -> SectionData {
    match rule {
        ImportRule::Field(field) => {
            let mut data = SectionData::new();
            data.insert(field.clone(), Value::String(value.to_string()));
            data
        }
        ImportRule::Transform(f) => f(value, tool_config),
    }
}
