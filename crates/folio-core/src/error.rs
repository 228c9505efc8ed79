//! Editor error types.
//!
//! Only caller-visible failures become errors. Misbehaving tools and tunes
//! are contained inside the section and surface as logs or `None`.

use thiserror::Error;

use crate::conversion::ConversionDirection;

/// Errors raised by the editor core.
#[derive(Debug, Error)]
pub enum EditorError {
    /// No tool registered under this name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The section is not part of the collection.
    #[error("section not found: {0}")]
    SectionNotFound(String),

    /// Another section in the collection already uses this id.
    #[error("section id already in use: {0}")]
    DuplicateId(String),

    /// No section at this position.
    #[error("index {index} is out of range (collection has {len} sections)")]
    IndexOutOfRange { index: usize, len: usize },

    /// The tool lacks the conversion rule needed for this direction.
    #[error("tool \"{tool}\" does not provide an {direction} conversion rule")]
    NotConvertible {
        tool: String,
        direction: ConversionDirection,
    },

    /// The section's data could not be extracted.
    #[error("data of section {0} is unavailable")]
    DataUnavailable(String),

    /// The tool constructor failed.
    #[error("failed to construct tool \"{tool}\": {source}")]
    ToolConstruction {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    /// A tool operation that must succeed failed.
    #[error("tool \"{tool}\" failed: {source}")]
    ToolFailed {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EditorError {
    /// Create an IndexOutOfRange error.
    pub fn out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    /// Create a NotConvertible error.
    pub fn not_convertible(tool: impl Into<String>, direction: ConversionDirection) -> Self {
        Self::NotConvertible {
            tool: tool.into(),
            direction,
        }
    }
}

/// Result type for editor operations.
pub type Result<T> = std::result::Result<T, EditorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_tool() {
        let err = EditorError::not_convertible("delimiter", ConversionDirection::Import);
        assert_eq!(
            err.to_string(),
            "tool \"delimiter\" does not provide an import conversion rule"
        );
        assert_eq!(EditorError::ToolNotFound("quote".into()).to_string(), "tool not found: quote");
    }

    #[test]
    fn test_out_of_range() {
        let err = EditorError::out_of_range(5, 2);
        assert!(matches!(err, EditorError::IndexOutOfRange { index: 5, len: 2 }));
    }
}
