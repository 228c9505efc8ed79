//! Section identifiers.
//!
//! Saved documents carry ids as plain strings, and any string is accepted on
//! load. Freshly generated ids are the ten trailing hex characters of a
//! UUIDv7, which fall in its random bits.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of a generated section id.
pub const GENERATED_ID_LEN: usize = 10;

/// A section identifier.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(String);

impl SectionId {
    /// Generate a fresh id.
    pub fn generate() -> Self {
        let hex = uuid::Uuid::now_v7().as_simple().to_string();
        Self(hex[hex.len() - GENERATED_ID_LEN..].to_string())
    }

    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SectionId {
    fn default() -> Self {
        Self::generate()
    }
}

impl From<&str> for SectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for SectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SectionId({})", self.0)
    }
}
