//! Section façade handed to tools, tunes and external collaborators.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use folio_types::{SavedSection, SectionData, SectionId};
use serde_json::Value;

use super::{Section, SectionInner};
use crate::surface::NodeId;

/// Narrow handle to one section.
///
/// Tools receive it before their section exists, so it binds late. Until
/// bound, and after the section is dropped, accessors return `None` and
/// actions are no-ops.
#[derive(Clone)]
pub struct SectionApi {
    id: SectionId,
    name: String,
    slot: Arc<OnceLock<Weak<SectionInner>>>,
}

impl fmt::Debug for SectionApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionApi")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("bound", &self.section().is_some())
            .finish()
    }
}

impl SectionApi {
    pub(crate) fn new(id: SectionId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            slot: Arc::new(OnceLock::new()),
        }
    }

    pub(crate) fn bind(&self, inner: &Arc<SectionInner>) {
        if self.slot.set(Arc::downgrade(inner)).is_err() {
            tracing::warn!(section = %self.id, "section api bound twice");
        }
    }

    /// The live section, if bound and alive.
    pub fn section(&self) -> Option<Section> {
        self.slot.get()?.upgrade().map(Section::from_inner)
    }

    pub fn id(&self) -> &SectionId {
        &self.id
    }

    /// Tool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> Option<Value> {
        self.section().map(|s| s.config().clone())
    }

    pub fn holder(&self) -> Option<NodeId> {
        self.section().map(|s| s.holder())
    }

    pub fn is_empty(&self) -> Option<bool> {
        self.section().map(|s| s.is_empty())
    }

    pub fn selected(&self) -> Option<bool> {
        self.section().map(|s| s.selected())
    }

    pub fn focusable(&self) -> Option<bool> {
        self.section().map(|s| s.focusable())
    }

    pub fn stretched(&self) -> Option<bool> {
        self.section().map(|s| s.stretched())
    }

    pub fn set_stretched(&self, stretched: bool) {
        if let Some(section) = self.section() {
            section.set_stretched(stretched);
        }
    }

    pub fn call(&self, method: &str, params: &Value) {
        if let Some(section) = self.section() {
            section.call(method, params);
        }
    }

    pub async fn save(&self) -> Option<SavedSection> {
        match self.section() {
            Some(section) => section.save().await,
            None => None,
        }
    }

    pub async fn validate(&self, data: &SectionData) -> bool {
        match self.section() {
            Some(section) => section.validate(data).await,
            None => false,
        }
    }

    pub fn dispatch_change(&self) {
        if let Some(section) = self.section() {
            section.dispatch_change();
        }
    }
}
