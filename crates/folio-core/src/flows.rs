//! FlowBus pub/sub for editor events.
//!
//! Two flow domains exist:
//!
//! - [`MutationFlow`] is the manager-level mutation event bus: `added`,
//!   `removed`, `moved` and `changed`, each carrying the resolved index and
//!   a snapshot of the affected section at emission time.
//! - [`EditorFlow`] carries section-local notifications (content mutated,
//!   selection toggled, forwarded interactions). The manager rebroadcasts
//!   `section.mutated` as an indexed `changed` event.
//!
//! # Subjects
//!
//! Subscriptions filter on dot-separated subjects. `*` stands for exactly
//! one token and a trailing `>` for one or more, so `section.*` sees every
//! mutation event and `editor.>` every editor event.

use std::sync::Arc;

use folio_types::SectionId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::surface::{InteractionKind, NodeId};

/// Whether `subject` matches `pattern`.
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let mut pattern = pattern.split('.').peekable();
    let mut subject = subject.split('.');
    while let Some(token) = pattern.next() {
        match (token, subject.next()) {
            (">", Some(_)) if pattern.peek().is_none() => return true,
            (_, None) => return false,
            ("*", Some(_)) => {}
            (expected, Some(actual)) if expected == actual => {}
            _ => return false,
        }
    }
    subject.next().is_none()
}

/// Payloads that know their subject.
pub trait HasSubject {
    fn subject(&self) -> &str;
}

/// A payload tagged with its subject.
#[derive(Clone, Debug)]
pub struct FlowMessage<T> {
    pub subject: String,
    pub payload: T,
}

impl<T: HasSubject> FlowMessage<T> {
    pub fn new(payload: T) -> Self {
        Self {
            subject: payload.subject().to_string(),
            payload,
        }
    }
}

// ============================================================================
// Section Snapshot
// ============================================================================

/// Façade snapshot of a section taken at emission time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionSnapshot {
    pub id: SectionId,
    /// Tool name.
    pub name: String,
    /// Holder element on the surface.
    pub holder: NodeId,
    pub is_empty: bool,
    pub selected: bool,
    pub stretched: bool,
    pub focusable: bool,
}

// ============================================================================
// Mutation Flow Events
// ============================================================================

/// Indexed structural and content events published by the manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationFlow {
    /// A section was inserted at `index`.
    Added { index: usize, section: SectionSnapshot },

    /// The section previously at `index` was removed or displaced.
    Removed { index: usize, section: SectionSnapshot },

    /// A section moved between positions.
    Moved {
        from_index: usize,
        to_index: usize,
        section: SectionSnapshot,
    },

    /// The section at `index` changed content or was updated.
    Changed { index: usize, section: SectionSnapshot },
}

impl MutationFlow {
    /// Get the subject string for this event.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Added { .. } => "section.added",
            Self::Removed { .. } => "section.removed",
            Self::Moved { .. } => "section.moved",
            Self::Changed { .. } => "section.changed",
        }
    }

    /// Snapshot of the affected section.
    pub fn section(&self) -> &SectionSnapshot {
        match self {
            Self::Added { section, .. }
            | Self::Removed { section, .. }
            | Self::Moved { section, .. }
            | Self::Changed { section, .. } => section,
        }
    }

    /// Index the event refers to (the destination for moves).
    pub fn index(&self) -> usize {
        match self {
            Self::Added { index, .. } | Self::Removed { index, .. } | Self::Changed { index, .. } => {
                *index
            }
            Self::Moved { to_index, .. } => *to_index,
        }
    }
}

impl HasSubject for MutationFlow {
    fn subject(&self) -> &str {
        MutationFlow::subject(self)
    }
}

// ============================================================================
// Editor Flow Events
// ============================================================================

/// Section-local notifications.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditorFlow {
    /// A section's content changed (observed mutation, input, or manual dispatch).
    ///
    /// `holder` identifies the exact section instance.
    SectionMutated { section_id: SectionId, holder: NodeId },

    /// A section's selected state was toggled.
    SelectionChanged { section_id: SectionId, selected: bool },

    /// A bound interaction listener saw a keyboard or drag event.
    Interaction {
        section_id: SectionId,
        kind: InteractionKind,
    },
}

impl EditorFlow {
    /// Get the subject string for this event.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::SectionMutated { .. } => "editor.section.mutated",
            Self::SelectionChanged { .. } => "editor.section.selected",
            Self::Interaction { .. } => "editor.interaction",
        }
    }

    /// Get the section this event concerns.
    pub fn section_id(&self) -> &SectionId {
        match self {
            Self::SectionMutated { section_id, .. }
            | Self::SelectionChanged { section_id, .. }
            | Self::Interaction { section_id, .. } => section_id,
        }
    }
}

impl HasSubject for EditorFlow {
    fn subject(&self) -> &str {
        EditorFlow::subject(self)
    }
}

// ============================================================================
// FlowBus
// ============================================================================

/// Broadcast bus for one event domain.
#[derive(Debug, Clone)]
pub struct FlowBus<T: Clone + Send + 'static> {
    tx: broadcast::Sender<FlowMessage<T>>,
}

impl<T: Clone + Send + 'static> FlowBus<T> {
    /// A bus keeping up to `capacity` undelivered messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + HasSubject + 'static> FlowBus<T> {
    /// Publish to every live subscriber. Returns how many there were.
    pub fn publish(&self, payload: T) -> usize {
        self.tx.send(FlowMessage::new(payload)).unwrap_or(0)
    }

    pub fn subscribe(&self, pattern: &str) -> Subscription<T> {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Receiving end of a [`FlowBus`], filtered by subject pattern.
///
/// Messages published before the subscription was created are not seen.
pub struct Subscription<T: Clone> {
    pattern: String,
    rx: broadcast::Receiver<FlowMessage<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Wait for the next matching message. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) if matches_pattern(&self.pattern, &msg.subject) => return Some(msg),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching message already queued, if any.
    pub fn try_recv(&mut self) -> Option<FlowMessage<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) if matches_pattern(&self.pattern, &msg.subject) => return Some(msg),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Every matching message currently queued.
    pub fn drain(&mut self) -> Vec<FlowMessage<T>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn lagged(&self, skipped: u64) {
        tracing::warn!(pattern = %self.pattern, skipped, "subscriber fell behind, events dropped");
    }
}

impl<T: Clone> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Shared FlowBus Handle
// ============================================================================

pub type SharedMutationFlowBus = Arc<FlowBus<MutationFlow>>;
pub type SharedEditorFlowBus = Arc<FlowBus<EditorFlow>>;

pub fn shared_mutation_flow_bus(capacity: usize) -> SharedMutationFlowBus {
    Arc::new(FlowBus::new(capacity))
}

pub fn shared_editor_flow_bus(capacity: usize) -> SharedEditorFlowBus {
    Arc::new(FlowBus::new(capacity))
}

// ============================================================================
// Tests
// ============================================================================
